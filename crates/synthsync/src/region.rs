// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Pixel-space to normalized region conversion.
//!
//! ## Coordinate Systems
//!
//! - **Capture annotations**: pixel coordinates, top-left origin, `(x, y)`
//!   origin plus `(w, h)` dimension
//! - **Training store regions**: normalized 0-1, top-left origin,
//!   `left, top, width, height`

use crate::{NormalizedRegion, RawBoundingBox, TagId};

/// Convert a pixel-space box into a region normalized to the image size.
///
/// `left` and `top` are clamped to `[0, 1]` first; `width` and `height` are
/// then clamped to the span that remains (`1 - left`, `1 - top`), so the
/// region never crosses the right or bottom edge.  The clamp order must stay
/// as is.
///
/// The image size must come from the image itself; it is not assumed from
/// the generator settings.
///
/// # Example
/// ```
/// use synthsync::{RawBoundingBox, TagId, normalize};
/// use uuid::Uuid;
///
/// let bbox = RawBoundingBox {
///     label_name: "cup".to_string(),
///     origin_px: [600.0, 50.0],
///     dimension_px: [200.0, 100.0],
/// };
/// let region = normalize(&bbox, TagId::from(Uuid::nil()), 640, 480);
///
/// assert!((region.left - 600.0 / 640.0).abs() < 1e-9);
/// assert!(region.left + region.width <= 1.0);
/// ```
pub fn normalize(
    bbox: &RawBoundingBox,
    tag_id: TagId,
    image_width: u32,
    image_height: u32,
) -> NormalizedRegion {
    let img_w = image_width as f64;
    let img_h = image_height as f64;
    let [x, y] = bbox.origin_px;
    let [w, h] = bbox.dimension_px;

    let left = clamp_unit(x / img_w, 1.0);
    let top = clamp_unit(y / img_h, 1.0);
    let width = clamp_unit(w / img_w, 1.0 - left);
    let height = clamp_unit(h / img_h, 1.0 - top);

    NormalizedRegion {
        tag_id,
        left,
        top,
        width,
        height,
    }
}

// NaN (zero-sized image or NaN input) collapses to 0.
fn clamp_unit(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.max(0.0).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn bbox(origin: [f64; 2], dimension: [f64; 2]) -> RawBoundingBox {
        RawBoundingBox {
            label_name: "cup".to_string(),
            origin_px: origin,
            dimension_px: dimension,
        }
    }

    fn assert_invariants(r: &NormalizedRegion) {
        for v in [r.left, r.top, r.width, r.height] {
            assert!((0.0..=1.0).contains(&v), "{:?} out of range", r);
        }
        assert!(r.left + r.width <= 1.0, "{:?} crosses right edge", r);
        assert!(r.top + r.height <= 1.0, "{:?} crosses bottom edge", r);
    }

    #[test]
    fn test_normalize_inside_image() {
        let tag = TagId::from(Uuid::nil());
        let region = normalize(&bbox([100.0, 50.0], [200.0, 150.0]), tag, 640, 480);

        assert_eq!(region.tag_id, tag);
        assert!((region.left - 0.15625).abs() < 1e-9);
        assert!((region.top - 50.0 / 480.0).abs() < 1e-9);
        assert!((region.width - 0.3125).abs() < 1e-9);
        assert!((region.height - 0.3125).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_clamps_overflow_to_remaining_span() {
        let tag = TagId::from(Uuid::nil());
        let region = normalize(&bbox([600.0, 400.0], [200.0, 200.0]), tag, 640, 480);

        assert!((region.width - (1.0 - 600.0 / 640.0)).abs() < 1e-9);
        assert!((region.height - (1.0 - 400.0 / 480.0)).abs() < 1e-9);
        assert_invariants(&region);
    }

    #[test]
    fn test_normalize_negative_and_outside_origins() {
        let tag = TagId::from(Uuid::nil());

        let region = normalize(&bbox([-20.0, -5.0], [50.0, 50.0]), tag, 100, 100);
        assert_eq!(region.left, 0.0);
        assert_eq!(region.top, 0.0);
        assert_eq!(region.width, 0.5);

        let region = normalize(&bbox([150.0, 300.0], [50.0, 50.0]), tag, 100, 100);
        assert_eq!(region.left, 1.0);
        assert_eq!(region.top, 1.0);
        assert_eq!(region.width, 0.0);
        assert_eq!(region.height, 0.0);

        let region = normalize(&bbox([10.0, 10.0], [-50.0, 20.0]), tag, 100, 100);
        assert_eq!(region.width, 0.0);
    }

    #[test]
    fn test_normalize_invariants_over_grid() {
        let tag = TagId::from(Uuid::nil());
        let coords = [-500.0, -1.0, 0.0, 0.5, 63.0, 319.9, 640.0, 641.0, 5000.0];

        for &x in &coords {
            for &y in &coords {
                for &w in &coords {
                    for &h in &coords {
                        assert_invariants(&normalize(&bbox([x, y], [w, h]), tag, 640, 480));
                    }
                }
            }
        }
    }

    #[test]
    fn test_normalize_zero_sized_image() {
        let region = normalize(&bbox([0.0, 0.0], [0.0, 0.0]), TagId::from(Uuid::nil()), 0, 0);
        assert_invariants(&region);
    }
}
