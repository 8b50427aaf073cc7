// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Capture annotation files produced by the synthetic data generator.
//!
//! Each capture folder holds a `step0.frame_data.json` describing the
//! rendered frame:
//!
//! ```json
//! {
//!   "frame": 0,
//!   "captures": [{
//!     "filename": "rgb_2.png",
//!     "annotations": [{
//!       "values": [{"labelName": "cup", "origin": [12, 40], "dimension": [64, 80]}]
//!     }]
//!   }]
//! }
//! ```
//!
//! A separate annotation definition file enumerates every label the
//! generator can emit (`{"annotationDefinitions": [{"spec": [{"label_id": 1,
//! "label_name": "cup"}]}]}`).

use crate::Error;
use itertools::Itertools as _;
use serde::Deserialize;
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

/// Name of the per-folder annotation file.
pub const FRAME_DATA_FILE: &str = "step0.frame_data.json";

/// One parsed capture folder.
///
/// The owning folder is attached after parsing so that image files can be
/// resolved next to the annotation file.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureAnnotation {
    #[serde(rename = "frame", default)]
    pub frame_index: i64,
    #[serde(default)]
    pub captures: Vec<Capture>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(skip)]
    pub folder_path: PathBuf,
}

/// One rendered image and its detections.
#[derive(Debug, Clone, Deserialize)]
pub struct Capture {
    pub filename: String,
    #[serde(rename = "annotations", default)]
    pub detections: Vec<DetectionGroup>,
}

/// A group of boxes; `values` is `null` when the frame holds no objects.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectionGroup {
    #[serde(rename = "values", default)]
    pub boxes: Option<Vec<RawBoundingBox>>,
}

/// Pixel-space bounding box relative to the capture's own image.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawBoundingBox {
    #[serde(rename = "labelName")]
    pub label_name: String,
    #[serde(rename = "origin")]
    pub origin_px: [f64; 2],
    #[serde(rename = "dimension")]
    pub dimension_px: [f64; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Capture {
    /// Every box of every group, in file order.
    pub fn boxes(&self) -> impl Iterator<Item = &RawBoundingBox> {
        self.detections
            .iter()
            .filter_map(|group| group.boxes.as_ref())
            .flatten()
    }

    /// True when no group carries a box; such captures are background.
    pub fn is_background(&self) -> bool {
        self.boxes().next().is_none()
    }
}

impl CaptureAnnotation {
    /// Load the [`FRAME_DATA_FILE`] of a capture folder.
    pub fn load_folder<P: AsRef<Path>>(folder: P) -> Result<Self, Error> {
        let folder = folder.as_ref();
        load_annotation(folder.join(FRAME_DATA_FILE), folder)
    }

    /// Path of a capture's image, resolved against the owning folder.
    pub fn image_path(&self, capture: &Capture) -> PathBuf {
        self.folder_path.join(&capture.filename)
    }
}

/// Parse one annotation file and attach its owning folder.
///
/// Any read or decode failure is reported as
/// [`Error::MalformedAnnotation`] naming the file.
pub fn load_annotation<P: AsRef<Path>, F: AsRef<Path>>(
    path: P,
    folder: F,
) -> Result<CaptureAnnotation, Error> {
    let path = path.as_ref();
    let malformed = |reason: String| Error::MalformedAnnotation(path.to_path_buf(), reason);

    let file = File::open(path).map_err(|e| malformed(e.to_string()))?;
    let mut annotation: CaptureAnnotation =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| malformed(e.to_string()))?;
    annotation.folder_path = folder.as_ref().to_path_buf();
    Ok(annotation)
}

#[derive(Debug, Deserialize)]
struct DefinitionRoot {
    #[serde(rename = "annotationDefinitions")]
    annotation_definitions: Vec<Definition>,
}

#[derive(Debug, Deserialize)]
struct Definition {
    #[serde(default)]
    spec: Vec<LabelSpec>,
}

#[derive(Debug, Deserialize)]
struct LabelSpec {
    #[allow(dead_code)]
    label_id: i64,
    label_name: String,
}

/// Read every label name from an annotation definition file.
///
/// Names are returned once each, in first-seen order.
pub fn load_label_names<P: AsRef<Path>>(path: P) -> Result<Vec<String>, Error> {
    let path = path.as_ref();
    let malformed = |reason: String| Error::MalformedAnnotation(path.to_path_buf(), reason);

    let file = File::open(path).map_err(|e| malformed(e.to_string()))?;
    let root: DefinitionRoot =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| malformed(e.to_string()))?;

    Ok(root
        .annotation_definitions
        .into_iter()
        .flat_map(|definition| definition.spec)
        .map(|spec| spec.label_name)
        .unique()
        .collect())
}
