// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Turns parsed capture annotations into upload records.

use crate::{
    CaptureAnnotation, Error, TagResolver, TrainingStore, UploadRecord,
    annotation::Capture,
    region::normalize,
};
use log::{debug, warn};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Source of image bytes for a capture.
pub trait ImageSource: Send + Sync {
    fn load(&self, path: &Path) -> impl Future<Output = Result<Vec<u8>, Error>> + Send;
}

/// Reads images from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsImageSource;

impl ImageSource for FsImageSource {
    async fn load(&self, path: &Path) -> Result<Vec<u8>, Error> {
        Ok(tokio::fs::read(path).await?)
    }
}

/// Pixel dimensions read from the encoded image bytes.
pub fn image_dimensions(path: &Path, bytes: &[u8]) -> Result<(u32, u32), Error> {
    let failed = |reason: &str| Error::ImageLoadFailed(path.to_path_buf(), reason.to_owned());

    if !infer::is_image(bytes) {
        return Err(failed("not a recognised image format"));
    }
    let size = imagesize::blob_size(bytes).map_err(|e| failed(&e.to_string()))?;
    if size.width == 0 || size.height == 0 {
        return Err(failed("image has no pixels"));
    }
    Ok((size.width as u32, size.height as u32))
}

/// Records built from one annotation plus the captures that failed.
#[derive(Debug, Default)]
pub struct BuildOutcome {
    pub records: Vec<UploadRecord>,
    /// Image path of each failed capture with its error.
    pub failures: Vec<(PathBuf, Error)>,
}

/// Builds one [`UploadRecord`] per capture.
///
/// Captures without boxes are tagged with the background tag only.  For the
/// others every box contributes a region, in file order, and its tag id is
/// added once to the record's tag set.  A capture whose image or tags cannot
/// be resolved is reported in [`BuildOutcome::failures`]; the remaining
/// captures of the annotation are still built.
pub struct UploadRecordBuilder<S> {
    resolver: Arc<TagResolver<S>>,
}

impl<S: TrainingStore> UploadRecordBuilder<S> {
    pub fn new(resolver: Arc<TagResolver<S>>) -> Self {
        UploadRecordBuilder { resolver }
    }

    pub async fn build<L: ImageSource>(
        &self,
        annotation: &CaptureAnnotation,
        loader: &L,
    ) -> BuildOutcome {
        let mut outcome = BuildOutcome::default();

        for capture in &annotation.captures {
            match self.build_capture(annotation, capture, loader).await {
                Ok(record) => outcome.records.push(record),
                Err(err) => {
                    warn!("Skipping capture: {}", err);
                    outcome.failures.push((annotation.image_path(capture), err));
                }
            }
        }

        debug!(
            "Built {} records from {:?} ({} failed)",
            outcome.records.len(),
            annotation.folder_path,
            outcome.failures.len()
        );
        outcome
    }

    async fn build_capture<L: ImageSource>(
        &self,
        annotation: &CaptureAnnotation,
        capture: &Capture,
        loader: &L,
    ) -> Result<UploadRecord, Error> {
        let path = annotation.image_path(capture);
        let image_bytes = loader
            .load(&path)
            .await
            .map_err(|e| Error::ImageLoadFailed(path.clone(), e.to_string()))?;
        let (width, height) = image_dimensions(&path, &image_bytes)?;

        if capture.is_background() {
            return Ok(UploadRecord {
                name: capture.filename.clone(),
                image_bytes,
                tag_ids: vec![self.resolver.background().await?],
                regions: vec![],
            });
        }

        let mut tag_ids = vec![];
        let mut regions = vec![];
        for bbox in capture.boxes() {
            let tag_id = self.resolver.resolve(&bbox.label_name).await?;
            if !tag_ids.contains(&tag_id) {
                tag_ids.push(tag_id);
            }
            regions.push(normalize(bbox, tag_id, width, height));
        }

        Ok(UploadRecord {
            name: capture.filename.clone(),
            image_bytes,
            tag_ids,
            regions,
        })
    }
}
