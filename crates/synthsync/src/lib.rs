// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! # synthsync
//!
//! Ingests synthetic capture folders into a remote vision training project
//! and tears projects down again.
//!
//! A capture folder holds rendered images plus a `step0.frame_data.json`
//! annotation listing each image's bounding boxes in pixels.  Ingestion turns
//! every capture into an upload record (image bytes, tag ids, normalized
//! regions) and uploads the records in batches, creating missing tags on the
//! way.  Teardown deletes every image and tag of the project.
//!
//! ## Pipeline
//!
//! - [`CaptureAnnotation`]: parse a folder's annotation file
//! - [`TagResolver`]: label name to tag id, get-or-create, shared cache
//! - [`normalize`]: pixel box to a `[0, 1]` region clamped to the image
//! - [`UploadRecordBuilder`]: one [`UploadRecord`] per capture
//! - [`BatchUploader`]: bounded-concurrency create-images calls
//! - [`IngestionOrchestrator`]: folder grouping and aggregation
//! - [`BulkDeleter`]: paginated bulk deletion of images, then tags
//!
//! The pipelines drive a [`TrainingStore`]: [`Client`] for the Custom Vision
//! training API, or [`MemoryStore`] for tests and dry runs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use synthsync::{Client, Error, IngestionOrchestrator, Settings};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let settings = Settings::load(None)?;
//!     settings.validate()?;
//!
//!     let client = Arc::new(Client::new(&settings)?);
//!     let report = IngestionOrchestrator::new(client)
//!         .run("captures", settings.batch_size, settings.concurrency)
//!         .await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```
//!
//! ## Optional Features
//!
//! - `profiling`: `tracing` spans around the upload, delete and ingestion
//!   entry points

mod annotation;
mod api;
mod builder;
mod client;
mod config;
mod delete;
mod error;
mod orchestrator;
mod region;
mod retry;
mod store;
mod tags;
mod upload;

pub use crate::{
    annotation::{
        Capture, CaptureAnnotation, DetectionGroup, FRAME_DATA_FILE, Metric, RawBoundingBox,
        load_annotation, load_label_names,
    },
    api::{
        Image, ImageCreateResult, ImageCreateSummary, ImageId, NormalizedRegion, ProjectId, Tag,
        TagId, UploadRecord,
    },
    builder::{BuildOutcome, FsImageSource, ImageSource, UploadRecordBuilder, image_dimensions},
    client::Client,
    config::Settings,
    delete::{BulkDeleter, DELETE_CONCURRENCY, DeletionReport, PAGE_SIZE},
    error::Error,
    orchestrator::{IngestionOrchestrator, Progress, RunReport, list_capture_folders},
    region::normalize,
    retry::{RetryScope, classify_url},
    store::{CallCounts, MemoryStore, StoredImage, TrainingStore},
    tags::{BACKGROUND_TAG, TagCache, TagResolver},
    upload::{BatchUploader, MAX_UPLOAD_BATCH, UploadReport, partition},
};

#[cfg(test)]
mod tests {
    #[ctor::ctor]
    fn init() {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }
}
