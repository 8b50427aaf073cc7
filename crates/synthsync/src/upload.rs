// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{Error, TrainingStore, UploadRecord};
use futures::future::join_all;
use itertools::Itertools as _;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Largest number of images the service accepts in one create-images call.
pub const MAX_UPLOAD_BATCH: usize = 64;

/// Split `items` into consecutive chunks of at most `batch_size` items.
///
/// Yields `ceil(len / batch_size)` chunks covering every item exactly once,
/// in order.  A `batch_size` of zero is treated as one.
///
/// ```rust
/// use synthsync::partition;
///
/// let chunks = partition((0..10).collect(), 4);
/// assert_eq!(chunks, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]);
/// ```
pub fn partition<T>(items: Vec<T>, batch_size: usize) -> Vec<Vec<T>> {
    let chunks = items.into_iter().chunks(batch_size.max(1));
    chunks
        .into_iter()
        .map(|chunk| chunk.collect::<Vec<_>>())
        .collect()
}

/// Outcome of uploading a set of records.
#[derive(Debug, Default)]
pub struct UploadReport {
    /// Images the service accepted, duplicates included.
    pub uploaded: usize,
    /// Chunk index and error of every chunk that failed in whole or in part.
    pub failures: Vec<(usize, Error)>,
}

impl UploadReport {
    pub fn merge(&mut self, other: UploadReport) {
        self.uploaded += other.uploaded;
        self.failures.extend(other.failures);
        self.failures.sort_by_key(|(index, _)| *index);
    }
}

impl std::fmt::Display for UploadReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} images uploaded, {} failed batches",
            self.uploaded,
            self.failures.len()
        )
    }
}

/// Uploads records in service-sized chunks, several chunks at a time.
///
/// Each chunk runs in its own task and owns its records; the image bytes are
/// dropped as soon as the chunk's create-images call returns, whatever the
/// outcome.  Peak memory is therefore bounded by
/// `concurrency × batch_size × image size` rather than by the record count.
pub struct BatchUploader<S> {
    store: Arc<S>,
    concurrency: usize,
}

impl<S: TrainingStore + 'static> BatchUploader<S> {
    pub fn new(store: Arc<S>, concurrency: usize) -> Self {
        BatchUploader {
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Upload `records` in chunks of at most `batch_size` (capped at
    /// [`MAX_UPLOAD_BATCH`]).
    ///
    /// A failed chunk is recorded in the report and never cancels the other
    /// chunks.
    #[cfg_attr(
        feature = "profiling",
        tracing::instrument(skip(self, records), fields(records = records.len()))
    )]
    pub async fn upload(&self, records: Vec<UploadRecord>, batch_size: usize) -> UploadReport {
        let chunks = partition(records, batch_size.min(MAX_UPLOAD_BATCH));
        let total = chunks.len();
        let sem = Arc::new(Semaphore::new(self.concurrency));

        let tasks = chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let store = self.store.clone();
                let sem = sem.clone();

                tokio::spawn(async move {
                    let _permit = sem.acquire().await.map_err(|_| {
                        Error::BatchUploadFailed(index, "Semaphore closed unexpectedly".to_owned())
                    })?;
                    let outcome = upload_chunk(store.as_ref(), index, total, &chunk).await;
                    drop(chunk);
                    Ok::<_, Error>(outcome)
                })
            })
            .collect::<Vec<_>>();

        let mut report = UploadReport::default();
        for (index, joined) in join_all(tasks).await.into_iter().enumerate() {
            match joined {
                Ok(Ok((uploaded, failure))) => {
                    report.uploaded += uploaded;
                    if let Some(err) = failure {
                        report.failures.push((index, err));
                    }
                }
                Ok(Err(err)) => report.failures.push((index, err)),
                Err(err) => report.failures.push((index, err.into())),
            }
        }
        report
    }
}

async fn upload_chunk<S: TrainingStore>(
    store: &S,
    index: usize,
    total: usize,
    chunk: &[UploadRecord],
) -> (usize, Option<Error>) {
    info!(
        "Uploading batch {} of {} with {} images...",
        index + 1,
        total,
        chunk.len()
    );

    match store.create_images(chunk).await {
        Ok(summary) if summary.is_batch_successful => {
            info!("Batch {} of {} upload COMPLETE.", index + 1, total);
            (chunk.len(), None)
        }
        Ok(summary) => {
            let rejected = summary.rejected();
            warn!(
                "Batch {} of {}: {} of {} images rejected",
                index + 1,
                total,
                rejected.len(),
                chunk.len()
            );
            let reason = format!(
                "{} of {} images rejected: {}",
                rejected.len(),
                chunk.len(),
                rejected.iter().unique().join(", ")
            );
            (summary.uploaded(), Some(Error::BatchUploadFailed(index, reason)))
        }
        Err(err) => {
            warn!("Failed to upload batch {} of {}: {}", index + 1, total, err);
            (0, Some(Error::BatchUploadFailed(index, err.to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use std::collections::HashSet;

    fn records(count: usize) -> Vec<UploadRecord> {
        (0..count)
            .map(|n| UploadRecord {
                name: format!("rgb_{}.png", n),
                image_bytes: vec![0; 16],
                tag_ids: vec![],
                regions: vec![],
            })
            .collect()
    }

    #[test]
    fn test_partition_covers_every_item_once() {
        let cases: [(usize, usize); 7] =
            [(0, 3), (1, 3), (9, 3), (10, 3), (64, 64), (65, 64), (7, 1)];
        for (len, size) in cases {
            let chunks = partition((0..len).collect::<Vec<_>>(), size);

            assert_eq!(chunks.len(), len.div_ceil(size));
            assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= size));

            let flat = chunks.into_iter().flatten().collect::<Vec<_>>();
            assert_eq!(flat, (0..len).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_partition_zero_batch_size() {
        assert_eq!(partition(vec![1, 2], 0), vec![vec![1], vec![2]]);
    }

    #[tokio::test]
    async fn test_upload_all_batches() {
        let store = Arc::new(MemoryStore::new());
        let uploader = BatchUploader::new(store.clone(), 3);

        let report = uploader.upload(records(25), 10).await;

        assert_eq!(report.uploaded, 25);
        assert!(report.failures.is_empty());
        assert_eq!(store.calls().create_images, 3);

        let names = store
            .images()
            .await
            .into_iter()
            .map(|s| s.name)
            .collect::<HashSet<_>>();
        assert_eq!(names.len(), 25);
    }

    #[tokio::test]
    async fn test_upload_batch_size_capped() {
        let store = Arc::new(MemoryStore::new());
        let uploader = BatchUploader::new(store.clone(), 2);

        let report = uploader.upload(records(130), 500).await;

        assert_eq!(report.uploaded, 130);
        assert_eq!(store.calls().create_images, 3);
    }

    #[tokio::test]
    async fn test_upload_failure_is_isolated() {
        // Sequential uploads make the failing call index line up with the chunk.
        let store = Arc::new(MemoryStore::new().fail_create_images_call(1));
        let uploader = BatchUploader::new(store.clone(), 1);

        let report = uploader.upload(records(30), 10).await;

        assert_eq!(report.uploaded, 20);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, 1);
        assert!(matches!(report.failures[0].1, Error::BatchUploadFailed(1, _)));
        assert_eq!(store.image_count().await, 20);
    }

    #[tokio::test]
    async fn test_upload_partial_rejection() {
        let store = Arc::new(MemoryStore::new().reject_image("rgb_3.png"));
        let uploader = BatchUploader::new(store.clone(), 2);

        let report = uploader.upload(records(8), 4).await;

        assert_eq!(report.uploaded, 7);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, 0);
        assert!(report.failures[0].1.to_string().contains("ErrorImageFormat"));
    }

    #[test]
    fn test_report_merge_sorts_failures() {
        let mut report = UploadReport {
            uploaded: 3,
            failures: vec![(4, Error::InvalidResponse)],
        };
        report.merge(UploadReport {
            uploaded: 2,
            failures: vec![(1, Error::InvalidResponse)],
        });

        assert_eq!(report.uploaded, 5);
        assert_eq!(
            report.failures.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![1, 4]
        );
    }
}
