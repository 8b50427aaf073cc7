// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Bulk teardown of a training project.
//!
//! # Scan
//!
//! Images are found by offset pagination and deleted by id.  The scan works
//! in *rounds*: a round fetches `K` pages at consecutive offsets
//! concurrently, waits for all of them, deletes every non-empty page (at most
//! `K` deletes in flight) and waits for those deletes before the next round
//! is issued.  A round whose pages are all empty ends the *pass*.
//!
//! Deleting images shifts the remaining ones to lower offsets, so a pass that
//! walks monotonically increasing offsets can step over images.  When a pass
//! deleted anything, another pass starts again at offset zero.  A pass that
//! deletes nothing ends the scan, which also bounds the scan when deletes
//! keep failing.
//!
//! Once the image scan is over every tag of the project is deleted.

use crate::{Error, Image, ImageId, Progress, TrainingStore};
use futures::future::join_all;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

/// Images requested per page.
pub const PAGE_SIZE: usize = 100;

/// Pages fetched per round, and the cap on concurrent deletes.
pub const DELETE_CONCURRENCY: usize = 10;

const MAX_PASSES: usize = 64;

/// Outcome of a teardown run.
#[derive(Debug, Default)]
pub struct DeletionReport {
    pub images_deleted: usize,
    pub tags_deleted: usize,
    /// Pages, batches and tags that failed; each was skipped.
    pub failures: Vec<Error>,
    pub passes: usize,
    pub rounds: usize,
    pub cancelled: bool,
}

impl std::fmt::Display for DeletionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} images and {} tags deleted in {} passes, {} failures{}",
            self.images_deleted,
            self.tags_deleted,
            self.passes,
            self.failures.len(),
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}

/// Deletes every image and tag of a training project.
pub struct BulkDeleter<S> {
    store: Arc<S>,
    page_size: usize,
    concurrency: usize,
    cancel: CancellationToken,
    progress: Option<Sender<Progress>>,
}

impl<S: TrainingStore + 'static> BulkDeleter<S> {
    pub fn new(store: Arc<S>) -> Self {
        BulkDeleter {
            store,
            page_size: PAGE_SIZE,
            concurrency: DELETE_CONCURRENCY,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Pages per round (`K`).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Stop issuing new fetch rounds once `cancel` fires.  Deletes already in
    /// flight are awaited.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Sender<Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    #[cfg_attr(feature = "profiling", tracing::instrument(skip(self)))]
    pub async fn delete_all(&self) -> DeletionReport {
        let mut report = DeletionReport::default();
        info!("Starting image deletion process...");

        while report.passes < MAX_PASSES {
            report.passes += 1;
            let deleted = self.delete_pass(&mut report).await;
            if deleted == 0 || report.cancelled {
                break;
            }
            debug!("Pass {} deleted {} images", report.passes, deleted);
        }

        if report.cancelled {
            warn!("Deletion cancelled, tags left in place");
        } else {
            info!("{} images deleted", report.images_deleted);
            self.delete_tags(&mut report).await;
        }
        report
    }

    async fn delete_pass(&self, report: &mut DeletionReport) -> usize {
        let mut skip = 0;
        let mut deleted = 0;
        let mut seen = 0;

        loop {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            report.rounds += 1;

            let offsets = (0..self.concurrency)
                .map(|n| skip + n * self.page_size)
                .collect::<Vec<_>>();
            skip += self.concurrency * self.page_size;

            let mut batches = vec![];
            for (offset, page) in self.fetch_round(offsets).await {
                match page {
                    Ok(images) if !images.is_empty() => {
                        debug!("Fetched {} images starting at index {}", images.len(), offset);
                        batches.push(images.iter().map(Image::id).collect::<Vec<_>>());
                    }
                    Ok(_) => debug!("No images found at skip value {}", offset),
                    Err(err) => {
                        warn!("{}", err);
                        report.failures.push(err);
                    }
                }
            }

            if batches.is_empty() {
                break;
            }

            seen += batches.iter().map(Vec::len).sum::<usize>();
            deleted += self.delete_round(batches, report).await;

            if let Some(progress) = &self.progress {
                let _ = progress
                    .send(Progress {
                        current: report.images_deleted + deleted,
                        total: report.images_deleted + seen,
                    })
                    .await;
            }
        }

        report.images_deleted += deleted;
        deleted
    }

    async fn fetch_round(&self, offsets: Vec<usize>) -> Vec<(usize, Result<Vec<Image>, Error>)> {
        let take = self.page_size;
        let tasks = offsets
            .iter()
            .map(|&skip| {
                let store = self.store.clone();
                tokio::spawn(async move {
                    store
                        .list_images(skip, take)
                        .await
                        .map_err(|e| Error::PageFetchFailed(skip, e.to_string()))
                })
            })
            .collect::<Vec<_>>();

        offsets
            .into_iter()
            .zip(join_all(tasks).await)
            .map(|(skip, joined)| {
                let page = joined.unwrap_or_else(|e| Err(Error::PageFetchFailed(skip, e.to_string())));
                (skip, page)
            })
            .collect()
    }

    // A round holds at most `concurrency` pages, so at most that many
    // deletes are in flight.
    async fn delete_round(&self, batches: Vec<Vec<ImageId>>, report: &mut DeletionReport) -> usize {
        let tasks = batches
            .into_iter()
            .map(|ids| {
                let store = self.store.clone();
                tokio::spawn(async move {
                    info!("Deletion task started for {} images", ids.len());
                    store
                        .delete_images(&ids)
                        .await
                        .map(|_| ids.len())
                        .map_err(|e| Error::BatchDeleteFailed(ids.len(), e.to_string()))
                })
            })
            .collect::<Vec<_>>();

        let mut deleted = 0;
        for joined in join_all(tasks).await {
            match joined {
                Ok(Ok(count)) => deleted += count,
                Ok(Err(err)) => {
                    warn!("{}", err);
                    report.failures.push(err);
                }
                Err(err) => report.failures.push(err.into()),
            }
        }
        deleted
    }

    async fn delete_tags(&self, report: &mut DeletionReport) {
        let tags = match self.store.list_tags().await {
            Ok(tags) => tags,
            Err(err) => {
                warn!("Failed to list tags: {}", err);
                report
                    .failures
                    .push(Error::TagDeleteFailed("*".to_owned(), err.to_string()));
                return;
            }
        };

        for tag in tags {
            match self.store.delete_tag(tag.id()).await {
                Ok(()) => {
                    info!("Tag {} deleted successfully", tag.name());
                    report.tags_deleted += 1;
                }
                Err(err) => {
                    warn!("Failed to delete tag {}: {}", tag.name(), err);
                    report
                        .failures
                        .push(Error::TagDeleteFailed(tag.name().to_owned(), err.to_string()));
                }
            }
        }
    }
}
