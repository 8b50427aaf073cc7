// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Label name to tag id resolution.
//!
//! The [`TagCache`] lives for one ingestion run and is shared by every
//! concurrent builder.  Misses are resolved against the store with a
//! get-or-create: list the project's tags, match the exact name, create the
//! tag if no match exists.
//!
//! Two workers missing on the same label at the same time must not both
//! create it.  Misses are therefore resolved under a per-label lock: the
//! second worker waits for the first, then finds the label in the cache.

use crate::{Error, TagId, TrainingStore};
use log::{debug, info, warn};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, RwLock};

/// Reserved tag applied to captures without any detection.
pub const BACKGROUND_TAG: &str = "background";

/// Label name to tag id mapping for one run.
///
/// Populated lazily and never invalidated while a run is in progress.
#[derive(Debug, Default)]
pub struct TagCache {
    tags: RwLock<HashMap<String, TagId>>,
}

impl TagCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, label: &str) -> Option<TagId> {
        self.tags.read().await.get(label).copied()
    }

    pub async fn insert(&self, label: &str, id: TagId) {
        self.tags.write().await.insert(label.to_owned(), id);
    }

    pub async fn len(&self) -> usize {
        self.tags.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tags.read().await.is_empty()
    }

    /// Copy of the current mapping.
    pub async fn snapshot(&self) -> HashMap<String, TagId> {
        self.tags.read().await.clone()
    }
}

/// Resolves label names to tag ids through a shared [`TagCache`].
pub struct TagResolver<S> {
    store: Arc<S>,
    cache: Arc<TagCache>,
    pending: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: TrainingStore> TagResolver<S> {
    pub fn new(store: Arc<S>, cache: Arc<TagCache>) -> Self {
        TagResolver {
            store,
            cache,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<TagCache> {
        &self.cache
    }

    /// Returns the tag id for `label`, creating the tag remotely if the
    /// project does not have it yet.
    ///
    /// Failures are reported as [`Error::TagResolutionFailed`]; nothing is
    /// cached for a label that failed, so a later call tries again.
    #[cfg_attr(feature = "profiling", tracing::instrument(skip(self)))]
    pub async fn resolve(&self, label: &str) -> Result<TagId, Error> {
        if let Some(id) = self.cache.get(label).await {
            return Ok(id);
        }

        let lock = self
            .pending
            .lock()
            .await
            .entry(label.to_owned())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        // Another worker may have resolved the label while we waited.
        if let Some(id) = self.cache.get(label).await {
            return Ok(id);
        }

        let failed = |e: Error| Error::TagResolutionFailed(label.to_owned(), e.to_string());

        debug!("Retrieving tag ID for label: {}", label);
        let existing = self
            .store
            .list_tags()
            .await
            .map_err(failed)?
            .into_iter()
            .find(|tag| tag.name() == label);

        let tag = match existing {
            Some(tag) => tag,
            None => {
                info!("No existing tag found for {}, creating new tag", label);
                match self.store.create_tag(label).await {
                    Ok(tag) => tag,
                    // Another writer, or a retried request, may have created it.
                    Err(err) => {
                        warn!("Creating tag {} failed, listing tags again: {}", label, err);
                        self.store
                            .list_tags()
                            .await
                            .map_err(failed)?
                            .into_iter()
                            .find(|tag| tag.name() == label)
                            .ok_or_else(|| failed(err))?
                    }
                }
            }
        };

        self.cache.insert(label, tag.id()).await;
        Ok(tag.id())
    }

    /// Resolve the background tag up front; every capture may need it.
    pub async fn ensure_background(&self) -> Result<TagId, Error> {
        self.resolve(BACKGROUND_TAG).await
    }

    /// The background tag id, resolved on first use if
    /// [`ensure_background`](Self::ensure_background) was not called.
    pub async fn background(&self) -> Result<TagId, Error> {
        match self.cache.get(BACKGROUND_TAG).await {
            Some(id) => Ok(id),
            None => self.ensure_background().await,
        }
    }

    /// Warm the cache with every label of an annotation definition.
    ///
    /// Labels that fail are logged and returned; the run can continue since
    /// captures resolve their labels again on use.
    pub async fn prefetch(&self, labels: &[String]) -> Vec<Error> {
        let mut failures = vec![];
        for label in labels {
            if let Err(err) = self.resolve(label).await {
                warn!("{}", err);
                failures.push(err);
            }
        }
        debug!("Tag cache holds {} labels", self.cache.len().await);
        failures
    }
}
