// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Training store abstraction.
//!
//! The ingestion and teardown pipelines never talk HTTP directly; they drive a
//! [`TrainingStore`], the capability interface of a remote training project:
//! tag listing/creation/deletion, batched image creation, paginated image
//! listing and batched image deletion.
//!
//! # Store Implementations
//!
//! - [`Client`](crate::Client): the Custom Vision training REST API
//! - [`MemoryStore`]: in-memory store (no persistence), used for tests and dry
//!   runs
//!
//! # Examples
//!
//! ```rust
//! use synthsync::{MemoryStore, TrainingStore};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), synthsync::Error> {
//! let store = MemoryStore::new().with_tags(&["cup"]);
//! let tags = store.list_tags().await?;
//! assert_eq!(tags[0].name(), "cup");
//! # Ok(())
//! # }
//! ```

use crate::{
    Error,
    api::{
        Image, ImageCreateResult, ImageCreateSummary, ImageId, NormalizedRegion, Tag, TagId,
        UploadRecord,
    },
};
use std::{
    collections::HashSet,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Capability interface of a remote training project.
///
/// Implementations must be shareable across worker tasks (`Send + Sync`) and
/// return `Send` futures so callers can drive them from `tokio::spawn`.  The
/// project is bound into the implementation; none of the methods take a
/// project id.
///
/// Implementations are not required to be the sole writer of the project:
/// tags and images may appear or disappear between calls.
pub trait TrainingStore: Send + Sync {
    /// Lists every tag in the project.
    fn list_tags(&self) -> impl Future<Output = Result<Vec<Tag>, Error>> + Send;

    /// Creates a tag with the given name.
    fn create_tag(&self, name: &str) -> impl Future<Output = Result<Tag, Error>> + Send;

    /// Deletes a tag by id.
    fn delete_tag(&self, id: TagId) -> impl Future<Output = Result<(), Error>> + Send;

    /// Creates a batch of images with their tags and regions.
    ///
    /// A service-side rejection of individual images is reported through the
    /// returned summary, not as an error.
    fn create_images(
        &self,
        images: &[UploadRecord],
    ) -> impl Future<Output = Result<ImageCreateSummary, Error>> + Send;

    /// Lists up to `take` images starting at offset `skip`.
    fn list_images(
        &self,
        skip: usize,
        take: usize,
    ) -> impl Future<Output = Result<Vec<Image>, Error>> + Send;

    /// Deletes a batch of images by id.
    fn delete_images(&self, ids: &[ImageId]) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Snapshot of how many times each [`MemoryStore`] operation was called.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list_tags: usize,
    pub create_tag: usize,
    pub delete_tag: usize,
    pub create_images: usize,
    pub list_images: usize,
    /// List calls that returned at least one image.
    pub list_images_nonempty: usize,
    pub delete_images: usize,
}

#[derive(Debug, Default)]
struct Counters {
    list_tags: AtomicUsize,
    create_tag: AtomicUsize,
    delete_tag: AtomicUsize,
    create_images: AtomicUsize,
    list_images: AtomicUsize,
    list_images_nonempty: AtomicUsize,
    delete_images: AtomicUsize,
}

#[derive(Debug, Default)]
struct Faults {
    list_tags: bool,
    tags: HashSet<String>,
    create_images_calls: HashSet<usize>,
    rejected_images: HashSet<String>,
    list_offsets: HashSet<usize>,
    delete_images: bool,
}

/// An image held by a [`MemoryStore`], with the tags and regions it was
/// created with.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub image: Image,
    pub name: String,
    pub tag_ids: Vec<TagId>,
    pub regions: Vec<NormalizedRegion>,
}

/// In-memory training store (no persistence).
///
/// Tags and images are kept in insertion order, so offset pagination behaves
/// like the real service: deleting images shifts later images to lower
/// offsets.  Every operation is counted (see [`MemoryStore::calls`]) and
/// failures can be injected per operation, which makes it the backend of
/// choice for exercising partial-failure handling.
///
/// # Examples
///
/// ```rust
/// use synthsync::{MemoryStore, TrainingStore};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), synthsync::Error> {
/// let store = MemoryStore::new().with_images(250);
/// assert_eq!(store.list_images(200, 100).await?.len(), 50);
/// assert_eq!(store.calls().list_images, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    tags: RwLock<Vec<Tag>>,
    images: RwLock<Vec<StoredImage>>,
    counters: Counters,
    faults: Faults,
    latency: Option<Duration>,
}

impl MemoryStore {
    /// Create an empty `MemoryStore`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with tags of the given names.
    pub fn with_tags(mut self, names: &[&str]) -> Self {
        let tags = self.tags.get_mut();
        for name in names {
            tags.push(Tag::new(TagId::from(Uuid::new_v4()), name));
        }
        self
    }

    /// Seed the store with `count` untagged images.
    pub fn with_images(mut self, count: usize) -> Self {
        let images = self.images.get_mut();
        for n in 0..count {
            images.push(StoredImage {
                image: Image::new(ImageId::from(Uuid::new_v4()), 0, 0),
                name: format!("seed_{}.png", n),
                tag_ids: vec![],
                regions: vec![],
            });
        }
        self
    }

    /// Delay every operation, widening the window for concurrent callers to
    /// interleave.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every tag listing fail.
    pub fn fail_list_tags(mut self) -> Self {
        self.faults.list_tags = true;
        self
    }

    /// Make creating or deleting the named tag fail.
    pub fn fail_tag(mut self, name: &str) -> Self {
        self.faults.tags.insert(name.to_owned());
        self
    }

    /// Make the create-images call with the given zero-based call index fail.
    pub fn fail_create_images_call(mut self, call: usize) -> Self {
        self.faults.create_images_calls.insert(call);
        self
    }

    /// Make the service reject the image with the given name.
    pub fn reject_image(mut self, name: &str) -> Self {
        self.faults.rejected_images.insert(name.to_owned());
        self
    }

    /// Make listing images at the given offset fail.
    pub fn fail_list_images_at(mut self, skip: usize) -> Self {
        self.faults.list_offsets.insert(skip);
        self
    }

    /// Make every image deletion fail.
    pub fn fail_delete_images(mut self) -> Self {
        self.faults.delete_images = true;
        self
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            list_tags: self.counters.list_tags.load(Ordering::SeqCst),
            create_tag: self.counters.create_tag.load(Ordering::SeqCst),
            delete_tag: self.counters.delete_tag.load(Ordering::SeqCst),
            create_images: self.counters.create_images.load(Ordering::SeqCst),
            list_images: self.counters.list_images.load(Ordering::SeqCst),
            list_images_nonempty: self.counters.list_images_nonempty.load(Ordering::SeqCst),
            delete_images: self.counters.delete_images.load(Ordering::SeqCst),
        }
    }

    pub async fn tags(&self) -> Vec<Tag> {
        self.tags.read().await.clone()
    }

    pub async fn images(&self) -> Vec<StoredImage> {
        self.images.read().await.clone()
    }

    pub async fn image_count(&self) -> usize {
        self.images.read().await.len()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn injected(operation: &str) -> Error {
    Error::ApiError("Injected".to_owned(), format!("{} failed", operation))
}

impl TrainingStore for MemoryStore {
    async fn list_tags(&self) -> Result<Vec<Tag>, Error> {
        self.counters.list_tags.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        if self.faults.list_tags {
            return Err(injected("list tags"));
        }
        Ok(self.tags.read().await.clone())
    }

    async fn create_tag(&self, name: &str) -> Result<Tag, Error> {
        self.counters.create_tag.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        if self.faults.tags.contains(name) {
            return Err(injected("create tag"));
        }
        // Tag names are unique within a project.
        let mut tags = self.tags.write().await;
        if tags.iter().any(|t| t.name() == name) {
            return Err(Error::ApiError(
                "BadRequestTagNameNotUnique".to_owned(),
                format!("Tag '{}' already exists", name),
            ));
        }
        let tag = Tag::new(TagId::from(Uuid::new_v4()), name);
        tags.push(tag.clone());
        Ok(tag)
    }

    async fn delete_tag(&self, id: TagId) -> Result<(), Error> {
        self.counters.delete_tag.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        let mut tags = self.tags.write().await;
        let pos = tags
            .iter()
            .position(|t| t.id() == id)
            .ok_or_else(|| Error::ApiError("BadRequestTagNotFound".to_owned(), id.to_string()))?;
        if self.faults.tags.contains(tags[pos].name()) {
            return Err(injected("delete tag"));
        }
        tags.remove(pos);
        Ok(())
    }

    async fn create_images(&self, images: &[UploadRecord]) -> Result<ImageCreateSummary, Error> {
        let call = self.counters.create_images.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        if self.faults.create_images_calls.contains(&call) {
            return Err(injected("create images"));
        }

        let mut stored = self.images.write().await;
        let results = images
            .iter()
            .map(|record| {
                if self.faults.rejected_images.contains(&record.name) {
                    return ImageCreateResult {
                        source_url: Some(record.name.clone()),
                        status: "ErrorImageFormat".to_owned(),
                        image: None,
                    };
                }
                let image = Image::new(ImageId::from(Uuid::new_v4()), 0, 0);
                stored.push(StoredImage {
                    image: image.clone(),
                    name: record.name.clone(),
                    tag_ids: record.tag_ids.clone(),
                    regions: record.regions.clone(),
                });
                ImageCreateResult {
                    source_url: Some(record.name.clone()),
                    status: "OK".to_owned(),
                    image: Some(image),
                }
            })
            .collect::<Vec<_>>();

        Ok(ImageCreateSummary {
            is_batch_successful: results.iter().all(|r| r.is_uploaded()),
            images: results,
        })
    }

    async fn list_images(&self, skip: usize, take: usize) -> Result<Vec<Image>, Error> {
        self.counters.list_images.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        if self.faults.list_offsets.contains(&skip) {
            return Err(injected("list images"));
        }
        let page = self
            .images
            .read()
            .await
            .iter()
            .skip(skip)
            .take(take)
            .map(|stored| stored.image.clone())
            .collect::<Vec<_>>();
        if !page.is_empty() {
            self.counters
                .list_images_nonempty
                .fetch_add(1, Ordering::SeqCst);
        }
        Ok(page)
    }

    async fn delete_images(&self, ids: &[ImageId]) -> Result<(), Error> {
        self.counters.delete_images.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        if self.faults.delete_images {
            return Err(injected("delete images"));
        }
        let ids = ids.iter().collect::<HashSet<_>>();
        self.images
            .write()
            .await
            .retain(|stored| !ids.contains(&stored.image.id()));
        Ok(())
    }
}
