// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    BatchUploader, CaptureAnnotation, Error, FsImageSource, TagCache, TagResolver, TrainingStore,
    UploadRecordBuilder, upload::MAX_UPLOAD_BATCH, upload::partition,
};
use futures::future::join_all;
use log::{info, warn};
use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::{
    sync::{Semaphore, mpsc::Sender},
    task::JoinError,
};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

/// Progress information for long-running operations.
///
/// Ingestion reports completed folder groups; teardown reports deleted
/// images against images seen so far.
///
/// # Examples
///
/// ```rust
/// use synthsync::Progress;
///
/// let progress = Progress {
///     current: 25,
///     total: 100,
/// };
/// let percentage = (progress.current as f64 / progress.total as f64) * 100.0;
/// println!(
///     "Progress: {:.1}% ({}/{})",
///     percentage, progress.current, progress.total
/// );
/// ```
#[derive(Debug, Clone)]
pub struct Progress {
    /// Current number of completed items.
    pub current: usize,
    /// Total number of items to process.
    pub total: usize,
}

/// Aggregated outcome of an ingestion run.
///
/// Lists are sorted before the report is returned so the report does not
/// depend on the order in which groups finished.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Capture folders processed.
    pub folders: usize,
    /// Upload records built.
    pub records: usize,
    /// Images the service accepted.
    pub uploaded: usize,
    /// Folders whose annotation could not be parsed.
    pub skipped_folders: Vec<(PathBuf, Error)>,
    /// Captures whose image or tags could not be resolved.
    pub capture_failures: Vec<(PathBuf, Error)>,
    /// Group index, chunk index and error of every failed upload chunk.
    pub batch_failures: Vec<(usize, usize, Error)>,
    /// Labels that could not be prefetched.
    pub prefetch_failures: Vec<Error>,
    /// Groups whose task died before reporting.
    pub group_failures: Vec<(usize, Error)>,
    pub cancelled: bool,
}

impl RunReport {
    fn merge(&mut self, other: RunReport) {
        self.folders += other.folders;
        self.records += other.records;
        self.uploaded += other.uploaded;
        self.skipped_folders.extend(other.skipped_folders);
        self.capture_failures.extend(other.capture_failures);
        self.batch_failures.extend(other.batch_failures);
        self.prefetch_failures.extend(other.prefetch_failures);
        self.group_failures.extend(other.group_failures);
    }

    fn absorb(&mut self, group: usize, joined: Result<RunReport, JoinError>) {
        match joined {
            Ok(report) => self.merge(report),
            Err(err) => {
                warn!("Batch {} did not complete: {}", group + 1, err);
                self.group_failures.push((group, err.into()));
            }
        }
    }

    fn sort(&mut self) {
        self.skipped_folders.sort_by(|a, b| a.0.cmp(&b.0));
        self.capture_failures.sort_by(|a, b| a.0.cmp(&b.0));
        self.batch_failures.sort_by_key(|(group, chunk, _)| (*group, *chunk));
        self.group_failures.sort_by_key(|(group, _)| *group);
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} folders, {} records built, {} images uploaded, {} folders skipped, \
             {} captures failed, {} batches failed, {} groups lost{}",
            self.folders,
            self.records,
            self.uploaded,
            self.skipped_folders.len(),
            self.capture_failures.len(),
            self.batch_failures.len(),
            self.group_failures.len(),
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}

/// List the immediate subdirectories of `root`, sorted by name.
///
/// An unreadable root is fatal ([`Error::RootUnreadable`]); unreadable
/// entries below it are logged and skipped.
pub fn list_capture_folders<P: AsRef<Path>>(root: P) -> Result<Vec<PathBuf>, Error> {
    let root = root.as_ref();
    let mut folders = vec![];
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => folders.push(entry.into_path()),
            Ok(_) => {}
            Err(err) if err.depth() == 0 => {
                return Err(Error::RootUnreadable(root.to_path_buf(), err.into()));
            }
            Err(err) => warn!("Skipping unreadable entry: {}", err),
        }
    }
    Ok(folders)
}

struct GroupWorker<S> {
    builder: UploadRecordBuilder<S>,
    uploader: BatchUploader<S>,
    upload_batch_size: usize,
}

impl<S: TrainingStore + 'static> GroupWorker<S> {
    async fn process(&self, index: usize, total: usize, folders: Vec<PathBuf>) -> RunReport {
        let mut report = RunReport::default();
        let mut records = vec![];

        for folder in folders {
            report.folders += 1;
            let path = folder.clone();
            let loaded = tokio::task::spawn_blocking(move || CaptureAnnotation::load_folder(path))
                .await
                .unwrap_or_else(|err| Err(err.into()));
            match loaded {
                Ok(annotation) => {
                    let outcome = self.builder.build(&annotation, &FsImageSource).await;
                    records.extend(outcome.records);
                    report.capture_failures.extend(outcome.failures);
                }
                Err(err) => {
                    warn!("Skipping folder {:?}: {}", folder, err);
                    report.skipped_folders.push((folder, err));
                }
            }
        }

        info!(
            "Processing batch {} of {}: {} records",
            index + 1,
            total,
            records.len()
        );
        report.records = records.len();

        if !records.is_empty() {
            let upload = self.uploader.upload(records, self.upload_batch_size).await;
            report.uploaded = upload.uploaded;
            report.batch_failures = upload
                .failures
                .into_iter()
                .map(|(chunk, err)| (index, chunk, err))
                .collect();
        }
        report
    }
}

/// Drives ingestion of a directory of capture folders into a training store.
///
/// Folders are grouped in batches; each group loads its annotations, builds
/// upload records and uploads them.  Up to `concurrency` groups run at once
/// and all groups share one [`TagCache`].
///
/// # Examples
///
/// ```rust,no_run
/// use synthsync::{IngestionOrchestrator, MemoryStore};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), synthsync::Error> {
/// let store = Arc::new(MemoryStore::new());
/// let report = IngestionOrchestrator::new(store)
///     .run("captures", 10, 4)
///     .await?;
/// println!("{}", report);
/// # Ok(())
/// # }
/// ```
pub struct IngestionOrchestrator<S> {
    store: Arc<S>,
    resolver: Arc<TagResolver<S>>,
    labels: Vec<String>,
    upload_batch_size: usize,
    upload_concurrency: usize,
    cancel: CancellationToken,
    progress: Option<Sender<Progress>>,
}

impl<S: TrainingStore + 'static> IngestionOrchestrator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_cache(store, Arc::new(TagCache::new()))
    }

    /// Use an existing cache, e.g. one warmed by an earlier run.
    pub fn with_cache(store: Arc<S>, cache: Arc<TagCache>) -> Self {
        let resolver = Arc::new(TagResolver::new(store.clone(), cache));
        IngestionOrchestrator {
            store,
            resolver,
            labels: vec![],
            upload_batch_size: MAX_UPLOAD_BATCH,
            upload_concurrency: 2,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Labels to resolve before the first group starts.
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    /// Records per create-images call and concurrent calls per group.
    pub fn with_upload(mut self, batch_size: usize, concurrency: usize) -> Self {
        self.upload_batch_size = batch_size;
        self.upload_concurrency = concurrency;
        self
    }

    /// Stop starting new groups once `cancel` fires.  Groups already running
    /// finish their uploads.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Sender<Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn cache(&self) -> &Arc<TagCache> {
        self.resolver.cache()
    }

    /// Ingest every capture folder directly below `root`.
    ///
    /// Fails only if `root` cannot be listed or the background tag cannot be
    /// resolved, both before any group starts.  Every other failure is
    /// recorded in the returned report.
    #[cfg_attr(feature = "profiling", tracing::instrument(skip(self, root)))]
    pub async fn run<P: AsRef<Path>>(
        &self,
        root: P,
        batch_size: usize,
        concurrency: usize,
    ) -> Result<RunReport, Error> {
        let root = root.as_ref();
        let folders = list_capture_folders(root)?;
        info!(
            "Starting data processing in root directory: {:?} ({} folders)",
            root,
            folders.len()
        );

        self.resolver.ensure_background().await?;

        let mut report = RunReport {
            prefetch_failures: self.resolver.prefetch(&self.labels).await,
            ..Default::default()
        };

        let worker = Arc::new(GroupWorker {
            builder: UploadRecordBuilder::new(self.resolver.clone()),
            uploader: BatchUploader::new(self.store.clone(), self.upload_concurrency),
            upload_batch_size: self.upload_batch_size,
        });

        let groups = partition(folders, batch_size);
        let total = groups.len();
        let sem = Arc::new(Semaphore::new(concurrency.max(1)));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut tasks = vec![];
        let mut started = vec![];

        for (index, group) in groups.into_iter().enumerate() {
            // Waiting for a free worker doubles as the cancellation point.
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = sem.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                report.cancelled = true;
                break;
            };

            let worker = worker.clone();
            let completed = completed.clone();
            let progress = self.progress.clone();

            started.push(index);
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                let report = worker.process(index, total, group).await;

                if let Some(progress) = &progress {
                    let current = completed.fetch_add(1, Ordering::SeqCst);
                    let _ = progress
                        .send(Progress {
                            current: current + 1,
                            total,
                        })
                        .await;
                }
                report
            }));
        }

        if report.cancelled {
            warn!(
                "Run cancelled, waiting for {} started batches to finish",
                tasks.len()
            );
        }

        for (group, joined) in started.into_iter().zip(join_all(tasks).await) {
            report.absorb(group, joined);
        }
        report.sort();

        info!("Data processing complete: {}", report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStore, annotation::FRAME_DATA_FILE, builder::tests::png};
    use std::{fs, time::Duration};
    use tempfile::TempDir;

    fn capture_folder(root: &Path, name: &str, label: Option<&str>) {
        let folder = root.join(name);
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("rgb.png"), png(32, 32)).unwrap();

        let values = match label {
            Some(label) => format!(
                r#"[{{"labelName": "{}", "origin": [4, 4], "dimension": [8, 8]}}]"#,
                label
            ),
            None => "null".to_string(),
        };
        fs::write(
            folder.join(FRAME_DATA_FILE),
            format!(
                r#"{{"frame": 0, "captures": [{{"filename": "rgb.png", "annotations": [{{"values": {}}}]}}]}}"#,
                values
            ),
        )
        .unwrap();
    }

    #[test]
    fn test_list_capture_folders_sorted_dirs_only() {
        let root = TempDir::new().unwrap();
        for name in ["c", "a", "b"] {
            fs::create_dir(root.path().join(name)).unwrap();
        }
        fs::write(root.path().join("notes.txt"), "x").unwrap();

        let folders = list_capture_folders(root.path()).unwrap();
        let names = folders
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_run_unreadable_root_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        let result = IngestionOrchestrator::new(store.clone())
            .run("/nonexistent/synthsync/root", 10, 2)
            .await;

        assert!(matches!(result, Err(Error::RootUnreadable(_, _))));
        assert_eq!(store.calls().list_tags, 0);
    }

    #[tokio::test]
    async fn test_run_store_unreachable_is_fatal_before_batches() {
        let root = TempDir::new().unwrap();
        capture_folder(root.path(), "a", Some("cup"));

        let store = Arc::new(MemoryStore::new().fail_list_tags());
        let result = IngestionOrchestrator::new(store.clone())
            .run(root.path(), 10, 2)
            .await;

        assert!(matches!(result, Err(Error::TagResolutionFailed(_, _))));
        assert_eq!(store.calls().create_images, 0);
    }

    #[tokio::test]
    async fn test_run_many_groups_concurrently() {
        let root = TempDir::new().unwrap();
        for n in 0..25 {
            let label = ["cup", "plate", "fork"][n % 3];
            capture_folder(root.path(), &format!("capture_{:03}", n), Some(label));
        }

        let store = Arc::new(MemoryStore::new());
        let (tx, mut rx) = tokio::sync::mpsc::channel(32);
        let orchestrator = IngestionOrchestrator::new(store.clone())
            .with_upload(4, 2)
            .with_progress(tx);

        let report = orchestrator.run(root.path(), 10, 2).await.unwrap();
        drop(orchestrator);

        assert_eq!(report.folders, 25);
        assert_eq!(report.records, 25);
        assert_eq!(report.uploaded, 25);
        assert!(report.skipped_folders.is_empty());
        assert_eq!(store.image_count().await, 25);
        // Three labels plus background, each created once across groups.
        assert_eq!(store.calls().create_tag, 4);
        // Groups of 10, 10 and 5 folders uploaded 4 records at a time.
        assert_eq!(store.calls().create_images, 3 + 3 + 2);

        let mut updates = vec![];
        while let Some(progress) = rx.recv().await {
            updates.push(progress.current);
        }
        updates.sort();
        assert_eq!(updates, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_run_prefetches_labels() {
        let root = TempDir::new().unwrap();
        capture_folder(root.path(), "a", Some("cup"));

        let store = Arc::new(MemoryStore::new().fail_tag("knife"));
        let orchestrator = IngestionOrchestrator::new(store.clone())
            .with_labels(vec!["cup".to_string(), "knife".to_string()]);
        let report = orchestrator.run(root.path(), 10, 1).await.unwrap();

        assert_eq!(report.uploaded, 1);
        assert_eq!(report.prefetch_failures.len(), 1);
        assert!(orchestrator.cache().get("cup").await.is_some());
    }

    #[tokio::test]
    async fn test_run_batch_failure_is_reported() {
        let root = TempDir::new().unwrap();
        for n in 0..4 {
            capture_folder(root.path(), &format!("capture_{}", n), Some("cup"));
        }

        // A single group uploads chunks of one record sequentially.
        let store = Arc::new(MemoryStore::new().fail_create_images_call(2));
        let report = IngestionOrchestrator::new(store.clone())
            .with_upload(1, 1)
            .run(root.path(), 10, 1)
            .await
            .unwrap();

        assert_eq!(report.uploaded, 3);
        assert_eq!(report.batch_failures.len(), 1);
        assert_eq!((report.batch_failures[0].0, report.batch_failures[0].1), (0, 2));
    }

    #[tokio::test]
    async fn test_run_cancelled_mid_run_finishes_started_groups() {
        let root = TempDir::new().unwrap();
        for n in 0..6 {
            capture_folder(root.path(), &format!("capture_{}", n), Some("cup"));
        }

        let cancel = CancellationToken::new();
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(20)));
        let orchestrator = IngestionOrchestrator::new(store.clone())
            .with_cancellation(cancel.clone())
            .with_progress(tx);

        let path = root.path().to_path_buf();
        let run = tokio::spawn(async move { orchestrator.run(path, 1, 1).await });

        let first = rx.recv().await.unwrap();
        assert_eq!((first.current, first.total), (1, 6));
        cancel.cancel();

        let report = run.await.unwrap().unwrap();
        let mut updates = vec![first.current];
        while let Some(progress) = rx.recv().await {
            updates.push(progress.current);
        }

        assert!(report.cancelled);
        // Every started group ran to completion and was counted.
        assert!(report.folders >= 1 && report.folders < 6);
        assert_eq!(report.uploaded, report.folders);
        assert_eq!(updates.len(), report.folders);
        assert_eq!(store.calls().create_images, report.folders);
        assert_eq!(store.image_count().await, report.folders);
    }

    #[tokio::test]
    async fn test_lost_group_is_recorded() {
        let mut report = RunReport {
            folders: 3,
            uploaded: 3,
            ..Default::default()
        };
        let panicked: Result<RunReport, JoinError> =
            tokio::spawn(async { panic!("group worker died") }).await;
        let finished = tokio::spawn(async {
            RunReport {
                folders: 2,
                uploaded: 2,
                ..Default::default()
            }
        })
        .await;

        report.absorb(4, panicked);
        report.absorb(5, finished);
        report.sort();

        assert_eq!(report.folders, 5);
        assert_eq!(report.uploaded, 5);
        assert_eq!(report.group_failures.len(), 1);
        assert_eq!(report.group_failures[0].0, 4);
        assert!(matches!(report.group_failures[0].1, Error::JoinError(_)));
        assert!(report.to_string().contains("1 groups lost"));
    }

    #[test]
    fn test_list_capture_folders_missing_root() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("missing");
        assert!(matches!(
            list_capture_folders(&missing),
            Err(Error::RootUnreadable(path, _)) if path == missing
        ));
    }

    #[tokio::test]
    async fn test_run_cancelled_starts_no_groups() {
        let root = TempDir::new().unwrap();
        capture_folder(root.path(), "a", Some("cup"));

        let cancel = CancellationToken::new();
        cancel.cancel();

        let store = Arc::new(MemoryStore::new());
        let report = IngestionOrchestrator::new(store.clone())
            .with_cancellation(cancel)
            .run(root.path(), 10, 1)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.folders, 0);
        assert_eq!(store.calls().create_images, 0);
    }
}
