// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, Password, PasswordDisplayMode};
use log::warn;
use std::{path::PathBuf, sync::Arc};
use synthsync::{
    BulkDeleter, Client, Error, IngestionOrchestrator, MemoryStore, Progress, Settings, TagCache,
    TagResolver, TrainingStore, load_label_names,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file, defaults to config.toml in the user configuration
    /// directory
    #[clap(long, env = "SYNTHSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Training service endpoint
    #[clap(long, env = "SYNTHSYNC_ENDPOINT")]
    endpoint: Option<String>,

    /// Training project ID
    #[clap(long, env = "SYNTHSYNC_PROJECT_ID")]
    project: Option<String>,

    /// Training key, prompted for when not configured
    #[clap(long, env = "SYNTHSYNC_TRAINING_KEY", hide_env_values = true)]
    training_key: Option<String>,

    /// Command
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Print the label names of an annotation definition file.
    Labels {
        /// Annotation definition file
        definitions: PathBuf,
    },
    /// List the tags of the training project.
    Tags,
    /// Create every label of an annotation definition file, plus the
    /// background tag, as project tags.
    PrefetchTags {
        /// Annotation definition file
        definitions: PathBuf,
    },
    /// Upload every capture folder below the root directory.
    Upload {
        /// Directory holding one folder per capture
        root: PathBuf,

        /// Capture folders per batch
        #[clap(long)]
        batch_size: Option<usize>,

        /// Batches processed concurrently
        #[clap(long)]
        concurrency: Option<usize>,

        /// Annotation definition file whose labels are created up front
        #[clap(long)]
        definitions: Option<PathBuf>,

        /// Build and upload into an in-memory store instead of the service
        #[clap(long)]
        dry_run: bool,
    },
    /// Delete every image and tag of the training project.
    DeleteAll {
        /// Skip the confirmation prompt
        #[clap(long, short)]
        yes: bool,
    },
}

fn prompt_error(err: inquire::InquireError) -> Error {
    Error::InvalidParameters(format!("prompt failed: {}", err))
}

fn progress_bar(message: &'static str) -> (ProgressBar, mpsc::Sender<Progress>) {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template(
        "[{elapsed_precise} ETA: {eta}] {msg}: {wide_bar:.yellow} {human_pos}/{human_len}",
    ) {
        bar.set_style(style.progress_chars("█▇▆▅▄▃▂▁  "));
    }
    bar.set_message(message);

    let (tx, mut rx) = mpsc::channel::<Progress>(1);
    let updates = bar.clone();
    tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            if progress.total > 0 {
                updates.set_length(progress.total as u64);
                updates.set_position(progress.current as u64);
            }
        }
    });

    (bar, tx)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, waiting for work in flight to finish");
            token.cancel();
        }
    });
    cancel
}

fn connect(mut settings: Settings) -> Result<Client, Error> {
    settings.validate()?;
    if settings.training_key.trim().is_empty() {
        settings.training_key = Password::new("Training Key")
            .with_display_mode(PasswordDisplayMode::Masked)
            .without_confirmation()
            .prompt()
            .map_err(prompt_error)?;
    }
    Client::new(&settings)
}

fn handle_labels(definitions: PathBuf) -> Result<(), Error> {
    for label in load_label_names(definitions)? {
        println!("{}", label);
    }
    Ok(())
}

async fn handle_tags(client: &Client) -> Result<(), Error> {
    let mut tags = client.list_tags().await?;
    tags.sort_by(|a, b| a.name().cmp(b.name()));
    for tag in tags {
        println!("[{}] {} ({} images)", tag.id(), tag.name(), tag.image_count());
    }
    Ok(())
}

async fn handle_prefetch_tags(client: Client, definitions: PathBuf) -> Result<(), Error> {
    let labels = load_label_names(definitions)?;
    let resolver = TagResolver::new(Arc::new(client), Arc::new(TagCache::new()));

    resolver.ensure_background().await?;
    let failures = resolver.prefetch(&labels).await;

    let mut tags = resolver.cache().snapshot().await.into_iter().collect::<Vec<_>>();
    tags.sort();
    for (name, id) in tags {
        println!("[{}] {}", id, name);
    }
    for err in &failures {
        eprintln!("{}", err);
    }

    match failures.into_iter().next() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn handle_upload<S: TrainingStore + 'static>(
    store: Arc<S>,
    settings: &Settings,
    root: PathBuf,
    definitions: Option<PathBuf>,
) -> Result<(), Error> {
    let labels = match definitions {
        Some(definitions) => load_label_names(definitions)?,
        None => vec![],
    };

    let (bar, tx) = progress_bar("Uploading");
    let report = IngestionOrchestrator::new(store)
        .with_labels(labels)
        .with_upload(settings.upload_batch_size, 2)
        .with_cancellation(cancel_on_ctrl_c())
        .with_progress(tx)
        .run(root, settings.batch_size, settings.concurrency)
        .await?;
    bar.finish_and_clear();

    for (folder, err) in &report.skipped_folders {
        eprintln!("Skipped {}: {}", folder.display(), err);
    }
    for (path, err) in &report.capture_failures {
        eprintln!("Failed {}: {}", path.display(), err);
    }
    for (group, chunk, err) in &report.batch_failures {
        eprintln!("Batch {}.{} failed: {}", group + 1, chunk + 1, err);
    }
    for err in &report.prefetch_failures {
        eprintln!("{}", err);
    }
    println!("{}", report);
    Ok(())
}

async fn handle_delete_all(client: Client, settings: &Settings, yes: bool) -> Result<(), Error> {
    if !yes {
        let confirmed = Confirm::new(&format!(
            "Delete every image and tag in project {}?",
            client.project_id()
        ))
        .with_default(false)
        .prompt()
        .map_err(prompt_error)?;
        if !confirmed {
            println!("Aborted");
            return Ok(());
        }
    }

    let (bar, tx) = progress_bar("Deleting");
    let report = BulkDeleter::new(Arc::new(client))
        .with_page_size(settings.page_size)
        .with_concurrency(settings.delete_concurrency)
        .with_cancellation(cancel_on_ctrl_c())
        .with_progress(tx)
        .delete_all()
        .await;
    bar.finish_and_clear();

    for err in &report.failures {
        eprintln!("{}", err);
    }
    println!("{}", report);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    // Commands that need neither configuration nor the service.
    let cmd = match args.cmd {
        Command::Labels { definitions } => return handle_labels(definitions),
        cmd => cmd,
    };

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(endpoint) = args.endpoint {
        settings.endpoint = endpoint;
    }
    if let Some(project) = args.project {
        settings.project_id = Some(project);
    }
    if let Some(training_key) = args.training_key {
        settings.training_key = training_key;
    }

    match cmd {
        Command::Labels { definitions } => handle_labels(definitions),
        Command::Tags => handle_tags(&connect(settings)?).await,
        Command::PrefetchTags { definitions } => {
            handle_prefetch_tags(connect(settings)?, definitions).await
        }
        Command::Upload {
            root,
            batch_size,
            concurrency,
            definitions,
            dry_run,
        } => {
            if let Some(batch_size) = batch_size {
                settings.batch_size = batch_size;
            }
            if let Some(concurrency) = concurrency {
                settings.concurrency = concurrency;
            }

            if dry_run {
                let store = Arc::new(MemoryStore::new());
                handle_upload(store, &settings, root, definitions).await
            } else {
                let client = Arc::new(connect(settings.clone())?);
                handle_upload(client, &settings, root, definitions).await
            }
        }
        Command::DeleteAll { yes } => {
            let client = connect(settings.clone())?;
            handle_delete_all(client, &settings, yes).await
        }
    }
}
