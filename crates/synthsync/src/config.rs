// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Layered configuration.
//!
//! Settings are resolved from, lowest to highest precedence:
//!
//! 1. built-in defaults
//! 2. a TOML file, either given explicitly or `config.toml` in the platform
//!    config directory (`~/.config/synthsync/config.toml` on Linux)
//! 3. environment variables prefixed with `SYNTHSYNC_`, e.g.
//!    `SYNTHSYNC_TRAINING_KEY` or `SYNTHSYNC_PROJECT_ID`
//!
//! ```toml
//! endpoint = "https://westeurope.api.cognitive.microsoft.com"
//! project_id = "1b4e28ba-2fa1-11d2-883f-0016d3cca427"
//! batch_size = 20
//! ```

use crate::{Error, ProjectId, upload::MAX_UPLOAD_BATCH};
use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
};

const ENV_PREFIX: &str = "SYNTHSYNC";
const MAX_PAGE_SIZE: usize = 256;

/// Resolved configuration of the ingestion and teardown pipelines.
#[derive(Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Base URL of the training service, without the API path.
    pub endpoint: String,
    pub training_key: String,
    pub project_id: Option<String>,
    /// Capture folders per ingestion group.
    pub batch_size: usize,
    /// Ingestion groups in flight.
    pub concurrency: usize,
    /// Records per create-images call.
    pub upload_batch_size: usize,
    /// Images requested per page during teardown.
    pub page_size: usize,
    /// Pages fetched per teardown round.
    pub delete_concurrency: usize,
}

// The training key never appears in logs.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("endpoint", &self.endpoint)
            .field(
                "training_key",
                &if self.training_key.is_empty() { "" } else { "***" },
            )
            .field("project_id", &self.project_id)
            .field("batch_size", &self.batch_size)
            .field("concurrency", &self.concurrency)
            .field("upload_batch_size", &self.upload_batch_size)
            .field("page_size", &self.page_size)
            .field("delete_concurrency", &self.delete_concurrency)
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            endpoint: String::new(),
            training_key: String::new(),
            project_id: None,
            batch_size: 10,
            concurrency: 4,
            upload_batch_size: MAX_UPLOAD_BATCH,
            page_size: crate::delete::PAGE_SIZE,
            delete_concurrency: crate::delete::DELETE_CONCURRENCY,
        }
    }
}

impl Settings {
    /// Default location of the configuration file.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "synthsync").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load settings from defaults, the configuration file and the process
    /// environment.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        Self::load_from(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_from(path: Option<&Path>, env: Environment) -> Result<Self, Error> {
        let defaults = Settings::default();
        let mut builder = Config::builder()
            .set_default("endpoint", defaults.endpoint)?
            .set_default("training_key", defaults.training_key)?
            .set_default("batch_size", defaults.batch_size as u64)?
            .set_default("concurrency", defaults.concurrency as u64)?
            .set_default("upload_batch_size", defaults.upload_batch_size as u64)?
            .set_default("page_size", defaults.page_size as u64)?
            .set_default("delete_concurrency", defaults.delete_concurrency as u64)?;

        match path {
            Some(path) => {
                debug!("Loading configuration from {:?}", path);
                builder = builder.add_source(File::from(path).format(FileFormat::Toml));
            }
            None => {
                if let Some(path) = Self::default_path() {
                    debug!("Loading optional configuration from {:?}", path);
                    builder = builder.add_source(
                        File::from(path)
                            .format(FileFormat::Toml)
                            .required(false),
                    );
                }
            }
        }

        let settings: Settings = builder
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;
        debug!("Resolved settings: {:?}", settings);
        Ok(settings)
    }

    /// Check the tuning caps and that a project is configured.
    pub fn validate(&self) -> Result<(), Error> {
        let caps = [
            ("batch_size", self.batch_size),
            ("concurrency", self.concurrency),
            ("upload_batch_size", self.upload_batch_size),
            ("page_size", self.page_size),
            ("delete_concurrency", self.delete_concurrency),
        ];
        if let Some((name, _)) = caps.iter().find(|(_, value)| *value == 0) {
            return Err(Error::InvalidParameters(format!("{} must be at least 1", name)));
        }
        if self.upload_batch_size > MAX_UPLOAD_BATCH {
            return Err(Error::InvalidParameters(format!(
                "upload_batch_size must be at most {}",
                MAX_UPLOAD_BATCH
            )));
        }
        if self.page_size > MAX_PAGE_SIZE {
            return Err(Error::InvalidParameters(format!(
                "page_size must be at most {}",
                MAX_PAGE_SIZE
            )));
        }
        self.project_id().map(|_| ())
    }

    /// The configured project, parsed.
    pub fn project_id(&self) -> Result<ProjectId, Error> {
        match self.project_id.as_deref().map(str::trim) {
            None | Some("") => Err(Error::InvalidParameters(
                "project id is not configured".to_owned(),
            )),
            Some(id) => id.parse(),
        }
    }
}
