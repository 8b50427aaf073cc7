// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    Error, Image, ImageCreateSummary, ImageId, ProjectId, Settings, Tag, TagId, TrainingStore,
    UploadRecord,
    api::{ImageCreateBatch, ServiceError},
    retry::{create_retry_policy, log_retry_configuration, request_timeout},
};
use itertools::Itertools as _;
use log::{Level, debug, error, log_enabled, trace};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

const API_PATH: &str = "customvision/v3.3/training/projects";

/// Custom Vision training REST client bound to one project.
///
/// One `reqwest::Client` is shared by every request, with connection pooling
/// and a retry policy chosen per [`RetryScope`](crate::RetryScope).  Cloning the client is
/// cheap and shares the connection pool.
///
/// # Examples
///
/// ```no_run
/// use synthsync::{Client, Settings, TrainingStore};
///
/// # async fn example() -> Result<(), synthsync::Error> {
/// let settings = Settings::load(None)?;
/// let client = Client::new(&settings)?;
/// for tag in client.list_tags().await? {
///     println!("{}", tag);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    url: String,
    project_id: ProjectId,
    training_key: String,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.url)
            .field("project_id", &self.project_id)
            .finish()
    }
}

impl Client {
    /// Create a client from resolved settings.
    ///
    /// Fails with [`Error::EmptyKey`] when no training key is configured and
    /// with [`Error::UrlParseError`] when the endpoint is not a valid URL.
    pub fn new(settings: &Settings) -> Result<Self, Error> {
        log_retry_configuration();

        if settings.training_key.trim().is_empty() {
            return Err(Error::EmptyKey);
        }
        let project_id = settings.project_id()?;
        let endpoint = Url::parse(settings.endpoint.trim())?;

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(request_timeout())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .retry(create_retry_policy())
            .build()?;

        let url = format!(
            "{}/{}/{}",
            endpoint.as_str().trim_end_matches('/'),
            API_PATH,
            project_id
        );
        debug!("Training API: {}", url);

        Ok(Client {
            http,
            url,
            project_id,
            training_key: settings.training_key.trim().to_owned(),
        })
    }

    /// Base URL of the project's training API.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.url, path))
            .header("Accept", "application/json")
            .header("User-Agent", "synthsync")
            .header("Training-Key", &self.training_key)
    }

    /// Send a request and return the raw response body.
    ///
    /// Non-success responses are decoded into the service's error body and
    /// returned as [`Error::ApiError`].
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Vec<u8>, Error> {
        let resp = req.send().await?;
        let status = resp.error_for_status_ref().err();
        let body = resp.bytes().await?;

        if log_enabled!(Level::Trace) {
            trace!("Response: {}", String::from_utf8_lossy(&body));
        }

        match status {
            None => Ok(body.to_vec()),
            Some(err) => match serde_json::from_slice::<ServiceError>(&body) {
                Ok(service) => Err(Error::ApiError(service.code, service.message)),
                Err(_) => {
                    error!("Invalid error response: {}", String::from_utf8_lossy(&body));
                    Err(Error::HttpError(err))
                }
            },
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, Error> {
        let body = self.send(req).await?;
        match serde_json::from_slice(&body) {
            Ok(value) => Ok(value),
            Err(err) => {
                error!("Invalid JSON Response: {}", String::from_utf8_lossy(&body));
                Err(err.into())
            }
        }
    }
}

impl TrainingStore for Client {
    async fn list_tags(&self) -> Result<Vec<Tag>, Error> {
        self.send_json(self.request(reqwest::Method::GET, "tags"))
            .await
    }

    async fn create_tag(&self, name: &str) -> Result<Tag, Error> {
        debug!("Creating tag {}", name);
        let req = self
            .request(reqwest::Method::POST, "tags")
            .query(&[("name", name)]);
        self.send_json(req).await
    }

    async fn delete_tag(&self, id: TagId) -> Result<(), Error> {
        let req = self.request(reqwest::Method::DELETE, &format!("tags/{}", id));
        self.send(req).await.map(|_| ())
    }

    async fn create_images(&self, images: &[UploadRecord]) -> Result<ImageCreateSummary, Error> {
        debug!("Creating {} images", images.len());
        let req = self
            .request(reqwest::Method::POST, "images/files")
            .json(&ImageCreateBatch { images });
        self.send_json(req).await
    }

    async fn list_images(&self, skip: usize, take: usize) -> Result<Vec<Image>, Error> {
        let req = self
            .request(reqwest::Method::GET, "images")
            .query(&[("skip", skip), ("take", take)]);
        self.send_json(req).await
    }

    async fn delete_images(&self, ids: &[ImageId]) -> Result<(), Error> {
        if ids.is_empty() {
            return Ok(());
        }
        let req = self
            .request(reqwest::Method::DELETE, "images")
            .query(&[("imageIds", ids.iter().join(","))]);
        self.send(req).await.map(|_| ())
    }
}
