//! Object upload client: single-shot `PUT` and the multipart lifecycle.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::CosError;
use crate::config::{CosConfig, CredentialsProvider};
use crate::multipart::{self, DEFAULT_PART_SIZE, UploadedPart};
use crate::object::{content_type_for, validate_object_name};
use crate::sign;

/// Largest object that goes up in a single request. The boundary is
/// inclusive: an object of exactly this size still uses one `PUT`.
pub const MULTIPART_THRESHOLD: usize = 100 * 1024 * 1024;

/// Hard cap for one `PUT` object.
pub const MAX_SINGLE_PUT: u64 = 5 * 1024 * 1024 * 1024;

/// Concurrent part uploads per multipart session.
const PART_CONCURRENCY: usize = 4;

/// How an object of a given size gets uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    SinglePut,
    Multipart,
}

impl UploadStrategy {
    pub fn for_size(size: usize) -> Self {
        if size <= MULTIPART_THRESHOLD {
            Self::SinglePut
        } else {
            Self::Multipart
        }
    }
}

/// Cheaply cloneable COS client. Uploads fail fast without credentials
/// and carry no retry logic; the caller decides whether to try again.
#[derive(Clone)]
pub struct CosClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    config: CosConfig,
    creds: Arc<dyn CredentialsProvider>,
    part_size: usize,
}

impl CosClient {
    pub fn new(config: CosConfig, creds: Arc<dyn CredentialsProvider>) -> Self {
        Self::with_part_size(config, creds, DEFAULT_PART_SIZE)
    }

    /// Client with a custom multipart slice size; zero falls back to the
    /// default.
    pub fn with_part_size(
        config: CosConfig,
        creds: Arc<dyn CredentialsProvider>,
        part_size: usize,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                http: reqwest::Client::new(),
                config,
                creds,
                part_size: if part_size == 0 {
                    DEFAULT_PART_SIZE
                } else {
                    part_size
                },
            }),
        }
    }

    /// Uploads `data` with the strategy picked by size and returns the
    /// object URL.
    pub async fn smart_upload(&self, data: Vec<u8>, name: &str) -> Result<String, CosError> {
        match UploadStrategy::for_size(data.len()) {
            UploadStrategy::SinglePut => self.upload_file(data, name).await,
            UploadStrategy::Multipart => self.upload_multipart(data, name).await,
        }
    }

    /// Uploads `data` in one signed `PUT` and returns the object URL.
    pub async fn upload_file(&self, data: Vec<u8>, name: &str) -> Result<String, CosError> {
        validate_object_name(name)?;
        let creds = self.inner.creds.credentials()?;
        ensure_single_put_size(data.len() as u64)?;

        let content_type = content_type_for(name);
        let host = self.inner.config.host();
        let uri = format!("/{name}");
        let auth = sign::authorization(&creds, "PUT", &uri, content_type, &host, Utc::now().timestamp());
        let url = format!("{}{uri}", self.inner.config.base_url());

        debug!(name, size = data.len(), content_type, "uploading object");
        let response = self
            .inner
            .http
            .put(&url)
            .header("Content-Type", content_type)
            .header("Host", host)
            .header("Authorization", auth)
            .body(data)
            .send()
            .await?;
        ensure_success(response).await?;

        info!(url, "object uploaded");
        Ok(url)
    }

    /// Uploads `data` through the multipart lifecycle. Parts go up
    /// concurrently; on any failure the session is aborted best-effort
    /// and the first error is returned.
    pub async fn upload_multipart(&self, data: Vec<u8>, name: &str) -> Result<String, CosError> {
        validate_object_name(name)?;
        let content_type = content_type_for(name);
        let upload_id = self.initiate_multipart(name, content_type).await?;
        debug!(name, upload_id, size = data.len(), "multipart upload started");

        let result = self.upload_parts(Arc::new(data), name, &upload_id).await;
        match result {
            Ok(parts) => self.complete_multipart(name, &upload_id, parts).await,
            Err(err) => {
                self.abort_multipart(name, &upload_id).await;
                Err(err)
            }
        }
    }

    async fn initiate_multipart(
        &self,
        name: &str,
        content_type: &str,
    ) -> Result<String, CosError> {
        let creds = self.inner.creds.credentials()?;
        let host = self.inner.config.host();
        let uri = format!("/{name}?uploads");
        let auth = sign::authorization(&creds, "POST", &uri, content_type, &host, Utc::now().timestamp());
        let url = format!("{}{uri}", self.inner.config.base_url());

        let response = self
            .inner
            .http
            .post(&url)
            .header("Content-Type", content_type)
            .header("Host", host)
            .header("Authorization", auth)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let body = response.text().await?;

        multipart::extract_upload_id(&body)
            .ok_or_else(|| CosError::InvalidResponse("missing UploadId in initiate response".into()))
    }

    async fn upload_parts(
        &self,
        data: Arc<Vec<u8>>,
        name: &str,
        upload_id: &str,
    ) -> Result<Vec<UploadedPart>, CosError> {
        let plans = multipart::plan_parts(data.len(), self.inner.part_size);
        let semaphore = Arc::new(Semaphore::new(PART_CONCURRENCY));
        let mut tasks = JoinSet::new();

        for plan in plans {
            let client = self.clone();
            let data = Arc::clone(&data);
            let semaphore = Arc::clone(&semaphore);
            let name = name.to_string();
            let upload_id = upload_id.to_string();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");
                let chunk = data[plan.offset..plan.offset + plan.len].to_vec();
                client
                    .upload_part(&name, &upload_id, plan.part_number, chunk)
                    .await
            });
        }

        // A failed part fails the whole upload; dropping the set aborts
        // the parts still in flight.
        let mut parts = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            parts.push(joined??);
        }
        Ok(parts)
    }

    async fn upload_part(
        &self,
        name: &str,
        upload_id: &str,
        part_number: u32,
        chunk: Vec<u8>,
    ) -> Result<UploadedPart, CosError> {
        let creds = self.inner.creds.credentials()?;
        let host = self.inner.config.host();
        let content_type = "application/octet-stream";
        let uri = format!("/{name}?partNumber={part_number}&uploadId={upload_id}");
        let auth = sign::authorization(&creds, "PUT", &uri, content_type, &host, Utc::now().timestamp());
        let url = format!("{}{uri}", self.inner.config.base_url());

        debug!(part_number, len = chunk.len(), "uploading part");
        let response = self
            .inner
            .http
            .put(&url)
            .header("Content-Type", content_type)
            .header("Host", host)
            .header("Authorization", auth)
            .body(chunk)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim_matches('"').to_string())
            .ok_or_else(|| {
                CosError::InvalidResponse(format!("part {part_number} response missing ETag"))
            })?;
        Ok(UploadedPart { part_number, etag })
    }

    async fn complete_multipart(
        &self,
        name: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> Result<String, CosError> {
        let creds = self.inner.creds.credentials()?;
        let host = self.inner.config.host();
        let content_type = "application/xml";
        let uri = format!("/{name}?uploadId={upload_id}");
        let auth = sign::authorization(&creds, "POST", &uri, content_type, &host, Utc::now().timestamp());
        let url = format!("{}{uri}", self.inner.config.base_url());
        let body = multipart::complete_multipart_xml(&parts);

        let response = self
            .inner
            .http
            .post(&url)
            .header("Content-Type", content_type)
            .header("Host", host)
            .header("Authorization", auth)
            .body(body)
            .send()
            .await?;
        ensure_success(response).await?;

        let object_url = format!("{}/{name}", self.inner.config.base_url());
        info!(url = object_url, parts = parts.len(), "multipart upload completed");
        Ok(object_url)
    }

    /// Best-effort session abort after a failed part; the original
    /// error always wins, so failures here are only logged.
    async fn abort_multipart(&self, name: &str, upload_id: &str) {
        let Ok(creds) = self.inner.creds.credentials() else {
            return;
        };
        let host = self.inner.config.host();
        let content_type = "application/octet-stream";
        let uri = format!("/{name}?uploadId={upload_id}");
        let auth = sign::authorization(&creds, "DELETE", &uri, content_type, &host, Utc::now().timestamp());
        let url = format!("{}{uri}", self.inner.config.base_url());

        let result = self
            .inner
            .http
            .delete(&url)
            .header("Content-Type", content_type)
            .header("Host", host)
            .header("Authorization", auth)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                debug!(upload_id, "multipart upload aborted");
            }
            Ok(response) => {
                warn!(upload_id, status = %response.status(), "abort request rejected");
            }
            Err(err) => warn!(upload_id, error = %err, "abort request failed"),
        }
    }
}

fn ensure_single_put_size(size: u64) -> Result<(), CosError> {
    if size > MAX_SINGLE_PUT {
        return Err(CosError::ObjectTooLarge {
            size,
            limit: MAX_SINGLE_PUT,
        });
    }
    Ok(())
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, CosError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(CosError::UploadFailed { status, body })
}
