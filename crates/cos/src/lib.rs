//! Tencent COS upload client.
//!
//! Signs requests with the `q-sign-algorithm=sha1` scheme and uploads
//! objects either in a single `PUT` or through the multipart lifecycle
//! (initiate, upload parts, complete), picking the strategy by size.

pub mod client;
pub mod config;
pub mod multipart;
pub mod object;
pub mod sign;

pub use client::{CosClient, MAX_SINGLE_PUT, MULTIPART_THRESHOLD, UploadStrategy};
pub use config::{CosConfig, CosCredentials, CredentialsProvider, StaticCredentials};
pub use multipart::{DEFAULT_PART_SIZE, PartPlan, UploadedPart, plan_parts};
pub use object::{content_type_for, unique_object_name, validate_object_name};

/// Errors produced by the upload client.
#[derive(Debug, thiserror::Error)]
pub enum CosError {
    /// No usable key pair could be resolved. Raised before any network
    /// traffic; an upload never starts half-authenticated.
    #[error("signing credentials not configured")]
    CredentialsMissing,

    #[error("invalid object name: {0}")]
    InvalidObjectName(String),

    #[error("object of {size} bytes exceeds the {limit} byte single-request limit")]
    ObjectTooLarge { size: u64, limit: u64 },

    #[error("upload failed with status {status}: {body}")]
    UploadFailed { status: u16, body: String },

    #[error("unparsable server response: {0}")]
    InvalidResponse(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("config error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("part upload task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
