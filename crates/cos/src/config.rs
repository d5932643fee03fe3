//! Bucket configuration and credential resolution.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::CosError;

/// Bucket coordinates. Loaded from a JSON config file or built directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CosConfig {
    pub bucket: String,
    pub region: String,
}

impl CosConfig {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
        }
    }

    /// Loads bucket settings from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, CosError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Virtual-hosted bucket endpoint, also the signed `Host` header.
    pub fn host(&self) -> String {
        format!("{}.cos.{}.myqcloud.com", self.bucket, self.region)
    }

    pub fn base_url(&self) -> String {
        format!("https://{}", self.host())
    }
}

/// A COS key pair. `Debug` redacts the secret.
#[derive(Clone, Serialize, Deserialize)]
pub struct CosCredentials {
    pub secret_id: String,
    pub secret_key: String,
}

impl fmt::Debug for CosCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CosCredentials")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Source of signing credentials, consulted per request so rotated keys
/// take effect without rebuilding the client.
pub trait CredentialsProvider: Send + Sync {
    /// Resolves the key pair, or fails with
    /// [`CosError::CredentialsMissing`] before any network call is made.
    fn credentials(&self) -> Result<CosCredentials, CosError>;
}

/// Fixed key pair injected at construction.
pub struct StaticCredentials {
    creds: CosCredentials,
}

impl StaticCredentials {
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            creds: CosCredentials {
                secret_id: secret_id.into(),
                secret_key: secret_key.into(),
            },
        }
    }
}

impl CredentialsProvider for StaticCredentials {
    fn credentials(&self) -> Result<CosCredentials, CosError> {
        if self.creds.secret_id.is_empty() || self.creds.secret_key.is_empty() {
            return Err(CosError::CredentialsMissing);
        }
        Ok(self.creds.clone())
    }
}
