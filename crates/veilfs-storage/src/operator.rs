//! OpenDAL Operator factory for S3-compatible stores

use opendal::Operator;
use secrecy::{ExposeSecret, SecretString};
use veilfs_core::config::StorageConfig;
use veilfs_core::{VeilError, VeilResult};

/// Credentials for an S3-compatible endpoint.
#[derive(Debug)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
}

impl S3Credentials {
    /// Read `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` from the environment.
    pub fn from_env() -> Option<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok()?;
        let secret = std::env::var("AWS_SECRET_ACCESS_KEY").ok()?;
        Some(Self {
            access_key_id,
            secret_access_key: SecretString::from(secret),
        })
    }
}

/// Build an OpenDAL Operator for an S3-compatible endpoint.
///
/// Path-style addressing is the opendal 0.55 default, which SeaweedFS and
/// MinIO require. `storage.root` becomes the key prefix inside the bucket.
///
/// If `enforce_tls` is set and the endpoint uses HTTP, this returns an error.
/// Otherwise a warning is logged for non-HTTPS endpoints.
pub fn build_s3_operator(
    storage: &StorageConfig,
    creds: Option<&S3Credentials>,
) -> VeilResult<Operator> {
    if storage.bucket.is_empty() {
        return Err(VeilError::Config("storage.bucket is required for s3".into()));
    }
    if storage.endpoint.starts_with("http://") {
        if storage.enforce_tls {
            return Err(VeilError::Config(format!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                storage.endpoint
            )));
        }
        tracing::warn!(
            endpoint = %storage.endpoint,
            "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted"
        );
    }

    // opendal 0.55: S3 builder uses consuming pattern
    let mut builder = opendal::services::S3::default()
        .endpoint(&storage.endpoint)
        .region(&storage.region)
        .bucket(&storage.bucket)
        .root(&storage.root.to_string_lossy());
    if let Some(creds) = creds {
        builder = builder
            .access_key_id(&creds.access_key_id)
            .secret_access_key(creds.secret_access_key.expose_secret());
    }

    let op = Operator::new(builder)
        .map_err(|e| VeilError::Storage(format!("creating OpenDAL S3 operator: {e}")))?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}
