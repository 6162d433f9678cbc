//! S3-compatible object store.

use crate::error::{CloudError, CloudResult};
use crate::store::RemoteObjectStore;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Connection settings for an S3 (or S3-compatible) bucket.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, R2, ...).
    pub endpoint: Option<String>,
    /// Static credentials. When absent the default AWS provider chain is used.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Key prefix so several installations can share a bucket.
    pub prefix: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            prefix: None,
        }
    }
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "<redacted>"))
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// A [`RemoteObjectStore`] backed by an S3 bucket.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3ObjectStore {
    /// Builds a client from the config. Does not touch the network; call
    /// [`RemoteObjectStore::probe`] to verify access.
    pub async fn connect(config: &S3Config) -> CloudResult<Self> {
        if config.bucket.is_empty() {
            return Err(CloudError::Config("S3 bucket must be set".to_string()));
        }

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        match (&config.access_key_id, &config.secret_access_key) {
            (Some(id), Some(secret)) => {
                loader = loader.credentials_provider(Credentials::new(
                    id.clone(),
                    secret.clone(),
                    None,
                    None,
                    "boothsync-config",
                ));
            }
            (None, None) => {}
            _ => {
                return Err(CloudError::Config(
                    "access_key_id and secret_access_key must be set together".to_string(),
                ));
            }
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let prefix = config
            .prefix
            .as_deref()
            .map(|p| format!("{}/", p.trim_matches('/')))
            .filter(|p| p != "/")
            .unwrap_or_default();

        info!("S3 store configured for bucket {} ({})", config.bucket, config.region);
        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            prefix,
        })
    }

    fn object_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

/// Converts an SDK failure into the store's error taxonomy.
fn classify<E>(err: SdkError<E, HttpResponse>) -> CloudError
where
    E: ProvideErrorMetadata + fmt::Debug,
{
    match &err {
        SdkError::TimeoutError(_) => CloudError::Timeout,
        SdkError::DispatchFailure(failure) => {
            if failure.is_timeout() {
                CloudError::Timeout
            } else {
                CloudError::Network(format!("{failure:?}"))
            }
        }
        SdkError::ResponseError(_) => CloudError::Network(format!("{err:?}")),
        SdkError::ServiceError(service) => CloudError::from_status(
            service.raw().status().as_u16(),
            service.err().code().unwrap_or("Unknown"),
            service.err().message().unwrap_or_default(),
        ),
        _ => CloudError::S3(format!("{err:?}")),
    }
}

#[async_trait]
impl RemoteObjectStore for S3ObjectStore {
    fn provider_name(&self) -> &'static str {
        "s3"
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> CloudResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(classify)?;
        debug!("PUT s3://{}/{} ({} bytes)", self.bucket, key, bytes.len());
        Ok(())
    }

    async fn get(&self, key: &str) -> CloudResult<Option<Vec<u8>>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await;

        match result {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| CloudError::Network(format!("failed to read body of {key}: {e}")))?;
                Ok(Some(data.into_bytes().to_vec()))
            }
            Err(SdkError::ServiceError(service)) if service.err().is_no_such_key() => Ok(None),
            Err(err) => Err(classify(err)),
        }
    }

    async fn list(&self, prefix: &str) -> CloudResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(self.object_key(prefix))
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(classify)?;

            for object in output.contents() {
                if let Some(key) = object.key().and_then(|k| k.strip_prefix(&self.prefix)) {
                    keys.push(key.to_string());
                }
            }

            match output.next_continuation_token() {
                Some(token) if output.is_truncated() == Some(true) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> CloudResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(classify)?;
        debug!("DELETE s3://{}/{}", self.bucket, key);
        Ok(())
    }

    async fn probe(&self) -> CloudResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }
}
