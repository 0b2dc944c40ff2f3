// crates/server/src/oracle.rs
//! Availability oracle: does an object exist for a file id, and how big is it?
//!
//! Two implementations:
//! - `MockOracle` when no bucket is configured (ids divisible by 7 exist)
//! - `S3Oracle` issuing `HeadObject` against S3 or an S3-compatible store

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::Client;
use rand::Rng;
use thiserror::Error;
use tracing::instrument;

use delineate_types::FileId;

const HEALTH_CHECK_KEY: &str = "__health_check_marker__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available { key: String, size: u64 },
    Missing,
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available { .. })
    }
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("storage request for {key} failed: {message}")]
    Storage { key: String, message: String },

    #[error("storage answered HEAD {key} with status {status}")]
    UnexpectedStatus { key: String, status: u16 },
}

#[async_trait]
pub trait AvailabilityOracle: Send + Sync {
    async fn check(&self, file_id: FileId) -> Result<Availability, OracleError>;

    /// Storage reachability check for `/health`.
    async fn health(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Deterministic existence, random size.
#[derive(Debug, Clone, Default)]
pub struct MockOracle;

impl MockOracle {
    pub const DIVISOR: u64 = 7;
    pub const MIN_SIZE: u64 = 1_000;
    pub const MAX_SIZE: u64 = 10_001_000;

    pub fn exists(file_id: FileId) -> bool {
        file_id.get() % Self::DIVISOR == 0
    }
}

#[async_trait]
impl AvailabilityOracle for MockOracle {
    async fn check(&self, file_id: FileId) -> Result<Availability, OracleError> {
        if !Self::exists(file_id) {
            return Ok(Availability::Missing);
        }
        let size = rand::thread_rng().gen_range(Self::MIN_SIZE..Self::MAX_SIZE);
        Ok(Availability::Available {
            key: file_id.object_key(),
            size,
        })
    }

    async fn health(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Where and how to reach the bucket.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// `None` uses the regional AWS endpoint.
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// `endpoint/bucket/key` instead of `bucket.endpoint/key`. MinIO needs this.
    pub force_path_style: bool,
}

#[derive(Debug, Clone)]
pub struct S3Oracle {
    client: Client,
    bucket: String,
}

impl S3Oracle {
    /// Build a client from settings. Without an explicit key pair the ambient
    /// AWS credential chain is used.
    pub async fn new(settings: &S3Settings) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(settings.region.clone()));
        if let (Some(key_id), Some(secret)) = (&settings.access_key_id, &settings.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key_id.clone(),
                secret.clone(),
                None,
                None,
                "delineate-config",
            ));
        }
        let sdk_config = loader.load().await;

        let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.force_path_style);
        if let Some(endpoint) = &settings.endpoint {
            s3_config = s3_config.endpoint_url(endpoint.trim_end_matches('/'));
        }
        Self::from_conf(s3_config.build(), &settings.bucket)
    }

    pub fn from_conf(config: aws_sdk_s3::Config, bucket: &str) -> Self {
        Self {
            client: Client::from_conf(config),
            bucket: bucket.trim_matches('/').to_string(),
        }
    }

    /// Object size, or `None` when the key does not exist.
    async fn head(&self, key: &str) -> Result<Option<u64>, OracleError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(
                output
                    .content_length()
                    .and_then(|len| u64::try_from(len).ok())
                    .unwrap_or(0),
            )),
            Err(err) => map_head_error(key, err),
        }
    }
}

fn map_head_error(key: &str, err: SdkError<HeadObjectError>) -> Result<Option<u64>, OracleError> {
    if let SdkError::ServiceError(ref service_err) = err {
        let status = service_err.raw().status().as_u16();
        if service_err.err().is_not_found() || status == 404 {
            return Ok(None);
        }
        return Err(OracleError::UnexpectedStatus {
            key: key.to_string(),
            status,
        });
    }
    Err(OracleError::Storage {
        key: key.to_string(),
        message: DisplayErrorContext(&err).to_string(),
    })
}

#[async_trait]
impl AvailabilityOracle for S3Oracle {
    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn check(&self, file_id: FileId) -> Result<Availability, OracleError> {
        let key = file_id.object_key();
        Ok(match self.head(&key).await? {
            Some(size) => Availability::Available { key, size },
            None => Availability::Missing,
        })
    }

    async fn health(&self) -> bool {
        // A missing marker still proves the bucket answers.
        match self.head(HEALTH_CHECK_KEY).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, bucket = %self.bucket, "Storage health check failed");
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::retry::RetryConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn file_id(v: i64) -> FileId {
        FileId::try_from(v).unwrap()
    }

    /// Path-style client with static keys and no retries.
    fn oracle(endpoint: &str) -> S3Oracle {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("test-key", "test-secret", None, None, "test"))
            .endpoint_url(endpoint)
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .build();
        S3Oracle::from_conf(config, "downloads")
    }

    #[tokio::test]
    async fn test_mock_oracle_divisible_by_seven() {
        let oracle = MockOracle;
        match oracle.check(file_id(70007)).await.unwrap() {
            Availability::Available { key, size } => {
                assert_eq!(key, "70007.zip");
                assert!((MockOracle::MIN_SIZE..MockOracle::MAX_SIZE).contains(&size));
            }
            Availability::Missing => panic!("70007 should exist"),
        }
        assert_eq!(oracle.check(file_id(70001)).await.unwrap(), Availability::Missing);
        assert!(oracle.health().await);
    }

    #[tokio::test]
    async fn test_s3_oracle_reads_content_length() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/downloads/70007.zip"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-length", "4096"))
            .mount(&server)
            .await;

        let settings = S3Settings {
            bucket: "downloads".to_string(),
            region: "us-east-1".to_string(),
            endpoint: Some(format!("{}/", server.uri())),
            access_key_id: Some("test-key".to_string()),
            secret_access_key: Some("test-secret".to_string()),
            force_path_style: true,
        };
        let oracle = S3Oracle::new(&settings).await;
        assert_eq!(
            oracle.check(file_id(70007)).await.unwrap(),
            Availability::Available {
                key: "70007.zip".to_string(),
                size: 4096
            }
        );

        let requests = server.received_requests().await.unwrap();
        let auth = requests[0].headers.get("authorization").unwrap().to_str().unwrap();
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=test-key/"));
    }

    #[tokio::test]
    async fn test_s3_oracle_not_found_and_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/downloads/70001.zip"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/downloads/70002.zip"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let oracle = oracle(&server.uri());
        assert_eq!(oracle.check(file_id(70001)).await.unwrap(), Availability::Missing);
        assert!(matches!(
            oracle.check(file_id(70002)).await,
            Err(OracleError::UnexpectedStatus { status: 403, .. })
        ));
    }

    #[tokio::test]
    async fn test_s3_oracle_health() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/downloads/__health_check_marker__"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        assert!(oracle(&server.uri()).health().await);

        let unreachable = oracle("http://127.0.0.1:1");
        assert!(!unreachable.health().await);
        assert!(matches!(
            unreachable.check(file_id(70007)).await,
            Err(OracleError::Storage { .. })
        ));
    }

    #[tokio::test]
    async fn test_s3_oracle_denied_health() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/downloads/__health_check_marker__"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        assert!(!oracle(&server.uri()).health().await);
    }
}
