// crates/server/src/config.rs
//! Server configuration: every flag can also be set through the environment.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use thiserror::Error;

use crate::jobs::LatencyPolicy;
use crate::oracle::S3Settings;

pub const MIN_REQUEST_TIMEOUT_MS: u64 = 1_000;
pub const MAX_REQUEST_TIMEOUT_MS: u64 = 3_600_000;
pub const MIN_RATE_LIMIT_WINDOW_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AppEnv {
    Development,
    Production,
    Test,
}

impl AppEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppEnv::Development => "development",
            AppEnv::Production => "production",
            AppEnv::Test => "test",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DOWNLOAD_DELAY_MIN_MS ({min}) must not exceed DOWNLOAD_DELAY_MAX_MS ({max})")]
    DelayRange { min: u64, max: u64 },

    #[error(
        "REQUEST_TIMEOUT_MS must be between {min} and {max}, got {0}",
        min = MIN_REQUEST_TIMEOUT_MS,
        max = MAX_REQUEST_TIMEOUT_MS
    )]
    RequestTimeout(u64),

    #[error("invalid CORS origin: {0}")]
    CorsOrigin(String),

    #[error("S3_ENDPOINT must be an http(s) URL, got {0:?}")]
    StorageEndpoint(String),

    #[error("S3_ACCESS_KEY_ID and S3_SECRET_ACCESS_KEY must be set together")]
    PartialCredentials,

    #[error("RATE_LIMIT_WINDOW_MS must be at least {min}, got {0}", min = MIN_RATE_LIMIT_WINDOW_MS)]
    RateLimitWindow(u64),

    #[error("RATE_LIMIT_MAX_REQUESTS must be at least 1")]
    RateLimitMaxRequests,
}

/// delineate: long-running download emulation API
#[derive(Parser, Debug, Clone)]
#[command(name = "delineate-server")]
#[command(version, about, long_about = None)]
pub struct ServerConfig {
    #[arg(env = "PORT", long, default_value_t = 3000)]
    pub port: u16,

    #[arg(env = "HOST", long, default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(env = "APP_ENV", long, value_enum, default_value_t = AppEnv::Development)]
    pub app_env: AppEnv,

    #[arg(env = "DOWNLOAD_DELAY_MIN_MS", long, default_value_t = 10_000)]
    pub download_delay_min_ms: u64,

    #[arg(env = "DOWNLOAD_DELAY_MAX_MS", long, default_value_t = 200_000)]
    pub download_delay_max_ms: u64,

    #[arg(env = "DOWNLOAD_DELAY_ENABLED", long, action = ArgAction::Set, default_value_t = true)]
    pub download_delay_enabled: bool,

    /// Empty selects the in-process mock oracle.
    #[arg(env = "S3_BUCKET_NAME", long, default_value = "")]
    pub s3_bucket_name: String,

    /// Unset uses the regional AWS endpoint.
    #[arg(env = "S3_ENDPOINT", long)]
    pub s3_endpoint: Option<String>,

    #[arg(env = "S3_REGION", long, default_value = "us-east-1")]
    pub s3_region: String,

    #[arg(env = "S3_ACCESS_KEY_ID", long)]
    pub s3_access_key_id: Option<String>,

    #[arg(env = "S3_SECRET_ACCESS_KEY", long, hide_env_values = true)]
    pub s3_secret_access_key: Option<String>,

    #[arg(env = "S3_FORCE_PATH_STYLE", long, action = ArgAction::Set, default_value_t = false)]
    pub s3_force_path_style: bool,

    #[arg(env = "DOWNLOAD_BASE_URL", long, default_value = "https://storage.example.com")]
    pub download_base_url: String,

    #[arg(env = "REQUEST_TIMEOUT_MS", long, default_value_t = 30_000)]
    pub request_timeout_ms: u64,

    /// `*` or a comma-separated list of origins.
    #[arg(env = "CORS_ORIGINS", long, default_value = "*")]
    pub cors_origins: String,

    #[arg(env = "RATE_LIMIT_WINDOW_MS", long, default_value_t = 60_000)]
    pub rate_limit_window_ms: u64,

    /// Requests allowed per client and window.
    #[arg(env = "RATE_LIMIT_MAX_REQUESTS", long, default_value_t = 100)]
    pub rate_limit_max_requests: u32,

    #[arg(env = "SENTRY_DSN", long)]
    pub sentry_dsn: Option<String>,

    #[arg(env = "OTEL_EXPORTER_OTLP_ENDPOINT", long)]
    pub otlp_endpoint: Option<String>,

    #[arg(env = "LOG_FORMAT", long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: IpAddr::from([0, 0, 0, 0]),
            app_env: AppEnv::Development,
            download_delay_min_ms: 10_000,
            download_delay_max_ms: 200_000,
            download_delay_enabled: true,
            s3_bucket_name: String::new(),
            s3_endpoint: None,
            s3_region: "us-east-1".to_string(),
            s3_access_key_id: None,
            s3_secret_access_key: None,
            s3_force_path_style: false,
            download_base_url: "https://storage.example.com".to_string(),
            request_timeout_ms: 30_000,
            cors_origins: "*".to_string(),
            rate_limit_window_ms: 60_000,
            rate_limit_max_requests: 100,
            sentry_dsn: None,
            otlp_endpoint: None,
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.download_delay_min_ms > self.download_delay_max_ms {
            return Err(ConfigError::DelayRange {
                min: self.download_delay_min_ms,
                max: self.download_delay_max_ms,
            });
        }
        if !(MIN_REQUEST_TIMEOUT_MS..=MAX_REQUEST_TIMEOUT_MS).contains(&self.request_timeout_ms) {
            return Err(ConfigError::RequestTimeout(self.request_timeout_ms));
        }
        self.cors_allow_list()?;
        if let Some(endpoint) = &self.s3_endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::StorageEndpoint(endpoint.clone()));
            }
        }
        if self.s3_access_key_id.is_some() != self.s3_secret_access_key.is_some() {
            return Err(ConfigError::PartialCredentials);
        }
        if self.rate_limit_window_ms < MIN_RATE_LIMIT_WINDOW_MS {
            return Err(ConfigError::RateLimitWindow(self.rate_limit_window_ms));
        }
        if self.rate_limit_max_requests == 0 {
            return Err(ConfigError::RateLimitMaxRequests);
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn latency_policy(&self) -> LatencyPolicy {
        LatencyPolicy::new(
            Duration::from_millis(self.download_delay_min_ms),
            Duration::from_millis(self.download_delay_max_ms),
            self.download_delay_enabled,
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn is_production(&self) -> bool {
        self.app_env == AppEnv::Production
    }

    pub fn uses_object_store(&self) -> bool {
        !self.s3_bucket_name.trim().is_empty()
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            bucket: self.s3_bucket_name.trim().to_string(),
            region: self.s3_region.clone(),
            endpoint: self.s3_endpoint.clone().filter(|e| !e.trim().is_empty()),
            access_key_id: self.s3_access_key_id.clone(),
            secret_access_key: self.s3_secret_access_key.clone(),
            force_path_style: self.s3_force_path_style,
        }
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    /// `None` means any origin.
    pub fn cors_allow_list(&self) -> Result<Option<Vec<http::HeaderValue>>, ConfigError> {
        let raw = self.cors_origins.trim();
        if raw.is_empty() || raw == "*" {
            return Ok(None);
        }
        raw.split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(|origin| {
                http::HeaderValue::from_str(origin)
                    .map_err(|_| ConfigError::CorsOrigin(origin.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}
