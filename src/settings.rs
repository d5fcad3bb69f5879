use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use dotenv::dotenv;
use std::{env, fmt, str::FromStr, time::Duration};

use crate::{constants::DEFAULT_QUALITY, limiter::rate_limiter::Rate};

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    Development,
    Production,
    Testing,
}

impl FromStr for AppEnvironment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" => Ok(AppEnvironment::Development),
            "production" => Ok(AppEnvironment::Production),
            "testing" => Ok(AppEnvironment::Testing),
            _ => Err(ConfigError::Message(format!("Invalid environment: {}", s))),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// DRF-style `"<requests>/<period>"` rates for each throttle scope.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ThrottleRates {
    pub list_burst: String,
    pub list_sustained: String,
    pub detail_burst: String,
    pub detail_sustained: String,
    pub action_burst: String,
    pub action_sustained: String,
}

impl Default for ThrottleRates {
    fn default() -> Self {
        Self {
            list_burst: "60/minute".into(),
            list_sustained: "1000/day".into(),
            detail_burst: "120/minute".into(),
            detail_sustained: "2000/day".into(),
            action_burst: "20/minute".into(),
            action_sustained: "500/day".into(),
        }
    }
}

impl ThrottleRates {
    fn all(&self) -> [(&'static str, &str); 6] {
        [
            ("list_burst", &self.list_burst),
            ("list_sustained", &self.list_sustained),
            ("detail_burst", &self.detail_burst),
            ("detail_sustained", &self.detail_sustained),
            ("action_burst", &self.action_burst),
            ("action_sustained", &self.action_sustained),
        ]
    }
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    #[serde(default = "default_env")]
    pub env: AppEnvironment,

    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Postgres record store; the in-memory store is used when unset.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_media_root")]
    pub media_root: String,

    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: Vec<String>,

    #[serde(default)]
    pub trust_x_forwarded_for: bool,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_max_bytes")]
    pub max_download_bytes: usize,

    #[serde(default = "default_max_bytes")]
    pub max_upload_bytes: usize,

    #[serde(default = "default_quality")]
    pub heif_quality: u8,

    #[serde(default = "default_quality")]
    pub jpeg_quality: u8,

    #[serde(default)]
    pub throttle: ThrottleRates,
}

fn default_env() -> AppEnvironment {
    AppEnvironment::Development
}
fn default_name() -> String {
    "heifmgur".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_worker_count() -> usize {
    num_cpus::get()
}
fn default_media_root() -> String {
    "media".to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_fetch_timeout() -> u64 {
    10
}
fn default_max_bytes() -> usize {
    20 * 1024 * 1024
}
fn default_quality() -> u8 {
    DEFAULT_QUALITY
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        dotenv().ok();

        let raw_env = env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let env_name = AppEnvironment::from_str(&raw_env)
            .map_err(|_| ConfigError::Message(format!("Invalid APP_ENV value: {}", raw_env)))?;

        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env_name)).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors_allowed_origins")
                    .try_parsing(true)
                    .ignore_empty(true),
            );

        let mut config: Self = builder.build()?.try_deserialize()?;

        config.env = env_name;

        if config.database_url.is_none() {
            config.database_url = env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.media_root.trim().is_empty() {
            errors.push("MEDIA_ROOT cannot be empty".to_string());
        }
        if self.fetch_timeout_secs == 0 {
            errors.push("FETCH_TIMEOUT_SECS must be greater than zero".to_string());
        }
        if !(1..=100).contains(&self.heif_quality) {
            errors.push("HEIF_QUALITY must be between 1 and 100".to_string());
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            errors.push("JPEG_QUALITY must be between 1 and 100".to_string());
        }
        for (scope, rate) in self.throttle.all() {
            if let Err(e) = Rate::from_str(rate) {
                errors.push(format!("THROTTLE {scope}: {e}"));
            }
        }
        if self.is_production() && self.cors_origins().iter().any(|o| o == "*") {
            errors.push("Wildcard CORS (*) is not allowed in production".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Message(errors.join(", ")))
        }
    }

    pub fn is_production(&self) -> bool {
        self.env == AppEnvironment::Production
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .iter()
            .flat_map(|origin| origin.split(','))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppEnvironment::Development => "development",
            AppEnvironment::Production => "production",
            AppEnvironment::Testing => "testing",
        };
        write!(f, "{s}")
    }
}

trait Redact {
    fn redact(&self) -> &str;
}

impl Redact for Option<String> {
    fn redact(&self) -> &str {
        match self {
            None => "[MISSING]",
            Some(_) => "[REDACTED]",
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("name", &self.name)
            .field("port", &self.port)
            .field("host", &self.host)
            .field("worker_count", &self.worker_count)
            .field("database_url", &self.database_url.redact())
            .field("media_root", &self.media_root)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("trust_x_forwarded_for", &self.trust_x_forwarded_for)
            .field("log_format", &self.log_format)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("max_download_bytes", &self.max_download_bytes)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("heif_quality", &self.heif_quality)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("throttle", &self.throttle)
            .finish()
    }
}
