//! Settings loaded from the process environment

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::deploy::executor::ExecutorKind;
use crate::errors::ProvisionerError;
use crate::logs::LogLevel;

/// Provisioner settings
#[derive(Debug)]
pub struct Settings {
    /// Canvas API base URL
    pub api_url: String,

    /// Token sent as `x-canvas-token`
    pub canvas_token: SecretString,

    /// Cloud project hosting the subscription
    pub project_id: String,

    /// Push subscription feeding this service
    pub subscription_id: String,

    /// Bucket holding remote state
    pub bucket_name: String,

    /// Root of the module templates
    pub modules_path: PathBuf,

    /// Root of per-package working directories
    pub deployments_dir: PathBuf,

    /// Provisioning backend
    pub executor: ExecutorKind,

    /// Backend binary, when not the backend's default
    pub executor_binary: Option<String>,

    /// Helm namespace, when not the kube context's default
    pub helm_namespace: Option<String>,

    /// Limit on each backend sub-process
    pub command_timeout: Duration,

    /// Limit on each status API call
    pub report_timeout: Duration,

    /// Attempts per status report
    pub report_max_attempts: u32,

    pub host: String,
    pub port: u16,

    /// Grace period for in-flight work on shutdown
    pub shutdown_timeout: Duration,

    pub log_level: LogLevel,
    pub log_json: bool,
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, ProvisionerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ProvisionerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let api_url = get_or("API_URL", "https://canvas-api.dev.r7ai.net");
        Url::parse(&api_url)
            .map_err(|e| ProvisionerError::ConfigError(format!("API_URL {:?}: {}", api_url, e)))?;

        let executor = parse_or(get("EXECUTOR"), "EXECUTOR", ExecutorKind::Terraform)?;
        let log_level = match get("LOG_LEVEL") {
            Some(level) => level.parse().map_err(ProvisionerError::ConfigError)?,
            None => LogLevel::Info,
        };

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            canvas_token: SecretString::from(get_or("CANVAS_TOKEN", "foobar")),
            project_id: get_or("GOOGLE_CLOUD_PROJECT", "rad-dev-dev"),
            subscription_id: get_or("PUBSUB_SUBSCRIPTION_ID", "provisioner"),
            bucket_name: get_or("BUCKET_NAME", "rad-provisioner-state-1234"),
            modules_path: PathBuf::from(get_or("TERRAFORM_MODULES_PATH", "/mnt/canvas-packages")),
            deployments_dir: PathBuf::from(get_or("DEPLOYMENTS_DIR", "deployments")),
            executor,
            executor_binary: get("EXECUTOR_BINARY"),
            helm_namespace: get("HELM_NAMESPACE"),
            command_timeout: Duration::from_secs(parse_or(
                get("COMMAND_TIMEOUT_SECS"),
                "COMMAND_TIMEOUT_SECS",
                3600,
            )?),
            report_timeout: Duration::from_secs(parse_or(
                get("REPORT_TIMEOUT_SECS"),
                "REPORT_TIMEOUT_SECS",
                30,
            )?),
            report_max_attempts: parse_or(get("REPORT_MAX_ATTEMPTS"), "REPORT_MAX_ATTEMPTS", 3)?
                .max(1),
            host: get_or("HOST", "0.0.0.0"),
            port: parse_or(get("PORT"), "PORT", 8080)?,
            shutdown_timeout: Duration::from_secs(parse_or(
                get("SHUTDOWN_TIMEOUT_SECS"),
                "SHUTDOWN_TIMEOUT_SECS",
                30,
            )?),
            log_level,
            log_json: get("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            log_dir: get("LOG_DIR").map(PathBuf::from),
        })
    }

    /// Fully qualified subscription name
    pub fn subscription_path(&self) -> String {
        format!(
            "projects/{}/subscriptions/{}",
            self.project_id, self.subscription_id
        )
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T, ProvisionerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|e| ProvisionerError::ConfigError(format!("{} {:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}
