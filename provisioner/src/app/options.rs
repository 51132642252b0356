//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;

use crate::deploy::command::CliBinary;
use crate::deploy::executor::ExecutorOptions;
use crate::http::status::ReporterOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::outcomes;

/// Main application options
#[derive(Debug)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Canvas API access
    pub api: ApiOptions,

    /// Where run directories live
    pub storage: StorageLayout,

    /// Subscription pushes are expected from
    pub subscription_path: String,

    /// Backend selection and limits
    pub executor: ExecutorOptions,

    /// Status report retries
    pub reporter: ReporterOptions,

    /// Outcome worker options
    pub outcome_worker: outcomes::Options,
}

impl AppOptions {
    pub fn from_settings(settings: Settings) -> Self {
        let subscription_path = settings.subscription_path();
        Self {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: settings.shutdown_timeout,
            },
            server: ServerOptions {
                host: settings.host,
                port: settings.port,
            },
            api: ApiOptions {
                base_url: settings.api_url,
                token: settings.canvas_token,
                timeout: settings.report_timeout,
            },
            storage: StorageLayout::new(settings.deployments_dir),
            subscription_path,
            executor: ExecutorOptions {
                kind: settings.executor,
                binary: settings.executor_binary.as_deref().and_then(parse_binary),
                module_root: settings.modules_path,
                state_bucket: settings.bucket_name,
                namespace: settings.helm_namespace,
                command_timeout: settings.command_timeout,
            },
            reporter: ReporterOptions {
                max_attempts: settings.report_max_attempts,
                ..Default::default()
            },
            outcome_worker: outcomes::Options::default(),
        }
    }
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            server: ServerOptions::default(),
            api: ApiOptions::default(),
            storage: StorageLayout::default(),
            subscription_path: "projects/rad-dev-dev/subscriptions/provisioner".to_string(),
            executor: ExecutorOptions::default(),
            reporter: ReporterOptions::default(),
            outcome_worker: outcomes::Options::default(),
        }
    }
}

/// `"sh ./fake-terraform.sh"` runs the program with leading arguments
fn parse_binary(raw: &str) -> Option<CliBinary> {
    let mut parts = raw.split_whitespace();
    let program = parts.next()?;
    Some(CliBinary::new(program).with_leading_args(parts))
}

/// Lifecycle options for the provisioner
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Canvas API options
#[derive(Debug)]
pub struct ApiOptions {
    pub base_url: String,
    pub token: SecretString,

    /// Bound on each API call
    pub timeout: Duration,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            base_url: "https://canvas-api.dev.r7ai.net".to_string(),
            token: SecretString::from("foobar"),
            timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}
