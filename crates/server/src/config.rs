use index::{config_path, DependencyBundle, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// What the server does with the search index before accepting traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupMode {
    /// Leave the index alone; an operator triggers a rebuild.
    None,
    /// Serve a previously built index, rebuilding when none is usable.
    #[default]
    Load,
    /// Always rebuild in the background.
    Rebuild,
    /// Restore the configured dependency bundle in the background.
    Restore,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum request body size in MB
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Rate limit for admin routes: requests per minute per API key
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,

    /// API keys accepted by the admin routes. Empty disables them.
    #[serde(default)]
    pub api_keys: HashSet<String>,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Metrics endpoint enabled
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Root of the index cache (`config/`, `staging/`, `index/`)
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    /// Component file-name prefix of the index to serve
    #[serde(default = "default_cc_prefix")]
    pub cc_prefix: String,

    /// Base URL of the chemistry toolkit sidecar
    #[serde(default = "default_toolkit_url")]
    pub toolkit_url: String,

    /// Per-request timeout for toolkit calls in seconds
    #[serde(default = "default_toolkit_timeout_secs")]
    pub toolkit_timeout_secs: u64,

    /// Retry policy for remote source downloads
    #[serde(default)]
    pub fetch_retry: RetryPolicy,

    /// Prebuilt dependency bundle used by `restore`
    #[serde(default)]
    pub bundle: Option<DependencyBundle>,

    #[serde(default)]
    pub startup: StartupMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_size_mb(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            api_keys: HashSet::new(),
            enable_cors: default_true(),
            log_level: default_log_level(),
            metrics_enabled: default_true(),
            cache_path: default_cache_path(),
            cc_prefix: default_cc_prefix(),
            toolkit_url: default_toolkit_url(),
            toolkit_timeout_secs: default_toolkit_timeout_secs(),
            fetch_retry: RetryPolicy::default(),
            bundle: None,
            startup: StartupMode::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `.env`, an optional `chem-search` config file
    /// and `CHEM_SEARCH_*` environment variables, in increasing precedence.
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }

        let builder = config::Config::builder()
            .add_source(config::File::with_name("chem-search").required(false))
            .add_source(
                config::Environment::with_prefix("CHEM_SEARCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("api_keys"),
            );

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        if config.api_keys.is_empty() {
            tracing::warn!("No admin API keys configured, admin routes will reject every request");
        }

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cc_prefix.trim().is_empty() {
            anyhow::bail!("cc_prefix must not be empty");
        }
        if !(self.toolkit_url.starts_with("http://") || self.toolkit_url.starts_with("https://")) {
            anyhow::bail!("toolkit_url must be an http(s) URL, got '{}'", self.toolkit_url);
        }
        if self.startup == StartupMode::Restore && self.bundle.is_none() {
            anyhow::bail!("startup mode 'restore' requires a bundle (host, path, channel)");
        }
        Ok(())
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn toolkit_timeout(&self) -> Duration {
        Duration::from_secs(self.toolkit_timeout_secs)
    }

    /// Get max body size in bytes
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }

    /// Persisted index build configuration for the served prefix.
    pub fn index_config_path(&self) -> PathBuf {
        config_path(&self.cache_path, &self.cc_prefix)
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_body_size_mb() -> usize {
    10
}

fn default_rate_limit_per_minute() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("./CACHE")
}

fn default_cc_prefix() -> String {
    "cc-full".to_string()
}

fn default_toolkit_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_toolkit_timeout_secs() -> u64 {
    120
}
