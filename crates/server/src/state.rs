use crate::config::ServerConfig;
use dashmap::DashMap;
use index::{HttpFetcher, IndexLifecycleManager};
use matcher::{ChemToolkit, QueryDispatcher, RemoteToolkit};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Rate limit tracking: API key -> (count, window_start)
    pub rate_limiter: Arc<DashMap<String, (u32, Instant)>>,

    /// Query dispatcher holding the one toolkit instance
    pub dispatcher: QueryDispatcher,

    /// Index lifecycle, also the dispatcher's snapshot gate
    pub lifecycle: Arc<IndexLifecycleManager>,

    /// Prometheus handle when the exporter is installed
    pub prometheus: Option<PrometheusHandle>,

    pub started_at: Instant,
}

impl ServerState {
    /// Assemble state from an already constructed toolkit and lifecycle.
    pub fn new(
        config: ServerConfig,
        toolkit: Arc<dyn ChemToolkit>,
        lifecycle: Arc<IndexLifecycleManager>,
    ) -> Self {
        let dispatcher = QueryDispatcher::new(toolkit, lifecycle.clone());
        Self {
            config: Arc::new(config),
            rate_limiter: Arc::new(DashMap::new()),
            dispatcher,
            lifecycle,
            prometheus: None,
            started_at: Instant::now(),
        }
    }

    /// Connect to the toolkit sidecar named in `config`.
    ///
    /// The same [`RemoteToolkit`] answers queries and maintains the index.
    pub fn from_config(config: ServerConfig) -> anyhow::Result<Self> {
        let toolkit = Arc::new(RemoteToolkit::with_timeout(
            config.toolkit_url.clone(),
            config.toolkit_timeout(),
        )?);
        let lifecycle = Arc::new(IndexLifecycleManager::with_fetcher(
            toolkit.clone(),
            Arc::new(HttpFetcher::default()),
            config.fetch_retry,
        ));
        Ok(Self::new(config, toolkit, lifecycle))
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Check if API key is valid
    pub fn is_valid_api_key(&self, key: &str) -> bool {
        self.config.api_keys.contains(key)
    }

    /// Check rate limit for API key
    pub fn check_rate_limit(&self, key: &str) -> bool {
        let now = Instant::now();
        let window = Duration::from_secs(60);
        let limit = self.config.rate_limit_per_minute;

        let mut entry = self.rate_limiter.entry(key.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        if now.duration_since(*window_start) > window {
            *count = 0;
            *window_start = now;
        }

        if *count >= limit {
            return false;
        }

        *count += 1;
        true
    }
}
