//! Server initialization and routing
//!
//! This module handles the Axum server setup including:
//! - Router configuration with all API endpoints
//! - Index bootstrap according to the configured startup mode
//! - Graceful shutdown handling

use crate::config::{ServerConfig, StartupMode};
use crate::metrics::{install_prometheus, PrometheusMatchMetrics};
use crate::middleware::{api_key_auth, log_requests, request_id};
use crate::routes::not_found;
use crate::routes::{admin, convert, depict, descriptor, formula, health};
use crate::state::ServerState;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use index::LifecycleState;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the Axum router with all routes and middleware
///
/// Status, search, depiction and conversion routes are public; the
/// `/admin/*` routes require an API key.
pub fn build_router(state: Arc<ServerState>) -> Router {
    let cors = if state.config.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let status_routes = Router::new()
        .route("/", get(health::root_status))
        .route("/status", get(health::server_status))
        .route("/healthcheck", get(health::health_check))
        .route("/hc", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics));

    let match_routes = Router::new()
        .route(
            "/chem-match-v1/formula",
            get(formula::formula_get).post(formula::formula_post),
        )
        .route(
            "/chem-match-v1/formula/range",
            get(formula::range_get).post(formula::range_post),
        )
        .route(
            "/chem-match-v1/{descriptor_type}",
            get(descriptor::match_get).post(descriptor::match_post),
        );

    let depict_routes = Router::new()
        .route(
            "/chem-depict-v1/molecule/{identifier_type}",
            get(depict::molecule_get).post(depict::molecule_post),
        )
        .route("/chem-depict-v1/alignpair", get(depict::align_pair_get))
        .route(
            "/chem-convert-v1/to-molfile/{identifier_type}",
            get(convert::to_molfile_get).post(convert::to_molfile_post),
        );

    let admin_routes = Router::new()
        .route("/admin/index", get(admin::index_status))
        .route("/admin/rebuild", post(admin::rebuild))
        .route("/admin/restore", post(admin::restore))
        .route("/admin/verify", post(admin::verify))
        .layer(from_fn_with_state(state.clone(), api_key_auth));

    Router::new()
        .merge(status_routes)
        .merge(match_routes)
        .merge(depict_routes)
        .merge(admin_routes)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.config.max_body_size()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.timeout(),
        ))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(from_fn(log_requests))
        .layer(from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bring the index to a servable state according to `startup`.
///
/// Loading an existing snapshot is awaited; rebuilds and restores run in the
/// background so the status routes answer while they are in progress. No
/// failure here stops the server: queries answer 503 until an index is served.
pub async fn bootstrap_index(state: &ServerState) {
    let config = &state.config;
    if config.startup == StartupMode::None {
        tracing::info!("startup mode 'none', index left unconfigured");
        return;
    }

    let path = config.index_config_path();
    if let Err(err) = state.lifecycle.configure_from_path(&path) {
        tracing::warn!(
            path = %path.display(),
            error = %err,
            "no usable index configuration, run `chem-search bootstrap` first"
        );
        return;
    }

    let lifecycle = state.lifecycle.clone();
    match config.startup {
        StartupMode::None => {}
        StartupMode::Load => match lifecycle.load_existing().await {
            Ok(LifecycleState::Ready) => {}
            Ok(other) => {
                tracing::warn!(state = ?other, "existing index did not load, rebuilding");
                spawn_rebuild(lifecycle);
            }
            Err(err) => {
                tracing::info!(error = %err, "no existing index snapshot, rebuilding");
                spawn_rebuild(lifecycle);
            }
        },
        StartupMode::Rebuild => spawn_rebuild(lifecycle),
        StartupMode::Restore => {
            let Some(bundle) = config.bundle.clone() else {
                tracing::warn!("startup mode 'restore' without a bundle");
                return;
            };
            tokio::spawn(async move {
                match lifecycle.restore_from_bundle(&bundle).await {
                    Ok(state) => tracing::info!(state = ?state, "startup restore finished"),
                    Err(err) => tracing::error!(error = %err, "startup restore not run"),
                }
            });
        }
    }
}

fn spawn_rebuild(lifecycle: Arc<index::IndexLifecycleManager>) {
    tokio::spawn(async move {
        match lifecycle.rebuild().await {
            Ok(state) => tracing::info!(state = ?state, "startup rebuild finished"),
            Err(err) => tracing::error!(error = %err, "startup rebuild not run"),
        }
    });
}

/// Install the JSON tracing subscriber. Later calls are no-ops.
pub fn init_tracing(log_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json()
        .try_init();
}

/// Start the chem-search HTTP server
///
/// Installs logging and metrics, connects to the toolkit sidecar, brings up
/// the index per the startup mode and serves until SIGTERM or Ctrl+C.
///
/// # Example
///
/// ```rust,no_run
/// use server::ServerConfig;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ServerConfig::load()?;
///     server::start_server(config).await?;
///     Ok(())
/// }
/// ```
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    init_tracing(&config.log_level);

    let mut state = ServerState::from_config(config.clone())?;
    if config.metrics_enabled {
        match install_prometheus() {
            Ok(handle) => {
                matcher::set_match_metrics(Some(Arc::new(PrometheusMatchMetrics)));
                state = state.with_prometheus(handle);
            }
            Err(err) => tracing::warn!(error = %err, "Prometheus exporter not installed"),
        }
    }
    let state = Arc::new(state);

    bootstrap_index(&state).await;

    let app = build_router(state.clone());
    let addr: SocketAddr = config.socket_addr()?;

    tracing::info!(
        %addr,
        toolkit = %config.toolkit_url,
        prefix = %config.cc_prefix,
        cache = %config.cache_path.display(),
        startup = ?config.startup,
        "Starting chem-search server"
    );
    tracing::info!(
        timeout_secs = config.timeout_secs,
        max_body_mb = config.max_body_size_mb,
        admin_keys = config.api_keys.len(),
        cors = config.enable_cors,
        metrics = config.metrics_enabled,
        "Server limits"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
