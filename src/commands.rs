//! Operations behind the `chem-search` subcommands.
//!
//! Each function takes an already assembled lifecycle manager so the binary
//! can drive the toolkit sidecar while tests drive an in-process maintainer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use index::{
    HttpFetcher, IndexBuildConfig, IndexLifecycleManager, LifecycleState, LifecycleStatus,
};
use matcher::RemoteToolkit;
use server::ServerConfig;

use crate::config::BootstrapProfile;

/// Inputs of `chem-search bootstrap`.
#[derive(Debug, Clone, Default)]
pub struct BootstrapOptions {
    pub cache_path: Option<PathBuf>,
    pub cc_prefix: Option<String>,
    pub profile: Option<PathBuf>,
}

/// Build the index configuration and persist it under the cache root.
pub fn bootstrap(
    server: &ServerConfig,
    options: &BootstrapOptions,
) -> anyhow::Result<(IndexBuildConfig, PathBuf)> {
    let profile = match &options.profile {
        Some(path) => BootstrapProfile::from_file(path)
            .with_context(|| format!("loading bootstrap profile {}", path.display()))?,
        None => BootstrapProfile::default(),
    };
    let builder = profile.builder(
        options.cache_path.clone(),
        options.cc_prefix.clone(),
        &server.cache_path,
        &server.cc_prefix,
    );
    let (config, path) = builder.build_and_persist()?;
    tracing::info!(
        path = %path.display(),
        prefix = %config.file_name_prefix(),
        num_proc = config.chem_comp.num_proc,
        "index configuration written"
    );
    Ok((config, path))
}

/// Lifecycle manager driving the toolkit sidecar named in `server`.
pub fn remote_lifecycle(server: &ServerConfig) -> anyhow::Result<Arc<IndexLifecycleManager>> {
    let toolkit = RemoteToolkit::with_timeout(server.toolkit_url.clone(), server.toolkit_timeout())?;
    Ok(Arc::new(IndexLifecycleManager::with_fetcher(
        Arc::new(toolkit),
        Arc::new(HttpFetcher::default()),
        server.fetch_retry,
    )))
}

/// Result of `chem-search rebuild`.
#[derive(Debug, Clone)]
pub struct RebuildSummary {
    pub state: LifecycleState,
    pub elapsed: Duration,
    pub status: LifecycleStatus,
}

/// Configure from the persisted file at `config_path` and run every stage.
pub async fn rebuild(
    lifecycle: &IndexLifecycleManager,
    config_path: &Path,
) -> anyhow::Result<RebuildSummary> {
    lifecycle
        .configure_from_path(config_path)
        .with_context(|| format!("reading index configuration {}", config_path.display()))?;

    let started = Instant::now();
    let state = lifecycle.rebuild().await?;
    let elapsed = started.elapsed();
    tracing::info!(state = ?state, elapsed_ms = elapsed.as_millis() as u64, "rebuild finished");

    Ok(RebuildSummary {
        state,
        elapsed,
        status: lifecycle.status(),
    })
}

/// Load the committed index for `config_path` and check that it answers.
///
/// Only the reload stage runs; a missing or partial index is reported as
/// unverified, not rebuilt.
pub async fn verify(lifecycle: &IndexLifecycleManager, config_path: &Path) -> anyhow::Result<bool> {
    lifecycle
        .configure_from_path(config_path)
        .with_context(|| format!("reading index configuration {}", config_path.display()))?;

    match lifecycle.load_existing().await {
        Ok(LifecycleState::Ready) => Ok(lifecycle.verify().await),
        Ok(state) => {
            tracing::warn!(state = ?state, "committed index did not load");
            Ok(false)
        }
        Err(err) => {
            tracing::warn!(error = %err, "no committed index to verify");
            Ok(false)
        }
    }
}
