//! Staged rebuild of the search indices and the serving gate built on it.

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::IndexBuildConfig;
use crate::fetch::{resolve_sources, HttpFetcher, RetryPolicy, SourceFetcher};
use crate::maintainer::{IndexMaintainer, RebuildStage, StageContext, StageOutcome};
use crate::snapshot::{SnapshotGate, SnapshotInfo, StageReport};
use crate::stage_dirs::StageDirs;
use crate::IndexError;


/// Lifecycle of the search-index dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Unconfigured,
    Configured,
    Building,
    Ready,
    Failed,
}

/// Last recorded rebuild, restore or load failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageFailure {
    /// `rebuild`, `load` or `restore`.
    pub operation: String,
    pub stage: Option<RebuildStage>,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Point-in-time view of the manager for status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleStatus {
    pub state: LifecycleState,
    pub file_name_prefix: Option<String>,
    pub serving: Option<SnapshotInfo>,
    pub last_failure: Option<StageFailure>,
}

/// Location of a prebuilt dependency bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyBundle {
    pub host: String,
    pub path: String,
    /// Release channel, e.g. `stable` or `dev`.
    pub channel: String,
}

impl DependencyBundle {
    pub fn url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        let path = self.path.trim_matches('/');
        let channel = self.channel.trim_matches('/');
        if path.is_empty() {
            format!("{host}/{channel}")
        } else {
            format!("{host}/{path}/{channel}")
        }
    }
}

/// Operations that need the single in-flight slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexOperation {
    Rebuild,
    Load,
    Restore,
}

impl IndexOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rebuild => "rebuild",
            Self::Load => "load",
            Self::Restore => "restore",
        }
    }
}

impl std::fmt::Display for IndexOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct Inner {
    state: LifecycleState,
    config: Option<Arc<IndexBuildConfig>>,
    serving: Option<SnapshotInfo>,
    last_failure: Option<StageFailure>,
}

#[derive(Debug)]
struct Shared {
    inner: RwLock<Inner>,
    in_flight: AtomicBool,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }
}

/// Runs the ordered rebuild against an [`IndexMaintainer`] and tracks which
/// snapshot may be served.
///
/// At most one rebuild, load or restore runs at a time per cache root and
/// prefix, across processes; a concurrent call fails with
/// [`IndexError::Busy`]. Until a new build completes the previous snapshot
/// keeps serving.
pub struct IndexLifecycleManager {
    maintainer: Arc<dyn IndexMaintainer>,
    fetcher: Arc<dyn SourceFetcher>,
    retry: RetryPolicy,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for IndexLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexLifecycleManager")
            .field("state", &self.state())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Claim on the in-flight slot for one operation, taken with
/// [`IndexLifecycleManager::try_begin`].
///
/// Holds the in-process flag and an exclusive lock on
/// `<cache>/staging/<prefix>/.lock`. Dropping it mid-build (panic or
/// cancelled future) leaves the manager in `Failed`, not `Building`.
#[derive(Debug)]
pub struct OperationPermit {
    shared: Arc<Shared>,
    operation: IndexOperation,
    config: Arc<IndexBuildConfig>,
    lock: Option<File>,
}

impl OperationPermit {
    pub fn operation(&self) -> IndexOperation {
        self.operation
    }
}

impl Drop for OperationPermit {
    fn drop(&mut self) {
        let mut inner = self.shared.write();
        if inner.state == LifecycleState::Building {
            tracing::error!(operation = %self.operation, "index operation interrupted");
            inner.state = LifecycleState::Failed;
            inner.last_failure = Some(StageFailure {
                operation: self.operation.to_string(),
                stage: None,
                reason: "interrupted".to_string(),
                failed_at: Utc::now(),
            });
        }
        drop(inner);
        drop(self.lock.take());
        self.shared.in_flight.store(false, Ordering::Release);
    }
}

impl IndexLifecycleManager {
    pub fn new(maintainer: Arc<dyn IndexMaintainer>) -> Self {
        Self::with_fetcher(
            maintainer,
            Arc::new(HttpFetcher::default()),
            RetryPolicy::default(),
        )
    }

    pub fn with_fetcher(
        maintainer: Arc<dyn IndexMaintainer>,
        fetcher: Arc<dyn SourceFetcher>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            maintainer,
            fetcher,
            retry,
            shared: Arc::new(Shared {
                inner: RwLock::new(Inner {
                    state: LifecycleState::Unconfigured,
                    config: None,
                    serving: None,
                    last_failure: None,
                }),
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.shared.read()
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.shared.write()
    }

    pub fn state(&self) -> LifecycleState {
        self.read().state
    }

    /// True while a rebuild, load or restore in this process holds the
    /// in-flight flag.
    pub fn is_busy(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    pub fn config(&self) -> Option<Arc<IndexBuildConfig>> {
        self.read().config.clone()
    }

    pub fn status(&self) -> LifecycleStatus {
        let inner = self.read();
        LifecycleStatus {
            state: inner.state,
            file_name_prefix: inner
                .config
                .as_ref()
                .map(|c| c.file_name_prefix().to_string()),
            serving: inner.serving.clone(),
            last_failure: inner.last_failure.clone(),
        }
    }

    /// Accept a validated configuration.
    ///
    /// Rejected configurations leave the state untouched. A snapshot that is
    /// already serving keeps serving until the next successful rebuild.
    pub fn configure(&self, config: IndexBuildConfig) -> Result<LifecycleState, IndexError> {
        config.validate()?;
        if self.is_busy() {
            return Err(IndexError::Busy);
        }
        let mut inner = self.write();
        if inner.state == LifecycleState::Building {
            return Err(IndexError::Busy);
        }
        tracing::info!(
            prefix = %config.file_name_prefix(),
            num_proc = config.chem_comp.num_proc,
            "index configuration accepted"
        );
        inner.config = Some(Arc::new(config));
        inner.state = LifecycleState::Configured;
        Ok(inner.state)
    }

    /// Load a persisted configuration and [`configure`](Self::configure) with it.
    pub fn configure_from_path(&self, path: &Path) -> Result<LifecycleState, IndexError> {
        let config = IndexBuildConfig::load(path)?;
        self.configure(config)
    }

    /// Claim the in-flight slot for `operation` without waiting.
    ///
    /// Fails with [`IndexError::Busy`] when another operation holds it, here or
    /// in another process sharing the cache root. On success the manager is
    /// `Building` until the permit is consumed or dropped.
    pub fn try_begin(&self, operation: IndexOperation) -> Result<OperationPermit, IndexError> {
        if self
            .shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(IndexError::Busy);
        }
        let claimed = self.config().ok_or_else(|| {
            IndexError::config(format!("cannot {operation}: no index configuration"))
        });
        let claimed = claimed.and_then(|config| {
            let dirs = StageDirs::new(config.cache_path(), config.file_name_prefix());
            Ok((dirs.lock_exclusive()?, config))
        });
        let (lock, config) = match claimed {
            Ok(claimed) => claimed,
            Err(err) => {
                self.shared.in_flight.store(false, Ordering::Release);
                return Err(err);
            }
        };

        self.write().state = LifecycleState::Building;
        Ok(OperationPermit {
            shared: Arc::clone(&self.shared),
            operation,
            config,
            lock: Some(lock),
        })
    }

    fn accept_permit(
        &self,
        permit: &OperationPermit,
        operation: IndexOperation,
    ) -> Result<Arc<IndexBuildConfig>, IndexError> {
        if !Arc::ptr_eq(&permit.shared, &self.shared) || permit.operation != operation {
            return Err(IndexError::config(format!(
                "permit for {} does not cover {operation} on this manager",
                permit.operation
            )));
        }
        Ok(Arc::clone(&permit.config))
    }

    fn record_failure(
        &self,
        operation: &'static str,
        stage: Option<RebuildStage>,
        err: &IndexError,
    ) -> LifecycleState {
        tracing::error!(
            operation,
            stage = stage.map(|s| s.as_str()).unwrap_or("-"),
            error = %err,
            "index operation failed"
        );
        metrics::counter!(
            "chem_search_index_failures_total",
            "operation" => operation,
            "stage" => stage.map(|s| s.as_str()).unwrap_or("none")
        )
        .increment(1);

        let mut inner = self.write();
        inner.state = LifecycleState::Failed;
        inner.last_failure = Some(StageFailure {
            operation: operation.to_string(),
            stage,
            reason: err.to_string(),
            failed_at: Utc::now(),
        });
        inner.state
    }

    fn publish(
        &self,
        dirs: &StageDirs,
        snapshot: SnapshotInfo,
    ) -> Result<LifecycleState, IndexError> {
        snapshot.persist(&dirs.manifest_path())?;
        tracing::info!(
            prefix = %snapshot.file_name_prefix,
            origin = %snapshot.origin,
            "serving new index snapshot"
        );
        let mut inner = self.write();
        inner.serving = Some(snapshot);
        inner.state = LifecycleState::Ready;
        Ok(inner.state)
    }

    /// Run all four stages in order.
    ///
    /// Returns `Ok(Ready)` when every stage succeeded and `Ok(Failed)` when a
    /// stage failed; the failure is recorded in [`status`](Self::status).
    pub async fn rebuild(&self) -> Result<LifecycleState, IndexError> {
        let permit = self.try_begin(IndexOperation::Rebuild)?;
        self.rebuild_with(permit).await
    }

    /// [`rebuild`](Self::rebuild) under a permit already claimed with
    /// [`try_begin`](Self::try_begin).
    pub async fn rebuild_with(&self, permit: OperationPermit) -> Result<LifecycleState, IndexError> {
        let config = self.accept_permit(&permit, IndexOperation::Rebuild)?;
        let dirs = StageDirs::new(config.cache_path(), config.file_name_prefix());
        let started = Instant::now();
        tracing::info!(
            prefix = %config.file_name_prefix(),
            cache = %config.cache_path().display(),
            "starting index rebuild"
        );

        let mut reports = Vec::with_capacity(RebuildStage::ORDERED.len());
        for stage in RebuildStage::ORDERED {
            let stage_started = Instant::now();
            match self.run_stage(stage, &config, &dirs).await {
                Ok(outcome) => {
                    let elapsed = stage_started.elapsed();
                    metrics::histogram!(
                        "chem_search_rebuild_stage_seconds",
                        "stage" => stage.as_str()
                    )
                    .record(elapsed.as_secs_f64());
                    tracing::info!(
                        stage = %stage,
                        items = ?outcome.items,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "rebuild stage complete"
                    );
                    reports.push(StageReport {
                        stage,
                        duration_ms: elapsed.as_millis() as u64,
                        items: outcome.items,
                    });
                }
                Err(err) => {
                    if let Err(discard_err) = dirs.discard(stage) {
                        tracing::warn!(stage = %stage, error = %discard_err, "failed to discard staging output");
                    }
                    return Ok(self.record_failure("rebuild", Some(stage), &err));
                }
            }
        }

        let snapshot = SnapshotInfo {
            config_version: config.version_number,
            file_name_prefix: config.file_name_prefix().to_string(),
            completed_at: Utc::now(),
            origin: "rebuild".to_string(),
            stages: reports,
        };
        match self.publish(&dirs, snapshot) {
            Ok(state) => {
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "index rebuild complete"
                );
                Ok(state)
            }
            Err(err) => Ok(self.record_failure("rebuild", None, &err)),
        }
    }

    async fn run_stage(
        &self,
        stage: RebuildStage,
        config: &IndexBuildConfig,
        dirs: &StageDirs,
    ) -> Result<StageOutcome, IndexError> {
        let Some(output) = dirs.prepare(stage)? else {
            return self.reload_and_probe(config, dirs).await;
        };
        let input = stage.previous().and_then(|prev| dirs.committed(prev));
        let ctx = StageContext {
            config,
            stage,
            input_dir: input.as_deref(),
            output_dir: &output,
        };

        let outcome = match stage {
            RebuildStage::ChemCompIndex => {
                let sources =
                    resolve_sources(config, &output, self.fetcher.as_ref(), &self.retry).await?;
                self.maintainer
                    .update_chem_comp_index(ctx, sources.as_ref())
                    .await?
            }
            RebuildStage::SearchIndex => self.maintainer.update_search_index(ctx).await?,
            RebuildStage::SearchMoleculeProvider => {
                self.maintainer.update_search_molecule_provider(ctx).await?
            }
            RebuildStage::ReloadDatabase => return self.reload_and_probe(config, dirs).await,
        };
        // From the first commit on the tree mixes generations until a new
        // manifest is published.
        dirs.retire_manifest()?;
        dirs.commit(stage)?;
        Ok(outcome)
    }

    async fn reload_and_probe(
        &self,
        config: &IndexBuildConfig,
        dirs: &StageDirs,
    ) -> Result<StageOutcome, IndexError> {
        let outcome = self
            .maintainer
            .reload_search_database(config, dirs.index_root())
            .await?;
        if !self
            .maintainer
            .probe_search_database(config, dirs.index_root())
            .await?
        {
            return Err(IndexError::upstream(
                "search database is not queryable after reload",
            ));
        }
        Ok(outcome)
    }

    /// Serve an index built by an earlier run without rebuilding it.
    ///
    /// Requires a manifest that matches the configured prefix and version and
    /// every committed stage directory. Only the reload stage runs.
    pub async fn load_existing(&self) -> Result<LifecycleState, IndexError> {
        let config = self
            .config()
            .ok_or_else(|| IndexError::config("cannot load: no index configuration"))?;
        let dirs = StageDirs::new(config.cache_path(), config.file_name_prefix());
        let snapshot = SnapshotInfo::load(&dirs.manifest_path())?;
        if snapshot.file_name_prefix != config.file_name_prefix()
            || snapshot.config_version != config.version_number
        {
            return Err(IndexError::Snapshot(format!(
                "manifest for {} v{} does not match configuration {} v{}",
                snapshot.file_name_prefix,
                snapshot.config_version,
                config.file_name_prefix(),
                config.version_number
            )));
        }
        let missing = dirs.missing_committed();
        if !missing.is_empty() {
            return Err(IndexError::Snapshot(format!(
                "committed index is incomplete, missing: {}",
                missing.join(", ")
            )));
        }

        let permit = self.try_begin(IndexOperation::Load)?;
        let config = self.accept_permit(&permit, IndexOperation::Load)?;
        match self.reload_and_probe(&config, &dirs).await {
            Ok(_) => {
                tracing::info!(
                    prefix = %snapshot.file_name_prefix,
                    completed_at = %snapshot.completed_at,
                    "loaded existing index snapshot"
                );
                let mut inner = self.write();
                inner.serving = Some(snapshot);
                inner.state = LifecycleState::Ready;
                Ok(inner.state)
            }
            Err(err) => Ok(self.record_failure(
                "load",
                Some(RebuildStage::ReloadDatabase),
                &err,
            )),
        }
    }

    /// Replace the committed index with a prebuilt bundle and serve it.
    pub async fn restore_from_bundle(
        &self,
        bundle: &DependencyBundle,
    ) -> Result<LifecycleState, IndexError> {
        let permit = self.try_begin(IndexOperation::Restore)?;
        self.restore_with(permit, bundle).await
    }

    /// [`restore_from_bundle`](Self::restore_from_bundle) under a permit
    /// already claimed with [`try_begin`](Self::try_begin).
    pub async fn restore_with(
        &self,
        permit: OperationPermit,
        bundle: &DependencyBundle,
    ) -> Result<LifecycleState, IndexError> {
        let config = self.accept_permit(&permit, IndexOperation::Restore)?;
        let dirs = StageDirs::new(config.cache_path(), config.file_name_prefix());
        let url = bundle.url();
        tracing::info!(url = %url, prefix = %config.file_name_prefix(), "restoring index bundle");

        let started = Instant::now();
        if let Err(err) = dirs.retire_manifest() {
            return Ok(self.record_failure("restore", None, &IndexError::from(err)));
        }
        let restored = match self
            .maintainer
            .restore_bundle(&url, &config, dirs.index_root())
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => return Ok(self.record_failure("restore", None, &err)),
        };
        if let Err(err) = self.reload_and_probe(&config, &dirs).await {
            return Ok(self.record_failure(
                "restore",
                Some(RebuildStage::ReloadDatabase),
                &err,
            ));
        }

        let snapshot = SnapshotInfo {
            config_version: config.version_number,
            file_name_prefix: config.file_name_prefix().to_string(),
            completed_at: Utc::now(),
            origin: "restore".to_string(),
            stages: vec![StageReport {
                stage: RebuildStage::ReloadDatabase,
                duration_ms: started.elapsed().as_millis() as u64,
                items: restored.items,
            }],
        };
        match self.publish(&dirs, snapshot) {
            Ok(state) => Ok(state),
            Err(err) => Ok(self.record_failure("restore", None, &err)),
        }
    }

    /// Read-only health check of the served snapshot. Never changes state.
    pub async fn verify(&self) -> bool {
        let (config, serving) = {
            let inner = self.read();
            (inner.config.clone(), inner.serving.clone())
        };
        let (Some(config), Some(serving)) = (config, serving) else {
            return false;
        };
        let dirs = StageDirs::new(config.cache_path(), config.file_name_prefix());

        if let Err(err) = SnapshotInfo::load(&dirs.manifest_path()) {
            tracing::warn!(error = %err, "verify: manifest unreadable");
            return false;
        }
        let missing = dirs.missing_committed();
        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "verify: committed stage output missing");
            return false;
        }
        match self
            .maintainer
            .probe_search_database(&config, dirs.index_root())
            .await
        {
            Ok(true) => {
                tracing::debug!(prefix = %serving.file_name_prefix, "verify ok");
                true
            }
            Ok(false) => {
                tracing::warn!("verify: search database probe returned false");
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, "verify: search database probe failed");
                false
            }
        }
    }
}

impl SnapshotGate for IndexLifecycleManager {
    fn serving(&self) -> Option<SnapshotInfo> {
        self.read().serving.clone()
    }
}
