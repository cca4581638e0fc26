//! # chem-search Index
//!
//! This crate owns everything the service needs before the external chemistry
//! toolkit can answer a query: the persisted build configuration that
//! describes how the search indices are produced, and the lifecycle manager
//! that runs the ordered rebuild of those indices and decides when the
//! service is allowed to serve them.
//!
//! ## Core Types
//!
//! - [`IndexBuildConfig`]: versioned, self-describing snapshot of the build
//!   parameters (`ccsiKwargs` for the chemical-component index, `oesmpKwargs`
//!   for the search index and molecule provider). Persisted as JSON under
//!   `<cache>/config/<prefix>-config.json`.
//! - [`DependencyConfigBuilder`]: constructs an [`IndexBuildConfig`] from a
//!   cache root, a file-name prefix and optional explicit data sources, capping
//!   the worker count at the host's logical core count.
//! - [`IndexLifecycleManager`]: state machine
//!   (`Unconfigured -> Configured -> Building -> Ready | Failed`) that runs the
//!   four [`RebuildStage`]s strictly in order against an [`IndexMaintainer`].
//! - [`IndexMaintainer`]: the index-management half of the external toolkit.
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use index::{DependencyConfigBuilder, IndexLifecycleManager, IndexMaintainer, LifecycleState};
//!
//! # async fn run(maintainer: Arc<dyn IndexMaintainer>) -> Result<(), index::IndexError> {
//! let config = DependencyConfigBuilder::new("./CACHE", "cc-full").build()?;
//! config.persist(config.config_path())?;
//!
//! let manager = IndexLifecycleManager::new(maintainer);
//! manager.configure(config)?;
//! if manager.rebuild().await? == LifecycleState::Ready {
//!     assert!(manager.verify().await);
//! }
//! # Ok(())
//! # }
//! ```

mod builder;
mod config;
mod fetch;
mod lifecycle;
mod maintainer;
mod snapshot;
mod stage_dirs;

pub use builder::{host_logical_cores, DependencyConfigBuilder};
pub use config::{
    config_path, is_full_prefix, search_prefix_for, ChemCompIndexParams, IndexBuildConfig,
    SearchIndexParams, SourceLocation, SourceTargets, CONFIG_VERSION,
};
pub use fetch::{FetchFailure, HttpFetcher, RetryPolicy, SourceFetcher};
pub use lifecycle::{
    DependencyBundle, IndexLifecycleManager, IndexOperation, LifecycleState, LifecycleStatus,
    OperationPermit, StageFailure,
};
pub use maintainer::{IndexMaintainer, LocalSources, RebuildStage, StageContext, StageOutcome};
pub use snapshot::{SnapshotGate, SnapshotInfo, StageReport};
pub use stage_dirs::StageDirs;

use thiserror::Error;

/// Errors produced by index configuration and lifecycle operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The build configuration is invalid, incomplete or missing.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A rebuild (or restore) is already in flight.
    #[error("index rebuild already in progress")]
    Busy,
    /// The external toolkit reported a failure.
    #[error("upstream error: {0}")]
    Upstream(String),
    /// A source bundle could not be fetched within the retry budget.
    #[error("fetch of {target} failed after {attempts} attempt(s): {reason}")]
    Fetch {
        target: String,
        attempts: u32,
        reason: String,
    },
    /// A previously built index snapshot is missing or unreadable.
    #[error("snapshot error: {0}")]
    Snapshot(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl IndexError {
    pub fn config<E: std::fmt::Display>(err: E) -> Self {
        Self::Configuration(err.to_string())
    }

    pub fn upstream<E: std::fmt::Display>(err: E) -> Self {
        Self::Upstream(err.to_string())
    }
}
