//! Workspace umbrella crate for chem-search.
//!
//! Re-exports the index lifecycle, the query dispatcher and the HTTP server so
//! callers can depend on one crate, and hosts the YAML bootstrap profile and
//! the operations behind the `chem-search` command line.

pub mod commands;
pub mod config;

pub use config::{BootstrapProfile, ConfigLoadError, ProfileSources};

pub use index::{
    DependencyBundle, DependencyConfigBuilder, IndexBuildConfig, IndexError,
    IndexLifecycleManager, IndexMaintainer, LifecycleState, LifecycleStatus, RetryPolicy,
    SnapshotGate, SnapshotInfo,
};
pub use matcher::{
    ChemToolkit, DescriptorType, MatchError, MatchOptions, MatchResult, Query, QueryDispatcher,
    RankedAnswer, RankingMode, RemoteToolkit, ResultRanker, SearchStrategy, rank,
};
pub use server::{ServerConfig, ServerError, ServerState, StartupMode, build_router};
