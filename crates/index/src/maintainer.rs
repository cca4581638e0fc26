use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::IndexBuildConfig;
use crate::IndexError;

/// One step of the search-index rebuild, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebuildStage {
    /// Parse component and BIRD definitions into the chemical-component index.
    ChemCompIndex,
    /// Generate descriptors and fingerprints from the component index.
    SearchIndex,
    /// Assemble the molecule provider consumed by the search database.
    SearchMoleculeProvider,
    /// Load the built artifacts into the live search database.
    ReloadDatabase,
}

impl RebuildStage {
    pub const ORDERED: [RebuildStage; 4] = [
        RebuildStage::ChemCompIndex,
        RebuildStage::SearchIndex,
        RebuildStage::SearchMoleculeProvider,
        RebuildStage::ReloadDatabase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RebuildStage::ChemCompIndex => "chem-comp-index",
            RebuildStage::SearchIndex => "search-index",
            RebuildStage::SearchMoleculeProvider => "search-molecule-provider",
            RebuildStage::ReloadDatabase => "reload-database",
        }
    }

    /// 1-based position in the rebuild sequence.
    pub fn ordinal(&self) -> usize {
        match self {
            RebuildStage::ChemCompIndex => 1,
            RebuildStage::SearchIndex => 2,
            RebuildStage::SearchMoleculeProvider => 3,
            RebuildStage::ReloadDatabase => 4,
        }
    }

    /// The stage whose committed output this stage consumes.
    pub fn previous(&self) -> Option<RebuildStage> {
        match self {
            RebuildStage::ChemCompIndex => None,
            RebuildStage::SearchIndex => Some(RebuildStage::ChemCompIndex),
            RebuildStage::SearchMoleculeProvider => Some(RebuildStage::SearchIndex),
            RebuildStage::ReloadDatabase => Some(RebuildStage::SearchMoleculeProvider),
        }
    }

    /// Directory name for the stage's on-disk artifacts. The reload stage
    /// produces none.
    pub fn artifact_dir(&self) -> Option<&'static str> {
        match self {
            RebuildStage::ChemCompIndex => Some("chem-comp"),
            RebuildStage::SearchIndex => Some("search-index"),
            RebuildStage::SearchMoleculeProvider => Some("molecule-provider"),
            RebuildStage::ReloadDatabase => None,
        }
    }
}

impl fmt::Display for RebuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs handed to an artifact-producing stage.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub config: &'a IndexBuildConfig,
    pub stage: RebuildStage,
    /// Committed output of the previous stage, `None` for the first stage.
    pub input_dir: Option<&'a Path>,
    /// Staging directory the stage must write into.
    pub output_dir: &'a Path,
}

/// Component and BIRD sources after any remote targets have been fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSources {
    pub chem_comp: PathBuf,
    pub bird: PathBuf,
}

/// What a stage reported back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// Number of items (components, molecules, descriptors) produced.
    pub items: Option<usize>,
    pub detail: Option<String>,
}

impl StageOutcome {
    pub fn with_items(items: usize) -> Self {
        Self {
            items: Some(items),
            detail: None,
        }
    }
}

/// Index-management operations of the external chemistry toolkit.
///
/// Each artifact stage writes only into `ctx.output_dir`; the lifecycle
/// manager decides when that output becomes the committed copy.
#[async_trait]
pub trait IndexMaintainer: Send + Sync {
    /// Stage 1. `sources` is `None` when building from the production feed.
    async fn update_chem_comp_index(
        &self,
        ctx: StageContext<'_>,
        sources: Option<&LocalSources>,
    ) -> Result<StageOutcome, IndexError>;

    /// Stage 2.
    async fn update_search_index(&self, ctx: StageContext<'_>)
        -> Result<StageOutcome, IndexError>;

    /// Stage 3.
    async fn update_search_molecule_provider(
        &self,
        ctx: StageContext<'_>,
    ) -> Result<StageOutcome, IndexError>;

    /// Stage 4. Point the live search database at the committed artifacts.
    async fn reload_search_database(
        &self,
        config: &IndexBuildConfig,
        index_root: &Path,
    ) -> Result<StageOutcome, IndexError>;

    /// Cheap read-only check that the live database answers queries.
    async fn probe_search_database(
        &self,
        config: &IndexBuildConfig,
        index_root: &Path,
    ) -> Result<bool, IndexError>;

    /// Unpack a prebuilt dependency bundle from `url` into `index_root`.
    async fn restore_bundle(
        &self,
        url: &str,
        _config: &IndexBuildConfig,
        _index_root: &Path,
    ) -> Result<StageOutcome, IndexError> {
        Err(IndexError::upstream(format!(
            "bundle restore from {url} is not supported by this toolkit"
        )))
    }
}
