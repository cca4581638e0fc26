use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::IndexError;

/// Version stamped into newly built configurations.
pub const CONFIG_VERSION: f64 = 0.20;

/// Returns true when `prefix` selects the full production dataset.
///
/// Both the bare `full` prefix and the conventional `cc-full` form qualify.
pub fn is_full_prefix(prefix: &str) -> bool {
    prefix == "full" || prefix.ends_with("-full")
}

/// Derive the search-index file-name prefix from the component prefix
/// (`cc-abbrev` -> `oe-abbrev`).
pub fn search_prefix_for(cc_prefix: &str) -> String {
    match cc_prefix.strip_prefix("cc-") {
        Some(rest) => format!("oe-{rest}"),
        None => format!("oe-{cc_prefix}"),
    }
}

/// Location of the persisted configuration for a cache root and prefix.
pub fn config_path(cache_path: &Path, prefix: &str) -> PathBuf {
    cache_path
        .join("config")
        .join(format!("{prefix}-config.json"))
}

/// Explicit component and BIRD definition sources for an abbreviated build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTargets {
    /// Chemical component dictionary (`components.cif` or an abbreviation of it).
    pub chem_comp: String,
    /// BIRD (PRD chemical component) definitions.
    pub bird: String,
}

impl SourceTargets {
    pub fn new(chem_comp: impl Into<String>, bird: impl Into<String>) -> Self {
        Self {
            chem_comp: chem_comp.into(),
            bird: bird.into(),
        }
    }
}

/// Where a source target lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// Fetched over HTTP(S) during the first rebuild stage.
    Remote(String),
    /// Read from the local filesystem.
    Local(PathBuf),
}

impl SourceLocation {
    pub fn classify(target: &str) -> Self {
        if target.starts_with("http://") || target.starts_with("https://") {
            SourceLocation::Remote(target.to_string())
        } else if let Some(path) = target.strip_prefix("file://") {
            SourceLocation::Local(PathBuf::from(path))
        } else {
            SourceLocation::Local(PathBuf::from(target))
        }
    }
}

/// Parameters for the chemical-component index build (`ccsiKwargs`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChemCompIndexParams {
    pub cc_url_target: Option<String>,
    pub bird_url_target: Option<String>,
    pub cache_path: PathBuf,
    pub use_cache: bool,
    pub cc_file_name_prefix: String,
    pub oe_file_name_prefix: String,
    pub limit_perceptions: bool,
    pub min_count: Option<usize>,
    pub num_proc: usize,
    pub quiet_flag: bool,
    pub max_chunk_size: usize,
    pub mol_limit: Option<usize>,
    pub log_sizes: bool,
}

/// Parameters for the search index and molecule provider (`oesmpKwargs`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndexParams {
    #[serde(flatten)]
    pub base: ChemCompIndexParams,
    /// Maximum hits returned per fingerprint query.
    pub max_fp_results: usize,
    /// Minimum similarity score per fingerprint type.
    #[serde(rename = "fpTypeCuttoffD")]
    pub fp_type_cutoffs: BTreeMap<String, f64>,
    /// Descriptor build types to generate.
    pub build_type_list: Vec<String>,
    pub screen_type_list: Option<Vec<String>>,
}

/// Versioned build configuration shared between the bootstrap step and the
/// lifecycle manager.
///
/// Every field is materialized at build time; nothing is resolved from the
/// process environment when the file is read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexBuildConfig {
    #[serde(rename = "versionNumber")]
    pub version_number: f64,
    #[serde(rename = "ccsiKwargs")]
    pub chem_comp: ChemCompIndexParams,
    #[serde(rename = "oesmpKwargs")]
    pub search: SearchIndexParams,
}

impl IndexBuildConfig {
    /// Component file-name prefix (`cc-abbrev`, `cc-full`, ...).
    pub fn file_name_prefix(&self) -> &str {
        &self.chem_comp.cc_file_name_prefix
    }

    pub fn cache_path(&self) -> &Path {
        &self.chem_comp.cache_path
    }

    pub fn is_full(&self) -> bool {
        is_full_prefix(self.file_name_prefix())
    }

    /// Explicit sources, when both are present.
    pub fn sources(&self) -> Option<SourceTargets> {
        match (&self.chem_comp.cc_url_target, &self.chem_comp.bird_url_target) {
            (Some(cc), Some(bird)) => Some(SourceTargets::new(cc.clone(), bird.clone())),
            _ => None,
        }
    }

    /// Where this configuration is persisted by default.
    pub fn config_path(&self) -> PathBuf {
        config_path(self.cache_path(), self.file_name_prefix())
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), IndexError> {
        if !self.version_number.is_finite() || self.version_number <= 0.0 {
            return Err(IndexError::config("versionNumber must be a positive number"));
        }

        let cc = &self.chem_comp;
        let base = &self.search.base;
        if cc.cc_file_name_prefix.trim().is_empty() {
            return Err(IndexError::config("ccFileNamePrefix must not be empty"));
        }
        if cc.cache_path.as_os_str().is_empty() {
            return Err(IndexError::config("cachePath must not be empty"));
        }
        if cc.cc_file_name_prefix != base.cc_file_name_prefix
            || cc.oe_file_name_prefix != base.oe_file_name_prefix
            || cc.cache_path != base.cache_path
        {
            return Err(IndexError::config(
                "ccsiKwargs and oesmpKwargs disagree on prefix or cache path",
            ));
        }
        if cc.cc_url_target != base.cc_url_target || cc.bird_url_target != base.bird_url_target {
            return Err(IndexError::config(
                "ccsiKwargs and oesmpKwargs disagree on source targets",
            ));
        }

        let has_cc = cc.cc_url_target.as_deref().is_some_and(|s| !s.trim().is_empty());
        let has_bird = cc
            .bird_url_target
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        if self.is_full() {
            if cc.cc_url_target.is_some() || cc.bird_url_target.is_some() {
                return Err(IndexError::config(format!(
                    "prefix '{}' builds from the production feed; explicit sources are not allowed",
                    cc.cc_file_name_prefix
                )));
            }
        } else if !(has_cc && has_bird) {
            return Err(IndexError::config(format!(
                "prefix '{}' requires both ccUrlTarget and birdUrlTarget",
                cc.cc_file_name_prefix
            )));
        }

        for params in [cc, base] {
            if params.num_proc == 0 {
                return Err(IndexError::config("numProc must be >= 1"));
            }
            if params.max_chunk_size == 0 {
                return Err(IndexError::config("maxChunkSize must be >= 1"));
            }
        }

        if self.search.max_fp_results == 0 {
            return Err(IndexError::config("maxFpResults must be >= 1"));
        }
        if self.search.build_type_list.is_empty() {
            return Err(IndexError::config("buildTypeList must not be empty"));
        }
        for (fp_type, cutoff) in &self.search.fp_type_cutoffs {
            if !(0.0..=1.0).contains(cutoff) {
                return Err(IndexError::config(format!(
                    "fingerprint cutoff for {fp_type} must be within [0, 1], got {cutoff}"
                )));
            }
        }

        Ok(())
    }

    /// Read and validate a persisted configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            IndexError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: IndexBuildConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to `path`, replacing any previous file.
    ///
    /// The write goes to a temporary file in the same directory which is then
    /// renamed over the target, so readers never observe a partial file.
    pub fn persist<P: AsRef<Path>>(&self, path: P) -> Result<(), IndexError> {
        self.validate()?;
        write_json_atomic(path.as_ref(), self)?;
        tracing::info!(
            path = %path.as_ref().display(),
            prefix = %self.file_name_prefix(),
            "persisted index build configuration"
        );
        Ok(())
    }
}

pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), IndexError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
