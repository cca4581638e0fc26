use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use crate::config::{
    is_full_prefix, search_prefix_for, ChemCompIndexParams, IndexBuildConfig, SearchIndexParams,
    SourceLocation, SourceTargets, CONFIG_VERSION,
};
use crate::IndexError;

const DEFAULT_REQUESTED_WORKERS: usize = 12;
const DEFAULT_MAX_CHUNK_SIZE: usize = 10;
const DEFAULT_MAX_FP_RESULTS: usize = 50;

/// Logical cores reported by the host, at least 1.
pub fn host_logical_cores() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

fn default_fp_type_cutoffs() -> BTreeMap<String, f64> {
    BTreeMap::from([("TREE".to_string(), 0.6), ("MACCS".to_string(), 0.9)])
}

fn default_build_types() -> Vec<String> {
    [
        "oe-iso-smiles",
        "oe-smiles",
        "cactvs-iso-smiles",
        "cactvs-smiles",
        "inchi",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Builds the [`IndexBuildConfig`] that drives a search-index rebuild.
///
/// ```
/// use index::DependencyConfigBuilder;
///
/// let config = DependencyConfigBuilder::new("/var/cache/chem", "cc-full")
///     .with_requested_workers(999)
///     .with_host_cores(8)
///     .build()
///     .unwrap();
/// assert_eq!(config.chem_comp.num_proc, 8);
/// assert!(config.sources().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct DependencyConfigBuilder {
    cache_path: PathBuf,
    file_name_prefix: String,
    sources: Option<SourceTargets>,
    requested_workers: usize,
    host_cores: usize,
    max_chunk_size: usize,
    use_cache: bool,
    limit_perceptions: bool,
    fp_type_cutoffs: BTreeMap<String, f64>,
    build_types: Vec<String>,
    screen_types: Option<Vec<String>>,
    mol_limit: Option<usize>,
    max_fp_results: usize,
    quiet: bool,
    version_number: f64,
}

impl DependencyConfigBuilder {
    pub fn new(cache_path: impl Into<PathBuf>, file_name_prefix: impl Into<String>) -> Self {
        Self {
            cache_path: cache_path.into(),
            file_name_prefix: file_name_prefix.into(),
            sources: None,
            requested_workers: DEFAULT_REQUESTED_WORKERS,
            host_cores: host_logical_cores(),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            use_cache: false,
            limit_perceptions: false,
            fp_type_cutoffs: default_fp_type_cutoffs(),
            build_types: default_build_types(),
            screen_types: None,
            mol_limit: None,
            max_fp_results: DEFAULT_MAX_FP_RESULTS,
            quiet: true,
            version_number: CONFIG_VERSION,
        }
    }

    /// Explicit component/BIRD sources. Must be `None` for a full prefix.
    pub fn with_sources(mut self, sources: Option<SourceTargets>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_requested_workers(mut self, workers: usize) -> Self {
        self.requested_workers = workers;
        self
    }

    /// Override the detected core count (tests, constrained containers).
    pub fn with_host_cores(mut self, cores: usize) -> Self {
        self.host_cores = cores;
        self
    }

    pub fn with_max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }

    /// Reuse a previously cached parse of the definition files.
    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_limit_perceptions(mut self, limit: bool) -> Self {
        self.limit_perceptions = limit;
        self
    }

    pub fn with_fp_type_cutoffs(mut self, cutoffs: BTreeMap<String, f64>) -> Self {
        self.fp_type_cutoffs = cutoffs;
        self
    }

    pub fn with_build_types(mut self, build_types: Vec<String>) -> Self {
        self.build_types = build_types;
        self
    }

    pub fn with_screen_types(mut self, screen_types: Option<Vec<String>>) -> Self {
        self.screen_types = screen_types;
        self
    }

    /// Cap the number of molecules processed; `None` is unbounded.
    pub fn with_mol_limit(mut self, limit: Option<usize>) -> Self {
        self.mol_limit = limit;
        self
    }

    pub fn with_max_fp_results(mut self, max: usize) -> Self {
        self.max_fp_results = max;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_version_number(mut self, version: f64) -> Self {
        self.version_number = version;
        self
    }

    /// Worker count actually written to the configuration.
    pub fn effective_workers(&self) -> usize {
        self.requested_workers.min(self.host_cores.max(1)).max(1)
    }

    /// Build and validate the configuration.
    ///
    /// A full prefix rejects explicit sources; any other prefix requires both
    /// sources to resolve (local paths must exist, URLs are checked by scheme).
    pub fn build(&self) -> Result<IndexBuildConfig, IndexError> {
        let prefix = self.file_name_prefix.trim();
        if prefix.is_empty() {
            return Err(IndexError::config("file-name prefix must not be empty"));
        }

        let sources = if is_full_prefix(prefix) {
            if self.sources.is_some() {
                return Err(IndexError::config(format!(
                    "prefix '{prefix}' builds from the production feed; explicit sources are not allowed"
                )));
            }
            None
        } else {
            let sources = self.sources.as_ref().ok_or_else(|| {
                IndexError::config(format!(
                    "prefix '{prefix}' requires explicit component and BIRD sources"
                ))
            })?;
            ensure_resolvable("component", &sources.chem_comp)?;
            ensure_resolvable("BIRD", &sources.bird)?;
            Some(sources.clone())
        };

        let num_proc = self.effective_workers();
        if num_proc < self.requested_workers {
            tracing::info!(
                requested = self.requested_workers,
                host_cores = self.host_cores,
                num_proc,
                "capping index build workers at host core count"
            );
        }

        let chem_comp = ChemCompIndexParams {
            cc_url_target: sources.as_ref().map(|s| s.chem_comp.clone()),
            bird_url_target: sources.as_ref().map(|s| s.bird.clone()),
            cache_path: self.cache_path.clone(),
            use_cache: self.use_cache,
            cc_file_name_prefix: prefix.to_string(),
            oe_file_name_prefix: search_prefix_for(prefix),
            limit_perceptions: self.limit_perceptions,
            min_count: None,
            num_proc,
            quiet_flag: self.quiet,
            max_chunk_size: self.max_chunk_size,
            mol_limit: None,
            log_sizes: false,
        };
        let search = SearchIndexParams {
            base: ChemCompIndexParams {
                mol_limit: self.mol_limit,
                ..chem_comp.clone()
            },
            max_fp_results: self.max_fp_results,
            fp_type_cutoffs: self.fp_type_cutoffs.clone(),
            build_type_list: self.build_types.clone(),
            screen_type_list: self.screen_types.clone(),
        };

        let config = IndexBuildConfig {
            version_number: self.version_number,
            chem_comp,
            search,
        };
        config.validate()?;
        Ok(config)
    }

    /// Build the configuration and write it to its default location.
    pub fn build_and_persist(&self) -> Result<(IndexBuildConfig, PathBuf), IndexError> {
        let config = self.build()?;
        let path = config.config_path();
        config.persist(&path)?;
        Ok((config, path))
    }
}

fn ensure_resolvable(label: &str, target: &str) -> Result<(), IndexError> {
    if target.trim().is_empty() {
        return Err(IndexError::config(format!("{label} source must not be empty")));
    }
    match SourceLocation::classify(target) {
        SourceLocation::Remote(_) => Ok(()),
        SourceLocation::Local(path) if path.is_file() => Ok(()),
        SourceLocation::Local(path) => Err(IndexError::config(format!(
            "{label} source {} does not exist",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn abbrev_sources(dir: &std::path::Path) -> SourceTargets {
        let cc = dir.join("components-abbrev.cif");
        let bird = dir.join("prdcc-abbrev.cif");
        fs::write(&cc, "data_004\n").unwrap();
        fs::write(&bird, "data_PRDCC_000010\n").unwrap();
        SourceTargets::new(cc.display().to_string(), bird.display().to_string())
    }

    #[test]
    fn full_prefix_builds_without_sources() {
        let config = DependencyConfigBuilder::new("/cache", "cc-full")
            .with_host_cores(16)
            .build()
            .unwrap();
        assert!(config.sources().is_none());
        assert_eq!(config.search.base.oe_file_name_prefix, "oe-full");
        assert_eq!(config.chem_comp.num_proc, 12);
    }

    #[test]
    fn full_prefix_with_explicit_sources_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for prefix in ["full", "cc-full"] {
            let err = DependencyConfigBuilder::new(dir.path(), prefix)
                .with_sources(Some(abbrev_sources(dir.path())))
                .build()
                .unwrap_err();
            assert!(matches!(err, IndexError::Configuration(_)), "{prefix}");
        }
    }

    #[test]
    fn abbreviated_prefix_requires_sources() {
        let err = DependencyConfigBuilder::new("/cache", "cc-abbrev")
            .build()
            .unwrap_err();
        assert!(matches!(err, IndexError::Configuration(msg) if msg.contains("cc-abbrev")));
    }

    #[test]
    fn unresolvable_local_source_is_rejected_and_nothing_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let builder = DependencyConfigBuilder::new(dir.path().join("CACHE"), "cc-abbrev")
            .with_sources(Some(SourceTargets::new(
                dir.path().join("missing.cif").display().to_string(),
                dir.path().join("also-missing.cif").display().to_string(),
            )));
        let err = builder.build_and_persist().unwrap_err();
        assert!(matches!(err, IndexError::Configuration(msg) if msg.contains("does not exist")));
        assert!(!dir.path().join("CACHE").join("config").exists());
    }

    #[test]
    fn remote_sources_resolve_by_scheme() {
        let config = DependencyConfigBuilder::new("/cache", "cc-abbrev")
            .with_sources(Some(SourceTargets::new(
                "https://example.org/components-abbrev.cif",
                "http://example.org/prdcc-abbrev.cif",
            )))
            .build()
            .unwrap();
        assert_eq!(
            config.sources().unwrap().bird,
            "http://example.org/prdcc-abbrev.cif"
        );
    }

    #[test]
    fn worker_count_never_exceeds_host_cores() {
        for (requested, cores, expected) in [(999, 8, 8), (4, 8, 4), (12, 1, 1), (0, 8, 1)] {
            let builder = DependencyConfigBuilder::new("/cache", "cc-full")
                .with_requested_workers(requested)
                .with_host_cores(cores);
            let config = builder.build().unwrap();
            assert_eq!(config.chem_comp.num_proc, expected);
            assert_eq!(config.search.base.num_proc, expected);
            assert!(config.chem_comp.num_proc <= cores.max(1));
        }
    }

    #[test]
    fn default_worker_count_respects_real_host() {
        let config = DependencyConfigBuilder::new("/cache", "cc-full")
            .with_requested_workers(usize::MAX)
            .build()
            .unwrap();
        assert!(config.chem_comp.num_proc <= host_logical_cores());
    }

    #[test]
    fn mol_limit_only_applies_to_search_params() {
        let config = DependencyConfigBuilder::new("/cache", "cc-full")
            .with_mol_limit(Some(500))
            .build()
            .unwrap();
        assert_eq!(config.search.base.mol_limit, Some(500));
        assert_eq!(config.chem_comp.mol_limit, None);
    }

    #[test]
    fn build_and_persist_writes_default_location() {
        let dir = tempfile::tempdir().unwrap();
        let (config, path) = DependencyConfigBuilder::new(dir.path().join("CACHE"), "cc-abbrev")
            .with_sources(Some(abbrev_sources(dir.path())))
            .build_and_persist()
            .unwrap();
        assert_eq!(
            path,
            dir.path().join("CACHE/config/cc-abbrev-config.json")
        );
        assert_eq!(IndexBuildConfig::load(&path).unwrap(), config);
    }
}
