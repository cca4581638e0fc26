//! YAML bootstrap profiles for `chem-search bootstrap`
//!
//! A profile overrides the knobs of [`DependencyConfigBuilder`] so that a
//! build can be described once and checked into deployment tooling. Every
//! field is optional; anything left out keeps the builder default.
//!
//! ## Example YAML Profile
//!
//! ```yaml
//! version: "1.0"
//! name: "abbreviated test build"
//!
//! cache_path: "./CACHE"
//! cc_prefix: "cc-abbrev"
//!
//! workers: 4
//! max_chunk_size: 20
//! use_cache: true
//! limit_perceptions: false
//! fp_type_cutoffs:
//!   TREE: 0.6
//!   MACCS: 0.9
//! build_types: ["oe-iso-smiles", "inchi"]
//! mol_limit: 500
//! max_fp_results: 50
//!
//! sources:
//!   chem_comp: "./data/components-abbrev.cif"
//!   bird: "./data/prdcc-abbrev.cif"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use index::{DependencyConfigBuilder, SourceTargets};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading a bootstrap profile
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read profile: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported profile version: {0}")]
    UnsupportedVersion(String),
}

/// Explicit component and BIRD sources, local paths or URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSources {
    pub chem_comp: String,
    pub bird: String,
}

/// Overrides for one index build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapProfile {
    /// Profile format version
    pub version: Option<String>,

    pub name: Option<String>,

    /// Cache root; the command line and server config win when both are set
    pub cache_path: Option<PathBuf>,
    pub cc_prefix: Option<String>,

    /// Requested worker count, capped at the host's logical cores
    pub workers: Option<usize>,
    pub max_chunk_size: Option<usize>,
    pub use_cache: Option<bool>,
    pub limit_perceptions: Option<bool>,
    pub fp_type_cutoffs: Option<BTreeMap<String, f64>>,
    pub build_types: Option<Vec<String>>,
    pub screen_types: Option<Vec<String>>,
    pub mol_limit: Option<usize>,
    pub max_fp_results: Option<usize>,
    pub quiet: Option<bool>,

    /// Required unless the prefix names a full build
    pub sources: Option<ProfileSources>,
}

impl BootstrapProfile {
    /// Load a YAML profile from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a YAML profile from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let profile: BootstrapProfile = serde_yaml::from_str(yaml)?;
        profile.validate()?;
        Ok(profile)
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_deref() {
            None | Some("1.0") | Some("1") => {}
            Some(v) => return Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }

        if self.workers == Some(0) {
            return Err(ConfigLoadError::Validation(
                "workers must be >= 1".to_string(),
            ));
        }
        if self.max_chunk_size == Some(0) {
            return Err(ConfigLoadError::Validation(
                "max_chunk_size must be >= 1".to_string(),
            ));
        }
        if let Some(prefix) = &self.cc_prefix {
            if prefix.trim().is_empty() {
                return Err(ConfigLoadError::Validation(
                    "cc_prefix must not be empty".to_string(),
                ));
            }
        }
        if let Some(cutoffs) = &self.fp_type_cutoffs {
            for (fp_type, cutoff) in cutoffs {
                if !(0.0..=1.0).contains(cutoff) {
                    return Err(ConfigLoadError::Validation(format!(
                        "fp_type_cutoffs.{fp_type} must be in [0, 1], got {cutoff}"
                    )));
                }
            }
        }
        if matches!(&self.build_types, Some(types) if types.is_empty()) {
            return Err(ConfigLoadError::Validation(
                "build_types must name at least one descriptor type".to_string(),
            ));
        }
        if let Some(sources) = &self.sources {
            if sources.chem_comp.trim().is_empty() || sources.bird.trim().is_empty() {
                return Err(ConfigLoadError::Validation(
                    "sources.chem_comp and sources.bird must both be set".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Start a builder for `cache_path` and `cc_prefix` with this profile
    /// applied. The profile's own cache path and prefix are only used when
    /// the arguments are `None`.
    pub fn builder(
        &self,
        cache_path: Option<PathBuf>,
        cc_prefix: Option<String>,
        default_cache: &Path,
        default_prefix: &str,
    ) -> DependencyConfigBuilder {
        let cache = cache_path
            .or_else(|| self.cache_path.clone())
            .unwrap_or_else(|| default_cache.to_path_buf());
        let prefix = cc_prefix
            .or_else(|| self.cc_prefix.clone())
            .unwrap_or_else(|| default_prefix.to_string());
        self.apply(DependencyConfigBuilder::new(cache, prefix))
    }

    /// Apply every override present in the profile.
    pub fn apply(&self, mut builder: DependencyConfigBuilder) -> DependencyConfigBuilder {
        if let Some(workers) = self.workers {
            builder = builder.with_requested_workers(workers);
        }
        if let Some(size) = self.max_chunk_size {
            builder = builder.with_max_chunk_size(size);
        }
        if let Some(use_cache) = self.use_cache {
            builder = builder.with_use_cache(use_cache);
        }
        if let Some(limit) = self.limit_perceptions {
            builder = builder.with_limit_perceptions(limit);
        }
        if let Some(cutoffs) = &self.fp_type_cutoffs {
            builder = builder.with_fp_type_cutoffs(cutoffs.clone());
        }
        if let Some(types) = &self.build_types {
            builder = builder.with_build_types(types.clone());
        }
        if self.screen_types.is_some() {
            builder = builder.with_screen_types(self.screen_types.clone());
        }
        if self.mol_limit.is_some() {
            builder = builder.with_mol_limit(self.mol_limit);
        }
        if let Some(max) = self.max_fp_results {
            builder = builder.with_max_fp_results(max);
        }
        if let Some(quiet) = self.quiet {
            builder = builder.with_quiet(quiet);
        }
        if let Some(sources) = &self.sources {
            builder = builder.with_sources(Some(SourceTargets::new(
                sources.chem_comp.clone(),
                sources.bird.clone(),
            )));
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_profile_keeps_builder_defaults() {
        let profile = BootstrapProfile::from_yaml("{}").unwrap();
        let built = profile
            .builder(None, None, Path::new("/cache"), "cc-full")
            .with_host_cores(64)
            .build()
            .unwrap();
        let reference = DependencyConfigBuilder::new("/cache", "cc-full")
            .with_host_cores(64)
            .build()
            .unwrap();
        assert_eq!(built, reference);
    }

    #[test]
    fn overrides_reach_the_built_config() {
        let yaml = r#"
version: "1.0"
workers: 4
max_chunk_size: 20
mol_limit: 500
fp_type_cutoffs:
  TREE: 0.5
build_types: ["inchi"]
"#;
        let profile = BootstrapProfile::from_yaml(yaml).unwrap();
        let config = profile
            .builder(None, None, Path::new("/cache"), "cc-full")
            .with_host_cores(64)
            .build()
            .unwrap();

        assert_eq!(config.chem_comp.num_proc, 4);
        assert_eq!(config.chem_comp.max_chunk_size, 20);
        assert_eq!(config.search.base.mol_limit, Some(500));
        assert_eq!(config.search.fp_type_cutoffs["TREE"], 0.5);
        assert_eq!(config.search.build_type_list, vec!["inchi".to_string()]);
    }

    #[test]
    fn arguments_win_over_profile_location() {
        let yaml = r#"
cache_path: "/profile-cache"
cc_prefix: "cc-profile"
"#;
        let profile = BootstrapProfile::from_yaml(yaml).unwrap();

        let config = profile
            .builder(None, Some("cc-full".into()), Path::new("/default"), "cc-x")
            .build()
            .unwrap();
        assert_eq!(config.cache_path(), Path::new("/profile-cache"));
        assert_eq!(config.file_name_prefix(), "cc-full");
    }

    #[test]
    fn partial_prefix_needs_sources() {
        let profile = BootstrapProfile::from_yaml("cc_prefix: cc-abbrev").unwrap();
        let result = profile
            .builder(None, None, Path::new("/cache"), "cc-full")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            BootstrapProfile::from_yaml("version: \"2.0\""),
            Err(ConfigLoadError::UnsupportedVersion(_))
        ));
        assert!(matches!(
            BootstrapProfile::from_yaml("workers: 0"),
            Err(ConfigLoadError::Validation(_))
        ));
        assert!(matches!(
            BootstrapProfile::from_yaml("fp_type_cutoffs: {MACCS: 1.5}"),
            Err(ConfigLoadError::Validation(_))
        ));
        assert!(matches!(
            BootstrapProfile::from_yaml("build_types: []"),
            Err(ConfigLoadError::Validation(_))
        ));
        assert!(matches!(
            BootstrapProfile::from_yaml("sources: {chem_comp: a.cif, bird: \"\"}"),
            Err(ConfigLoadError::Validation(_))
        ));
        assert!(matches!(
            BootstrapProfile::from_yaml("workers: [1, 2]"),
            Err(ConfigLoadError::YamlParse(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"name: nightly\nquiet: false\n").unwrap();
        let profile = BootstrapProfile::from_file(file.path()).unwrap();
        assert_eq!(profile.name.as_deref(), Some("nightly"));
        assert_eq!(profile.quiet, Some(false));
    }
}
