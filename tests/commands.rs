//! Integration tests for the `chem-search` bootstrap, rebuild and verify
//! operations, run against an in-process index maintainer.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chem_search::commands::{self, BootstrapOptions};
use chem_search::{IndexBuildConfig, IndexError, IndexLifecycleManager, LifecycleState, ServerConfig};
use index::{LocalSources, RebuildStage, StageContext, StageOutcome};
use tempfile::TempDir;

#[derive(Default)]
struct RecordingMaintainer {
    stages: Mutex<Vec<RebuildStage>>,
    fail_search_index: bool,
    probe_down: AtomicBool,
}

impl RecordingMaintainer {
    fn stage(&self, ctx: StageContext<'_>) -> Result<StageOutcome, IndexError> {
        self.stages.lock().unwrap().push(ctx.stage);
        std::fs::write(ctx.output_dir.join("artifact.bin"), ctx.stage.as_str())?;
        Ok(StageOutcome::with_items(10))
    }
}

#[async_trait]
impl index::IndexMaintainer for RecordingMaintainer {
    async fn update_chem_comp_index(
        &self,
        ctx: StageContext<'_>,
        _sources: Option<&LocalSources>,
    ) -> Result<StageOutcome, IndexError> {
        self.stage(ctx)
    }

    async fn update_search_index(
        &self,
        ctx: StageContext<'_>,
    ) -> Result<StageOutcome, IndexError> {
        if self.fail_search_index {
            self.stages.lock().unwrap().push(ctx.stage);
            return Err(IndexError::upstream("descriptor build crashed"));
        }
        self.stage(ctx)
    }

    async fn update_search_molecule_provider(
        &self,
        ctx: StageContext<'_>,
    ) -> Result<StageOutcome, IndexError> {
        self.stage(ctx)
    }

    async fn reload_search_database(
        &self,
        _config: &IndexBuildConfig,
        _index_root: &Path,
    ) -> Result<StageOutcome, IndexError> {
        self.stages.lock().unwrap().push(RebuildStage::ReloadDatabase);
        Ok(StageOutcome::default())
    }

    async fn probe_search_database(
        &self,
        _config: &IndexBuildConfig,
        _index_root: &Path,
    ) -> Result<bool, IndexError> {
        Ok(!self.probe_down.load(Ordering::SeqCst))
    }
}

fn server_config(cache: &TempDir) -> ServerConfig {
    ServerConfig {
        cache_path: cache.path().to_path_buf(),
        ..ServerConfig::default()
    }
}

fn bootstrapped(cache: &TempDir) -> ServerConfig {
    let config = server_config(cache);
    commands::bootstrap(&config, &BootstrapOptions::default()).unwrap();
    config
}

#[test]
fn bootstrap_writes_config_where_the_server_reads_it() {
    let cache = TempDir::new().unwrap();
    let config = server_config(&cache);

    let (built, path) = commands::bootstrap(&config, &BootstrapOptions::default()).unwrap();
    assert_eq!(path, config.index_config_path());
    assert_eq!(built.file_name_prefix(), "cc-full");
    assert_eq!(IndexBuildConfig::load(&path).unwrap(), built);
}

#[test]
fn bootstrap_applies_profile_and_flags() {
    let cache = TempDir::new().unwrap();
    let config = server_config(&cache);
    let profile = cache.path().join("build.yaml");
    std::fs::write(&profile, "workers: 1\nmax_fp_results: 25\n").unwrap();

    let options = BootstrapOptions {
        cache_path: None,
        cc_prefix: Some("nightly-full".to_string()),
        profile: Some(profile),
    };
    let (built, path) = commands::bootstrap(&config, &options).unwrap();
    assert_eq!(built.chem_comp.num_proc, 1);
    assert_eq!(built.search.max_fp_results, 25);
    assert!(path.ends_with("config/nightly-full-config.json"));
}

#[test]
fn bootstrap_reports_unreadable_profiles() {
    let cache = TempDir::new().unwrap();
    let options = BootstrapOptions {
        profile: Some(cache.path().join("missing.yaml")),
        ..BootstrapOptions::default()
    };
    let err = commands::bootstrap(&server_config(&cache), &options).unwrap_err();
    assert!(err.to_string().contains("missing.yaml"));
}

#[tokio::test]
async fn rebuild_runs_every_stage_then_verifies() {
    let cache = TempDir::new().unwrap();
    let config = bootstrapped(&cache);
    let maintainer = Arc::new(RecordingMaintainer::default());
    let lifecycle = IndexLifecycleManager::new(maintainer.clone());

    let summary = commands::rebuild(&lifecycle, &config.index_config_path())
        .await
        .unwrap();
    assert_eq!(summary.state, LifecycleState::Ready);
    assert_eq!(summary.status.serving.unwrap().stages.len(), 4);
    assert_eq!(
        *maintainer.stages.lock().unwrap(),
        RebuildStage::ORDERED.to_vec()
    );

    // A fresh process verifies the committed index without rebuilding it.
    let fresh = Arc::new(RecordingMaintainer::default());
    let lifecycle = IndexLifecycleManager::new(fresh.clone());
    assert!(commands::verify(&lifecycle, &config.index_config_path())
        .await
        .unwrap());
    assert_eq!(
        *fresh.stages.lock().unwrap(),
        vec![RebuildStage::ReloadDatabase]
    );
}

#[tokio::test]
async fn failed_rebuild_is_reported_not_raised() {
    let cache = TempDir::new().unwrap();
    let config = bootstrapped(&cache);
    let maintainer = Arc::new(RecordingMaintainer {
        fail_search_index: true,
        ..RecordingMaintainer::default()
    });
    let lifecycle = IndexLifecycleManager::new(maintainer.clone());

    let summary = commands::rebuild(&lifecycle, &config.index_config_path())
        .await
        .unwrap();
    assert_eq!(summary.state, LifecycleState::Failed);
    let failure = summary.status.last_failure.unwrap();
    assert_eq!(failure.stage, Some(RebuildStage::SearchIndex));
    assert!(failure.reason.contains("descriptor build crashed"));
    assert!(summary.status.serving.is_none());
    assert_eq!(maintainer.stages.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn verify_without_an_index_is_false() {
    let cache = TempDir::new().unwrap();
    let config = bootstrapped(&cache);
    let lifecycle = IndexLifecycleManager::new(Arc::new(RecordingMaintainer::default()));

    assert!(!commands::verify(&lifecycle, &config.index_config_path())
        .await
        .unwrap());
}

#[tokio::test]
async fn verify_fails_when_the_database_stops_answering() {
    let cache = TempDir::new().unwrap();
    let config = bootstrapped(&cache);
    let maintainer = Arc::new(RecordingMaintainer::default());
    let lifecycle = IndexLifecycleManager::new(maintainer.clone());
    commands::rebuild(&lifecycle, &config.index_config_path())
        .await
        .unwrap();

    maintainer.probe_down.store(true, Ordering::SeqCst);
    assert!(!lifecycle.verify().await);
}

#[tokio::test]
async fn rebuild_needs_a_bootstrapped_config() {
    let cache = TempDir::new().unwrap();
    let config = server_config(&cache);
    let lifecycle = IndexLifecycleManager::new(Arc::new(RecordingMaintainer::default()));

    let err = commands::rebuild(&lifecycle, &config.index_config_path())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("reading index configuration"));
    assert_eq!(lifecycle.state(), LifecycleState::Unconfigured);
}
