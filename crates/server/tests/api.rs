//! Router-level tests for the HTTP API
//!
//! The router runs in-process against a fake toolkit and a fake index
//! maintainer, so these tests exercise request parsing, status codes and
//! response shapes without a chemistry sidecar.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::Notify;
use tower::ServiceExt;

use index::{
    DependencyConfigBuilder, IndexBuildConfig, IndexError, IndexLifecycleManager,
    IndexMaintainer, LifecycleState, LocalSources, StageContext, StageOutcome,
};
use matcher::{
    ChemToolkit, DescriptorMatches, DescriptorType, FormulaRange, LabelOptions, MatchResult,
    MolFileFormat, MoleculeIdentifierType, MoleculeRef, SearchStrategy, ToolkitError,
};
use server::{build_router, ServerConfig, ServerState};

const ADMIN_KEY: &str = "test-admin-key";

#[derive(Default)]
struct FakeToolkit {
    calls: AtomicUsize,
    last_match_type: Mutex<Option<SearchStrategy>>,
    last_range: Mutex<Option<FormulaRange>>,
    last_format: Mutex<Option<MolFileFormat>>,
}

fn hit(id: &str, score: Option<f64>) -> MatchResult {
    let mut result = MatchResult::new(id);
    result.fp_score = score;
    result
}

#[async_trait]
impl ChemToolkit for FakeToolkit {
    async fn match_by_descriptor(
        &self,
        _descriptor: &str,
        _descriptor_type: DescriptorType,
        match_type: SearchStrategy,
    ) -> Result<DescriptorMatches, ToolkitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_match_type.lock().unwrap() = Some(match_type);
        Ok(DescriptorMatches {
            graph: vec![hit("ATP", None), hit("ATP|2", None), hit("ADP", None)],
            fingerprint: vec![hit("ADP", Some(0.71)), hit("ATP", Some(0.93))],
        })
    }

    async fn match_by_formula(
        &self,
        _formula: &str,
        _match_subset: bool,
    ) -> Result<Vec<MatchResult>, ToolkitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![hit("TYL", None), hit("TYL|x", None)])
    }

    async fn match_by_formula_range(
        &self,
        ranges: &FormulaRange,
        _match_subset: bool,
    ) -> Result<Vec<MatchResult>, ToolkitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_range.lock().unwrap() = Some(ranges.clone());
        Ok(vec![hit("GLY", None)])
    }

    async fn to_mol_file(
        &self,
        identifier: &str,
        _identifier_type: MoleculeIdentifierType,
        format: MolFileFormat,
    ) -> Result<Vec<u8>, ToolkitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_format.lock().unwrap() = Some(format);
        Ok(format!("{identifier}\n  molfile\n").into_bytes())
    }

    async fn depict_molecule(
        &self,
        _identifier: &str,
        _identifier_type: MoleculeIdentifierType,
        _labels: LabelOptions,
    ) -> Result<Vec<u8>, ToolkitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(b"<svg/>".to_vec())
    }

    async fn align_molecule_pair(
        &self,
        _reference: &MoleculeRef,
        _fit: &MoleculeRef,
        _labels: LabelOptions,
    ) -> Result<Vec<u8>, ToolkitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(b"<svg id=\"pair\"/>".to_vec())
    }

    async fn status(&self) -> Result<Value, ToolkitError> {
        Ok(json!({ "toolkit": "fake" }))
    }
}

/// Maintainer whose stages succeed, optionally waiting on a gate first.
#[derive(Default)]
struct FakeMaintainer {
    gate: Option<Arc<Notify>>,
}

impl FakeMaintainer {
    fn stage(ctx: StageContext<'_>) -> Result<StageOutcome, IndexError> {
        std::fs::write(ctx.output_dir.join(format!("{}.done", ctx.stage)), b"")?;
        Ok(StageOutcome::with_items(3))
    }
}

#[async_trait]
impl IndexMaintainer for FakeMaintainer {
    async fn update_chem_comp_index(
        &self,
        ctx: StageContext<'_>,
        _sources: Option<&LocalSources>,
    ) -> Result<StageOutcome, IndexError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Self::stage(ctx)
    }

    async fn update_search_index(
        &self,
        ctx: StageContext<'_>,
    ) -> Result<StageOutcome, IndexError> {
        Self::stage(ctx)
    }

    async fn update_search_molecule_provider(
        &self,
        ctx: StageContext<'_>,
    ) -> Result<StageOutcome, IndexError> {
        Self::stage(ctx)
    }

    async fn reload_search_database(
        &self,
        _config: &IndexBuildConfig,
        _index_root: &Path,
    ) -> Result<StageOutcome, IndexError> {
        Ok(StageOutcome::default())
    }

    async fn probe_search_database(
        &self,
        _config: &IndexBuildConfig,
        _index_root: &Path,
    ) -> Result<bool, IndexError> {
        Ok(true)
    }
}

struct Harness {
    _cache: TempDir,
    state: Arc<ServerState>,
    toolkit: Arc<FakeToolkit>,
    app: Router,
}

impl Harness {
    fn new(maintainer: FakeMaintainer, configured: bool) -> Self {
        let cache = TempDir::new().unwrap();
        let mut config = ServerConfig {
            cache_path: cache.path().to_path_buf(),
            rate_limit_per_minute: 1000,
            ..ServerConfig::default()
        };
        config.api_keys.insert(ADMIN_KEY.to_string());

        let lifecycle = Arc::new(IndexLifecycleManager::new(Arc::new(maintainer)));
        if configured {
            let build = DependencyConfigBuilder::new(cache.path(), "cc-full")
                .build()
                .unwrap();
            lifecycle.configure(build).unwrap();
        }

        let toolkit = Arc::new(FakeToolkit::default());
        let state = Arc::new(ServerState::new(config, toolkit.clone(), lifecycle));
        let app = build_router(state.clone());
        Self {
            _cache: cache,
            state,
            toolkit,
            app,
        }
    }

    /// Configured and serving a freshly built index.
    async fn ready() -> Self {
        let harness = Self::new(FakeMaintainer::default(), true);
        assert_eq!(
            harness.state.lifecycle.rebuild().await.unwrap(),
            LifecycleState::Ready
        );
        harness
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, String, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, body.to_vec())
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let (status, _, body) = self
            .send(Request::get(uri).body(Body::empty()).unwrap())
            .await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, _, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn admin(&self, method: &str, uri: &str, key: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header("x-api-key", key);
        }
        let (status, _, body) = self.send(builder.body(Body::empty()).unwrap()).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn wait_for(&self, state: LifecycleState) {
        for _ in 0..200 {
            if self.state.lifecycle.state() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "lifecycle never reached {state:?}, stuck at {:?}",
            self.state.lifecycle.state()
        );
    }
}

#[tokio::test]
async fn status_routes_answer_without_an_index() {
    let harness = Harness::new(FakeMaintainer::default(), false);

    let (status, body) = harness.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "msg": "Service is up!" }));

    let (status, body) = harness.get("/healthcheck").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("UP"));

    let (status, body) = harness.get("/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "Service is up!");
    assert_eq!(body["index"]["state"], "unconfigured");
    assert_eq!(body["toolkit"]["toolkit"], "fake");

    let (status, body) = harness.get("/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "not-ready");
}

#[tokio::test]
async fn ready_reports_the_served_snapshot() {
    let harness = Harness::ready().await;
    let (status, body) = harness.get("/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["snapshot"]["fileNamePrefix"], "cc-full");
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let harness = Harness::new(FakeMaintainer::default(), false);
    let request = Request::get("/hc")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = harness.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");
}

#[tokio::test]
async fn descriptor_get_returns_ranked_ids_and_scores() {
    let harness = Harness::ready().await;
    let (status, body) = harness
        .get("/chem-match-v1/SMILES?query=CCO&matchType=fingerprint-similarity")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "CCO");
    assert_eq!(body["descriptorType"], "SMILES");
    assert_eq!(body["matchedIdList"], json!(["ATP", "ADP"]));
    assert_eq!(body["matchedScoreList"], json!([0.93, 0.71]));
    assert_eq!(
        *harness.toolkit.last_match_type.lock().unwrap(),
        Some(SearchStrategy::FingerprintSimilarity)
    );
}

#[tokio::test]
async fn descriptor_post_defaults_to_relaxed_graph_match() {
    let harness = Harness::ready().await;
    let (status, body) = harness
        .post_json("/chem-match-v1/SMILES", json!({ "query": "c1ccccc1" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matchedIdList"], json!(["ATP", "ADP"]));
    assert_eq!(body["matchedScoreList"], json!([1.0, 1.0]));
    assert_eq!(
        *harness.toolkit.last_match_type.lock().unwrap(),
        Some(SearchStrategy::GraphRelaxed)
    );
}

#[tokio::test]
async fn identifier_only_ranking_omits_scores() {
    let harness = Harness::ready().await;
    let (status, body) = harness
        .get("/chem-match-v1/SMILES?query=CCO&rankingMode=identifier-only")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("matchedScoreList").is_none());
}

#[tokio::test]
async fn unknown_descriptor_type_is_a_bad_request() {
    let harness = Harness::ready().await;
    let (status, body) = harness.get("/chem-match-v1/CML?query=CCO").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(harness.toolkit.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_match_type_is_a_bad_request() {
    let harness = Harness::ready().await;
    let (status, body) = harness
        .get("/chem-match-v1/SMILES?query=CCO&matchType=fuzzy")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn searches_wait_for_an_index() {
    let harness = Harness::new(FakeMaintainer::default(), true);
    let (status, body) = harness.get("/chem-match-v1/SMILES?query=CCO").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "NOT_READY");
    assert_eq!(harness.toolkit.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn formula_search_lists_ids_only() {
    let harness = Harness::ready().await;
    let (status, body) = harness
        .get("/chem-match-v1/formula?query=C9H11NO3&matchSubset=false")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "C9H11NO3");
    assert_eq!(body["matchedIdList"], json!(["TYL"]));
    assert!(body.get("matchedScoreList").is_none());

    let (status, _) = harness
        .post_json("/chem-match-v1/formula", json!({ "query": "C9H11N%O3" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn formula_range_accepts_body_and_query_string() {
    let harness = Harness::ready().await;
    let (status, body) = harness
        .post_json(
            "/chem-match-v1/formula/range",
            json!({ "query": { "C": { "min": 2, "max": 4 }, "N": { "max": 1 } } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matchedIdList"], json!(["GLY"]));
    assert_eq!(body["query"]["C"]["min"], 2);
    let ranges = harness.toolkit.last_range.lock().unwrap().clone().unwrap();
    assert_eq!(ranges["N"].max, Some(1));

    let (status, body) = harness
        .get("/chem-match-v1/formula/range?query=%7B%22O%22%3A%7B%22min%22%3A1%7D%7D")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"]["O"]["min"], 1);

    let (status, body) = harness
        .get("/chem-match-v1/formula/range?query=not-json")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn depiction_is_served_as_svg_without_an_index() {
    let harness = Harness::new(FakeMaintainer::default(), false);
    let (status, content_type, body) = harness
        .send(
            Request::get("/chem-depict-v1/molecule/IdentifierPDB?target=ATP&displayStyle=unlabeled")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "image/svg+xml");
    assert_eq!(body, b"<svg/>");

    let (status, _) = harness
        .get("/chem-depict-v1/molecule/IdentifierPDB?target=ATP&displayStyle=bold")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn align_pair_requires_both_identifier_types() {
    let harness = Harness::new(FakeMaintainer::default(), false);
    let (status, content_type, _) = harness
        .send(
            Request::get(
                "/chem-depict-v1/alignpair?referenceIdentifier=ATP&referenceIdentifierType=IdentifierPDB\
                 &fitIdentifier=ADP&fitIdentifierType=IdentifierPDB",
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "image/svg+xml");

    let (status, _) = harness
        .get("/chem-depict-v1/alignpair?referenceIdentifier=ATP&fitIdentifier=ADP")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn conversion_uses_the_format_mime_type() {
    let harness = Harness::new(FakeMaintainer::default(), false);
    let (status, content_type, body) = harness
        .send(
            Request::post("/chem-convert-v1/to-molfile/IdentifierPDB")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "target": "ATP", "fmt": "SDF" }).to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "chemical/x-mdl-sdfile");
    assert!(body.starts_with(b"ATP"));
    assert_eq!(
        *harness.toolkit.last_format.lock().unwrap(),
        Some(MolFileFormat::Sdf)
    );

    let (status, content_type, _) = harness
        .send(
            Request::get("/chem-convert-v1/to-molfile/IdentifierPDB?target=ATP")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "chemical/x-mdl-molfile");
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let harness = Harness::new(FakeMaintainer::default(), false);
    let (status, body) = harness.get("/chem-match-v2/SMILES").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn admin_routes_require_a_valid_key() {
    let harness = Harness::new(FakeMaintainer::default(), true);

    let (status, body) = harness.admin("GET", "/admin/index", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH_FAILED");

    let (status, _) = harness.admin("GET", "/admin/index", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = harness.admin("GET", "/admin/index", Some(ADMIN_KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "configured");
    assert_eq!(body["fileNamePrefix"], "cc-full");
}

#[tokio::test]
async fn admin_rebuild_runs_in_the_background() {
    let harness = Harness::new(FakeMaintainer::default(), true);

    let (status, body) = harness.admin("POST", "/admin/rebuild", Some(ADMIN_KEY)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["operation"], "rebuild");

    harness.wait_for(LifecycleState::Ready).await;
    let (status, body) = harness.admin("POST", "/admin/verify", Some(ADMIN_KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], true);
    assert_eq!(body["state"], "ready");
}

#[tokio::test]
async fn admin_rebuild_is_single_flight() {
    let gate = Arc::new(Notify::new());
    let harness = Harness::new(
        FakeMaintainer {
            gate: Some(gate.clone()),
        },
        true,
    );

    // The second request arrives before the spawned rebuild has been polled.
    let (first, _) = harness.admin("POST", "/admin/rebuild", Some(ADMIN_KEY)).await;
    let (second, body) = harness.admin("POST", "/admin/rebuild", Some(ADMIN_KEY)).await;
    assert_eq!(first, StatusCode::ACCEPTED);
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "BUSY");
    assert_eq!(harness.state.lifecycle.state(), LifecycleState::Building);

    gate.notify_one();
    harness.wait_for(LifecycleState::Ready).await;

    let (status, _) = harness.admin("POST", "/admin/rebuild", Some(ADMIN_KEY)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    gate.notify_one();
    harness.wait_for(LifecycleState::Ready).await;
}

#[tokio::test]
async fn admin_operations_need_configuration() {
    let harness = Harness::new(FakeMaintainer::default(), false);

    let (status, body) = harness.admin("POST", "/admin/rebuild", Some(ADMIN_KEY)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "CONFIGURATION_ERROR");

    let (status, body) = harness.admin("POST", "/admin/restore", Some(ADMIN_KEY)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn admin_is_disabled_without_configured_keys() {
    let lifecycle = Arc::new(IndexLifecycleManager::new(Arc::new(FakeMaintainer::default())));
    let state = Arc::new(ServerState::new(
        ServerConfig::default(),
        Arc::new(FakeToolkit::default()),
        lifecycle,
    ));
    let request = Request::get("/admin/index")
        .header("x-api-key", "anything")
        .body(Body::empty())
        .unwrap();
    let response = build_router(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
