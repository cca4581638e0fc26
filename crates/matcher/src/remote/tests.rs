use super::*;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use index::DependencyConfigBuilder;
use serde_json::{json, Value};

type Seen = Arc<Mutex<Vec<(String, Value)>>>;

async fn spawn_sidecar(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn record(seen: &Seen, path: &str, body: Value) {
    seen.lock().unwrap().push((path.to_string(), body));
}

async fn descriptor(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
    record(&seen, "match/descriptor", body);
    Json(json!({
        "graph": [{"ccId": "004", "searchType": "graph-relaxed"}],
        "fingerprint": [
            {"ccId": "010|2", "fpType": "TREE", "fpScore": 0.91},
            {"ccId": "020", "fpType": "MACCS", "fpScore": 0.88}
        ]
    }))
}

async fn depict(State(seen): State<Seen>, Json(body): Json<Value>) -> impl IntoResponse {
    record(&seen, "depict/molecule", body);
    ([("content-type", "image/svg+xml")], "<svg/>")
}

async fn stage(
    State(seen): State<Seen>,
    UrlPath(stage): UrlPath<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    record(&seen, &format!("index/{stage}"), body);
    Json(json!({"items": 42, "detail": null}))
}

async fn probe(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
    record(&seen, "index/probe", body);
    Json(json!({"ok": true}))
}

async fn restore(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
    record(&seen, "index/restore", body);
    Json(json!({"items": null, "detail": "restored"}))
}

fn sidecar(seen: Seen) -> Router {
    Router::new()
        .route("/match/descriptor", post(descriptor))
        .route(
            "/match/formula",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "formula parse failed"})),
                )
            }),
        )
        .route(
            "/match/formula-range",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "toolkit license expired") }),
        )
        .route("/convert/molfile", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route("/depict/molecule", post(depict))
        .route("/status", get(|| async { "not json" }))
        .route("/index/probe", post(probe))
        .route("/index/restore", post(restore))
        .route(
            "/index/reload",
            post(|| async { (StatusCode::BAD_GATEWAY, "database offline") }),
        )
        .route("/index/{stage}", post(stage))
        .with_state(seen)
}

async fn toolkit() -> (RemoteToolkit, Seen) {
    let seen = Seen::default();
    let base = spawn_sidecar(sidecar(seen.clone())).await;
    (RemoteToolkit::new(format!("{base}/")).unwrap(), seen)
}

fn full_config() -> IndexBuildConfig {
    DependencyConfigBuilder::new("/var/cache/chem-search", "cc-full")
        .build()
        .unwrap()
}

#[test]
fn base_url_is_normalized() {
    let toolkit = RemoteToolkit::with_client(reqwest::Client::new(), "http://toolkit:8100//");
    assert_eq!(toolkit.base_url(), "http://toolkit:8100");
    assert_eq!(toolkit.url("/status"), "http://toolkit:8100/status");
}

#[tokio::test]
async fn descriptor_match_sends_request_and_decodes_streams() {
    let (toolkit, seen) = toolkit().await;

    let matches = toolkit
        .match_by_descriptor("CCO", DescriptorType::Smiles, SearchStrategy::GraphStrict)
        .await
        .unwrap();

    assert_eq!(matches.graph.len(), 1);
    assert_eq!(matches.fingerprint[0].canonical_id(), "010");
    assert_eq!(matches.fingerprint[1].fp_score, Some(0.88));

    let seen = seen.lock().unwrap();
    assert_eq!(
        seen[0].1,
        json!({"descriptor": "CCO", "descriptorType": "SMILES", "matchType": "graph-strict"})
    );
}

#[tokio::test]
async fn client_errors_are_rejections_with_reason() {
    let (toolkit, _) = toolkit().await;
    let err = toolkit.match_by_formula("C9", false).await.unwrap_err();
    assert!(matches!(err, ToolkitError::Rejected(reason) if reason == "formula parse failed"));
}

#[tokio::test]
async fn server_errors_are_unavailable() {
    let (toolkit, _) = toolkit().await;

    let err = toolkit
        .match_by_formula_range(&FormulaRange::new(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, ToolkitError::Unavailable(reason) if reason == "toolkit license expired"));

    let err = toolkit
        .to_mol_file("ATP", MoleculeIdentifierType::IdentifierPdb, MolFileFormat::Sdf)
        .await
        .unwrap_err();
    assert!(matches!(err, ToolkitError::Unavailable(reason) if reason.contains("500")));
}

#[tokio::test]
async fn undecodable_body_is_protocol_error() {
    let (toolkit, _) = toolkit().await;
    let err = toolkit.status().await.unwrap_err();
    assert!(matches!(err, ToolkitError::Protocol(_)));
}

#[tokio::test]
async fn unreachable_sidecar_is_unavailable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let toolkit = RemoteToolkit::with_timeout(format!("http://{addr}"), Duration::from_secs(2)).unwrap();
    let err = toolkit
        .match_by_descriptor("CCO", DescriptorType::Smiles, SearchStrategy::GraphRelaxed)
        .await
        .unwrap_err();
    assert!(matches!(err, ToolkitError::Unavailable(_)));
}

#[tokio::test]
async fn depiction_flattens_label_switches() {
    let (toolkit, seen) = toolkit().await;

    let svg = toolkit
        .depict_molecule(
            "ATP",
            MoleculeIdentifierType::IdentifierPdb,
            crate::types::DisplayStyle::Unlabeled.labels(),
        )
        .await
        .unwrap();
    assert_eq!(svg, b"<svg/>");

    let body = &seen.lock().unwrap()[0].1;
    assert_eq!(body["identifierType"], "IdentifierPDB");
    assert_eq!(body["labelAtomName"], false);
    assert_eq!(body["labelBondCIPStereo"], false);
}

#[tokio::test]
async fn stages_post_to_their_endpoint() {
    let (toolkit, seen) = toolkit().await;
    let config = full_config();
    let output = PathBuf::from("/var/cache/chem-search/staging/cc-full/chem-comp");
    let sources = LocalSources {
        chem_comp: PathBuf::from("/data/components.cif"),
        bird: PathBuf::from("/data/prd.cif"),
    };
    let ctx = StageContext {
        config: &config,
        stage: RebuildStage::ChemCompIndex,
        input_dir: None,
        output_dir: &output,
    };

    let outcome = toolkit
        .update_chem_comp_index(ctx, Some(&sources))
        .await
        .unwrap();
    assert_eq!(outcome, StageOutcome::with_items(42));

    let input = output.clone();
    let next = StageContext {
        stage: RebuildStage::SearchIndex,
        input_dir: Some(&input),
        ..ctx
    };
    toolkit.update_search_index(next).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].0, "index/chem-comp-index");
    assert_eq!(seen[0].1["sources"]["chemComp"], "/data/components.cif");
    assert_eq!(seen[0].1["config"]["ccsiKwargs"]["ccFileNamePrefix"], "cc-full");
    assert_eq!(seen[1].0, "index/search-index");
    assert!(seen[1].1.get("sources").is_none());
}

#[tokio::test]
async fn database_failures_name_the_operation() {
    let (toolkit, _) = toolkit().await;
    let config = full_config();

    let err = toolkit
        .reload_search_database(&config, Path::new("/var/cache/chem-search/index/cc-full"))
        .await
        .unwrap_err();
    match err {
        IndexError::Upstream(reason) => {
            assert!(reason.starts_with("reload-database"));
            assert!(reason.contains("database offline"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn probe_and_restore_round_trip() {
    let (toolkit, seen) = toolkit().await;
    let config = full_config();
    let root = Path::new("/var/cache/chem-search/index/cc-full");

    assert!(toolkit.probe_search_database(&config, root).await.unwrap());
    let outcome = toolkit
        .restore_bundle("https://bundles.example.org/deps/stable", &config, root)
        .await
        .unwrap();
    assert_eq!(outcome.detail.as_deref(), Some("restored"));

    let seen = seen.lock().unwrap();
    assert!(seen[0].1.get("url").is_none());
    assert_eq!(seen[1].1["url"], "https://bundles.example.org/deps/stable");
    assert_eq!(seen[1].1["indexRoot"], "/var/cache/chem-search/index/cc-full");
}
