use crate::error::ServerResult;
use crate::state::ServerState;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use matcher::{DisplayStyle, MoleculeIdentifierType, MoleculeRef};
use serde::Deserialize;
use std::sync::Arc;

const SVG: &str = "image/svg+xml";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepictQuery {
    /// SMILES, InChI or chemical component / BIRD identifier
    #[serde(default)]
    pub target: String,

    /// `labeled` (default) or `unlabeled`
    #[serde(default)]
    pub display_style: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignPairQuery {
    #[serde(default)]
    pub reference_identifier: String,
    pub reference_identifier_type: String,
    #[serde(default)]
    pub fit_identifier: String,
    pub fit_identifier_type: String,
    #[serde(default)]
    pub display_style: Option<String>,
}

fn display_style(raw: Option<&str>) -> ServerResult<Option<DisplayStyle>> {
    Ok(raw
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().parse::<DisplayStyle>())
        .transpose()?)
}

fn svg(body: Vec<u8>) -> Response {
    ([(CONTENT_TYPE, SVG)], body).into_response()
}

/// `GET /chem-depict-v1/molecule/{identifierType}`
pub async fn molecule_get(
    State(state): State<Arc<ServerState>>,
    path: Result<Path<String>, PathRejection>,
    params: Result<Query<DepictQuery>, QueryRejection>,
) -> ServerResult<Response> {
    let Path(identifier_type) = path?;
    let Query(params) = params?;
    depict(&state, &identifier_type, params).await
}

/// `POST /chem-depict-v1/molecule/{identifierType}`
pub async fn molecule_post(
    State(state): State<Arc<ServerState>>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Json<DepictQuery>, JsonRejection>,
) -> ServerResult<Response> {
    let Path(identifier_type) = path?;
    let Json(params) = body?;
    depict(&state, &identifier_type, params).await
}

async fn depict(
    state: &ServerState,
    identifier_type: &str,
    params: DepictQuery,
) -> ServerResult<Response> {
    let identifier_type: MoleculeIdentifierType = identifier_type.parse()?;
    let style = display_style(params.display_style.as_deref())?;
    let image = state
        .dispatcher
        .depict(&params.target, identifier_type, style)
        .await?;
    Ok(svg(image))
}

/// `GET /chem-depict-v1/alignpair`
pub async fn align_pair_get(
    State(state): State<Arc<ServerState>>,
    params: Result<Query<AlignPairQuery>, QueryRejection>,
) -> ServerResult<Response> {
    let Query(params) = params?;
    let reference = MoleculeRef::new(
        params.reference_identifier,
        params.reference_identifier_type.parse()?,
    );
    let fit = MoleculeRef::new(params.fit_identifier, params.fit_identifier_type.parse()?);
    let style = display_style(params.display_style.as_deref())?;

    let image = state.dispatcher.align_pair(&reference, &fit, style).await?;
    Ok(svg(image))
}
