use crate::error::ServerResult;
use crate::state::ServerState;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use matcher::{MolFileFormat, MoleculeIdentifierType};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertQuery {
    /// SMILES, InChI or chemical component / BIRD identifier
    #[serde(default)]
    pub target: String,

    /// `mol` (default), `sdf`, `mol2` or `mol2h`
    #[serde(default)]
    pub fmt: Option<String>,
}

/// `GET /chem-convert-v1/to-molfile/{identifierType}`
pub async fn to_molfile_get(
    State(state): State<Arc<ServerState>>,
    path: Result<Path<String>, PathRejection>,
    params: Result<Query<ConvertQuery>, QueryRejection>,
) -> ServerResult<Response> {
    let Path(identifier_type) = path?;
    let Query(params) = params?;
    convert(&state, &identifier_type, params).await
}

/// `POST /chem-convert-v1/to-molfile/{identifierType}`
pub async fn to_molfile_post(
    State(state): State<Arc<ServerState>>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Json<ConvertQuery>, JsonRejection>,
) -> ServerResult<Response> {
    let Path(identifier_type) = path?;
    let Json(params) = body?;
    convert(&state, &identifier_type, params).await
}

async fn convert(
    state: &ServerState,
    identifier_type: &str,
    params: ConvertQuery,
) -> ServerResult<Response> {
    let identifier_type: MoleculeIdentifierType = identifier_type.parse()?;
    let format: Option<MolFileFormat> = params
        .fmt
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<MolFileFormat>)
        .transpose()?;

    let file = state
        .dispatcher
        .to_mol_file(&params.target, identifier_type, format)
        .await?;
    Ok(([(CONTENT_TYPE, file.mime_type())], file.content).into_response())
}
