use crate::error::ServerResult;
use crate::state::ServerState;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use matcher::{DescriptorType, MatchOptions, RankingMode, SearchStrategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Descriptor search parameters, from the query string or a JSON body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorQuery {
    /// SMILES or InChI descriptor
    #[serde(default)]
    pub query: String,

    /// Comparison criteria, `graph-relaxed` when unset
    #[serde(default)]
    pub match_type: Option<SearchStrategy>,

    #[serde(default)]
    pub ranking_mode: Option<RankingMode>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorQueryResult {
    pub query: String,
    pub descriptor_type: DescriptorType,
    pub matched_id_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_score_list: Option<Vec<f64>>,
}

/// `GET /chem-match-v1/{descriptorType}`
pub async fn match_get(
    State(state): State<Arc<ServerState>>,
    path: Result<Path<String>, PathRejection>,
    params: Result<Query<DescriptorQuery>, QueryRejection>,
) -> ServerResult<Json<DescriptorQueryResult>> {
    let Path(descriptor_type) = path?;
    let Query(params) = params?;
    run(&state, &descriptor_type, params).await
}

/// `POST /chem-match-v1/{descriptorType}`
pub async fn match_post(
    State(state): State<Arc<ServerState>>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Json<DescriptorQuery>, JsonRejection>,
) -> ServerResult<Json<DescriptorQueryResult>> {
    let Path(descriptor_type) = path?;
    let Json(params) = body?;
    run(&state, &descriptor_type, params).await
}

async fn run(
    state: &ServerState,
    descriptor_type: &str,
    params: DescriptorQuery,
) -> ServerResult<Json<DescriptorQueryResult>> {
    let descriptor_type: DescriptorType = descriptor_type.parse()?;
    let options = MatchOptions {
        match_type: params.match_type,
        ranking_mode: params.ranking_mode,
    };
    let query = matcher::Query::Descriptor {
        descriptor: params.query.clone(),
        descriptor_type,
    };

    let answer = state.dispatcher.dispatch(&query, &options).await?;
    Ok(Json(DescriptorQueryResult {
        query: params.query,
        descriptor_type,
        matched_id_list: answer.ids(),
        matched_score_list: answer.score_list(),
    }))
}
