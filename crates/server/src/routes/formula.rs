use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use matcher::{FormulaRange, MatchOptions, RankedAnswer, RankingMode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaQuery {
    /// Molecular formula, e.g. `C8H9NO2`
    #[serde(default)]
    pub query: String,

    /// Accept formulas that satisfy only a subset of the query conditions
    #[serde(default)]
    pub match_subset: bool,

    #[serde(default)]
    pub ranking_mode: Option<RankingMode>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaQueryResult {
    pub query: String,
    pub matched_id_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_score_list: Option<Vec<f64>>,
}

/// JSON body of the range search.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaRangeQuery {
    /// Element symbol to `{min, max}` bounds
    #[serde(default)]
    pub query: FormulaRange,

    #[serde(default)]
    pub match_subset: bool,

    #[serde(default)]
    pub ranking_mode: Option<RankingMode>,
}

/// Query-string form of the range search; `query` holds the range map as JSON.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaRangeParams {
    #[serde(default)]
    pub query: Option<String>,

    #[serde(default)]
    pub match_subset: bool,

    #[serde(default)]
    pub ranking_mode: Option<RankingMode>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaRangeQueryResult {
    pub query: FormulaRange,
    pub matched_id_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_score_list: Option<Vec<f64>>,
}

fn options(ranking_mode: Option<RankingMode>) -> MatchOptions {
    MatchOptions {
        match_type: None,
        ranking_mode,
    }
}

fn id_lists(answer: &RankedAnswer) -> (Vec<String>, Option<Vec<f64>>) {
    (answer.ids(), answer.score_list())
}

/// `GET /chem-match-v1/formula`
pub async fn formula_get(
    State(state): State<Arc<ServerState>>,
    params: Result<Query<FormulaQuery>, QueryRejection>,
) -> ServerResult<Json<FormulaQueryResult>> {
    let Query(params) = params?;
    run_formula(&state, params).await
}

/// `POST /chem-match-v1/formula`
pub async fn formula_post(
    State(state): State<Arc<ServerState>>,
    body: Result<Json<FormulaQuery>, JsonRejection>,
) -> ServerResult<Json<FormulaQueryResult>> {
    let Json(params) = body?;
    run_formula(&state, params).await
}

async fn run_formula(
    state: &ServerState,
    params: FormulaQuery,
) -> ServerResult<Json<FormulaQueryResult>> {
    let query = matcher::Query::Formula {
        formula: params.query.clone(),
        match_subset: params.match_subset,
    };
    let answer = state
        .dispatcher
        .dispatch(&query, &options(params.ranking_mode))
        .await?;
    let (matched_id_list, matched_score_list) = id_lists(&answer);
    Ok(Json(FormulaQueryResult {
        query: params.query,
        matched_id_list,
        matched_score_list,
    }))
}

/// `GET /chem-match-v1/formula/range`
pub async fn range_get(
    State(state): State<Arc<ServerState>>,
    params: Result<Query<FormulaRangeParams>, QueryRejection>,
) -> ServerResult<Json<FormulaRangeQueryResult>> {
    let Query(params) = params?;
    let ranges: FormulaRange = match params.query.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => serde_json::from_str(raw).map_err(|e| {
            ServerError::BadRequest(format!("query must be a JSON element range map: {e}"))
        })?,
        _ => FormulaRange::new(),
    };
    run_range(
        &state,
        FormulaRangeQuery {
            query: ranges,
            match_subset: params.match_subset,
            ranking_mode: params.ranking_mode,
        },
    )
    .await
}

/// `POST /chem-match-v1/formula/range`
pub async fn range_post(
    State(state): State<Arc<ServerState>>,
    body: Result<Json<FormulaRangeQuery>, JsonRejection>,
) -> ServerResult<Json<FormulaRangeQueryResult>> {
    let Json(params) = body?;
    run_range(&state, params).await
}

async fn run_range(
    state: &ServerState,
    params: FormulaRangeQuery,
) -> ServerResult<Json<FormulaRangeQueryResult>> {
    let query = matcher::Query::FormulaRange {
        ranges: params.query.clone(),
        match_subset: params.match_subset,
    };
    let answer = state
        .dispatcher
        .dispatch(&query, &options(params.ranking_mode))
        .await?;
    let (matched_id_list, matched_score_list) = id_lists(&answer);
    Ok(Json(FormulaRangeQueryResult {
        query: params.query,
        matched_id_list,
        matched_score_list,
    }))
}
