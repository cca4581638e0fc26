//! HTTP client for a chemistry toolkit running as a sidecar process.
//!
//! The sidecar exposes the toolkit's search, depiction, conversion and
//! index-maintenance operations as JSON endpoints. One [`RemoteToolkit`]
//! serves both the query routes (as a [`ChemToolkit`]) and the index
//! lifecycle (as an [`IndexMaintainer`]).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use index::{
    IndexBuildConfig, IndexError, IndexMaintainer, LocalSources, RebuildStage, StageContext,
    StageOutcome,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::toolkit::{ChemToolkit, DescriptorMatches, ToolkitError};
use crate::types::{
    DescriptorType, FormulaRange, LabelOptions, MatchResult, MolFileFormat,
    MoleculeIdentifierType, MoleculeRef, SearchStrategy,
};

#[cfg(test)]
mod tests;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// [`ChemToolkit`] and [`IndexMaintainer`] backed by the toolkit sidecar.
#[derive(Debug, Clone)]
pub struct RemoteToolkit {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteToolkit {
    /// Client for the sidecar at `base_url` with the default request timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ToolkitError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ToolkitError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolkitError::Unavailable(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ToolkitError> {
        let url = self.url(path);
        tracing::debug!(%url, "toolkit request");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ToolkitError::Unavailable(format!("{url}: {e}")))?;
        check_status(response).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ToolkitError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(path, body)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ToolkitError::Protocol(format!("{path}: {e}")))
    }

    async fn post_bytes<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Vec<u8>, ToolkitError> {
        let bytes = self
            .send(path, body)
            .await?
            .bytes()
            .await
            .map_err(|e| ToolkitError::Protocol(format!("{path}: {e}")))?;
        Ok(bytes.to_vec())
    }
}

/// 4xx means the toolkit refused the request; anything else non-2xx means it
/// could not serve it.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ToolkitError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let reason = error_reason(&body).unwrap_or_else(|| format!("HTTP {status}"));
    if status.is_client_error() {
        Err(ToolkitError::Rejected(reason))
    } else {
        Err(ToolkitError::Unavailable(reason))
    }
}

/// Prefer the sidecar's `{"error": "..."}` message over the raw body.
fn error_reason(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => Some(parsed.error),
        Err(_) => Some(body.chars().take(512).collect()),
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

fn index_error(stage: &str) -> impl FnOnce(ToolkitError) -> IndexError + '_ {
    move |err| IndexError::Upstream(format!("{stage}: {err}"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DescriptorRequest<'a> {
    descriptor: &'a str,
    descriptor_type: DescriptorType,
    match_type: SearchStrategy,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FormulaRequest<'a> {
    formula: &'a str,
    match_subset: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FormulaRangeRequest<'a> {
    formula_range: &'a FormulaRange,
    match_subset: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConvertRequest<'a> {
    identifier: &'a str,
    identifier_type: MoleculeIdentifierType,
    format: MolFileFormat,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DepictRequest<'a> {
    identifier: &'a str,
    identifier_type: MoleculeIdentifierType,
    #[serde(flatten)]
    labels: LabelOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AlignRequest<'a> {
    reference: &'a MoleculeRef,
    fit: &'a MoleculeRef,
    #[serde(flatten)]
    labels: LabelOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StageRequest<'a> {
    config: &'a IndexBuildConfig,
    input_dir: Option<&'a Path>,
    output_dir: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    sources: Option<SourcesBody<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SourcesBody<'a> {
    chem_comp: &'a Path,
    bird: &'a Path,
}

impl<'a> StageRequest<'a> {
    fn new(ctx: &StageContext<'a>, sources: Option<&'a LocalSources>) -> Self {
        Self {
            config: ctx.config,
            input_dir: ctx.input_dir,
            output_dir: ctx.output_dir,
            sources: sources.map(|s| SourcesBody {
                chem_comp: &s.chem_comp,
                bird: &s.bird,
            }),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DatabaseRequest<'a> {
    config: &'a IndexBuildConfig,
    index_root: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
}

#[derive(Deserialize)]
struct ProbeResponse {
    ok: bool,
}

#[async_trait]
impl ChemToolkit for RemoteToolkit {
    async fn match_by_descriptor(
        &self,
        descriptor: &str,
        descriptor_type: DescriptorType,
        match_type: SearchStrategy,
    ) -> Result<DescriptorMatches, ToolkitError> {
        self.post_json(
            "match/descriptor",
            &DescriptorRequest {
                descriptor,
                descriptor_type,
                match_type,
            },
        )
        .await
    }

    async fn match_by_formula(
        &self,
        formula: &str,
        match_subset: bool,
    ) -> Result<Vec<MatchResult>, ToolkitError> {
        self.post_json(
            "match/formula",
            &FormulaRequest {
                formula,
                match_subset,
            },
        )
        .await
    }

    async fn match_by_formula_range(
        &self,
        ranges: &FormulaRange,
        match_subset: bool,
    ) -> Result<Vec<MatchResult>, ToolkitError> {
        self.post_json(
            "match/formula-range",
            &FormulaRangeRequest {
                formula_range: ranges,
                match_subset,
            },
        )
        .await
    }

    async fn to_mol_file(
        &self,
        identifier: &str,
        identifier_type: MoleculeIdentifierType,
        format: MolFileFormat,
    ) -> Result<Vec<u8>, ToolkitError> {
        self.post_bytes(
            "convert/molfile",
            &ConvertRequest {
                identifier,
                identifier_type,
                format,
            },
        )
        .await
    }

    async fn depict_molecule(
        &self,
        identifier: &str,
        identifier_type: MoleculeIdentifierType,
        labels: LabelOptions,
    ) -> Result<Vec<u8>, ToolkitError> {
        self.post_bytes(
            "depict/molecule",
            &DepictRequest {
                identifier,
                identifier_type,
                labels,
            },
        )
        .await
    }

    async fn align_molecule_pair(
        &self,
        reference: &MoleculeRef,
        fit: &MoleculeRef,
        labels: LabelOptions,
    ) -> Result<Vec<u8>, ToolkitError> {
        self.post_bytes(
            "depict/align",
            &AlignRequest {
                reference,
                fit,
                labels,
            },
        )
        .await
    }

    async fn status(&self) -> Result<serde_json::Value, ToolkitError> {
        let url = self.url("status");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolkitError::Unavailable(format!("{url}: {e}")))?;
        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ToolkitError::Protocol(format!("status: {e}")))
    }
}

#[async_trait]
impl IndexMaintainer for RemoteToolkit {
    async fn update_chem_comp_index(
        &self,
        ctx: StageContext<'_>,
        sources: Option<&LocalSources>,
    ) -> Result<StageOutcome, IndexError> {
        let stage = RebuildStage::ChemCompIndex.as_str();
        self.post_json(&format!("index/{stage}"), &StageRequest::new(&ctx, sources))
            .await
            .map_err(index_error(stage))
    }

    async fn update_search_index(
        &self,
        ctx: StageContext<'_>,
    ) -> Result<StageOutcome, IndexError> {
        let stage = RebuildStage::SearchIndex.as_str();
        self.post_json(&format!("index/{stage}"), &StageRequest::new(&ctx, None))
            .await
            .map_err(index_error(stage))
    }

    async fn update_search_molecule_provider(
        &self,
        ctx: StageContext<'_>,
    ) -> Result<StageOutcome, IndexError> {
        let stage = RebuildStage::SearchMoleculeProvider.as_str();
        self.post_json(&format!("index/{stage}"), &StageRequest::new(&ctx, None))
            .await
            .map_err(index_error(stage))
    }

    async fn reload_search_database(
        &self,
        config: &IndexBuildConfig,
        index_root: &Path,
    ) -> Result<StageOutcome, IndexError> {
        let request = DatabaseRequest {
            config,
            index_root,
            url: None,
        };
        self.post_json("index/reload", &request)
            .await
            .map_err(index_error(RebuildStage::ReloadDatabase.as_str()))
    }

    async fn probe_search_database(
        &self,
        config: &IndexBuildConfig,
        index_root: &Path,
    ) -> Result<bool, IndexError> {
        let request = DatabaseRequest {
            config,
            index_root,
            url: None,
        };
        let probe: ProbeResponse = self
            .post_json("index/probe", &request)
            .await
            .map_err(index_error("probe"))?;
        Ok(probe.ok)
    }

    async fn restore_bundle(
        &self,
        url: &str,
        config: &IndexBuildConfig,
        index_root: &Path,
    ) -> Result<StageOutcome, IndexError> {
        let request = DatabaseRequest {
            config,
            index_root,
            url: Some(url),
        };
        self.post_json("index/restore", &request)
            .await
            .map_err(index_error("restore"))
    }
}
