use std::sync::Arc;
use std::time::Instant;

use index::SnapshotGate;

use crate::elements::{is_element_symbol, parse_formula};
use crate::metrics::metrics_recorder;
use crate::ranker::rank;
use crate::toolkit::{ChemToolkit, ToolkitError};
use crate::types::{
    DescriptorType, DisplayStyle, FormulaRange, MatchError, MatchOptions, MolFileFormat,
    MoleculeIdentifierType, MoleculeRef, Query, RankedAnswer,
};


const MAX_PDB_IDENTIFIER_LEN: usize = 16;

/// Converted molecule file and the format it was produced in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MolFile {
    pub format: MolFileFormat,
    pub content: Vec<u8>,
}

impl MolFile {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// Validates queries, calls the toolkit and ranks what comes back.
///
/// The toolkit and the snapshot gate are injected once and shared by every
/// request; the dispatcher itself holds no mutable state.
#[derive(Clone)]
pub struct QueryDispatcher {
    toolkit: Arc<dyn ChemToolkit>,
    gate: Arc<dyn SnapshotGate>,
}

impl std::fmt::Debug for QueryDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryDispatcher")
            .field("serving", &self.gate.is_serving())
            .finish_non_exhaustive()
    }
}

fn upstream(err: ToolkitError) -> MatchError {
    MatchError::Upstream(err.to_string())
}

impl QueryDispatcher {
    pub fn new(toolkit: Arc<dyn ChemToolkit>, gate: Arc<dyn SnapshotGate>) -> Self {
        Self { toolkit, gate }
    }

    pub fn toolkit(&self) -> &Arc<dyn ChemToolkit> {
        &self.toolkit
    }

    /// Run a search and rank its results.
    ///
    /// Malformed input fails with [`MatchError::Validation`] before the
    /// toolkit is contacted; without a serving snapshot the query fails with
    /// [`MatchError::NotReady`]. Toolkit failures are not retried.
    pub async fn dispatch(
        &self,
        query: &Query,
        options: &MatchOptions,
    ) -> Result<RankedAnswer, MatchError> {
        let kind = query.kind();
        let (strategy, mode) = options.resolve(kind);
        let started = Instant::now();

        let result = self.run(query, options).await;
        let latency = started.elapsed();

        match &result {
            Ok(answer) => {
                tracing::info!(
                    kind = kind.as_str(),
                    match_type = %strategy,
                    ranking = mode.as_str(),
                    hits = answer.len(),
                    latency_ms = latency.as_millis() as u64,
                    "query dispatched"
                );
                if let Some(recorder) = metrics_recorder() {
                    recorder.record_match(kind, strategy, latency, answer.len());
                }
            }
            Err(err) => {
                tracing::warn!(kind = kind.as_str(), error = %err, "query failed");
                if let Some(recorder) = metrics_recorder() {
                    recorder.record_failure(kind, err.code());
                }
            }
        }
        result
    }

    async fn run(&self, query: &Query, options: &MatchOptions) -> Result<RankedAnswer, MatchError> {
        validate_query(query)?;
        self.ensure_serving()?;

        let (strategy, mode) = options.resolve(query.kind());
        match query {
            Query::Descriptor {
                descriptor,
                descriptor_type,
            } => {
                let matches = self
                    .toolkit
                    .match_by_descriptor(descriptor.trim(), *descriptor_type, strategy)
                    .await
                    .map_err(upstream)?;
                tracing::debug!(
                    graph = matches.graph.len(),
                    fingerprint = matches.fingerprint.len(),
                    "descriptor match streams"
                );
                Ok(rank(matches.stream_for(strategy), strategy, mode))
            }
            Query::Formula {
                formula,
                match_subset,
            } => {
                let results = self
                    .toolkit
                    .match_by_formula(formula.trim(), *match_subset)
                    .await
                    .map_err(upstream)?;
                Ok(rank(&results, strategy, mode))
            }
            Query::FormulaRange {
                ranges,
                match_subset,
            } => {
                let results = self
                    .toolkit
                    .match_by_formula_range(ranges, *match_subset)
                    .await
                    .map_err(upstream)?;
                Ok(rank(&results, strategy, mode))
            }
        }
    }

    fn ensure_serving(&self) -> Result<(), MatchError> {
        if self.gate.is_serving() {
            Ok(())
        } else {
            Err(MatchError::NotReady)
        }
    }

    /// SVG depiction of one molecule. Display style defaults to labeled.
    pub async fn depict(
        &self,
        identifier: &str,
        identifier_type: MoleculeIdentifierType,
        style: Option<DisplayStyle>,
    ) -> Result<Vec<u8>, MatchError> {
        validate_identifier(identifier, identifier_type)?;
        let style = style.unwrap_or_default();
        tracing::info!(
            identifier_type = identifier_type.as_str(),
            style = ?style,
            "depict molecule"
        );
        self.toolkit
            .depict_molecule(identifier.trim(), identifier_type, style.labels())
            .await
            .map_err(upstream)
    }

    /// SVG of `fit` aligned onto `reference`.
    pub async fn align_pair(
        &self,
        reference: &MoleculeRef,
        fit: &MoleculeRef,
        style: Option<DisplayStyle>,
    ) -> Result<Vec<u8>, MatchError> {
        validate_identifier(&reference.identifier, reference.identifier_type)?;
        validate_identifier(&fit.identifier, fit.identifier_type)?;
        let style = style.unwrap_or_default();
        tracing::info!(
            reference_type = reference.identifier_type.as_str(),
            fit_type = fit.identifier_type.as_str(),
            "align molecule pair"
        );
        self.toolkit
            .align_molecule_pair(reference, fit, style.labels())
            .await
            .map_err(upstream)
    }

    /// Convert an identifier to a molecule file. Format defaults to `mol`.
    pub async fn to_mol_file(
        &self,
        identifier: &str,
        identifier_type: MoleculeIdentifierType,
        format: Option<MolFileFormat>,
    ) -> Result<MolFile, MatchError> {
        validate_identifier(identifier, identifier_type)?;
        let format = format.unwrap_or_default();
        let content = self
            .toolkit
            .to_mol_file(identifier.trim(), identifier_type, format)
            .await
            .map_err(upstream)?;
        Ok(MolFile { format, content })
    }
}

fn validate_query(query: &Query) -> Result<(), MatchError> {
    match query {
        Query::Descriptor {
            descriptor,
            descriptor_type,
        } => validate_descriptor(descriptor, *descriptor_type),
        Query::Formula { formula, .. } => parse_formula(formula)
            .map(|_| ())
            .map_err(MatchError::Validation),
        Query::FormulaRange { ranges, .. } => validate_range(ranges),
    }
}

pub(crate) fn validate_descriptor(
    descriptor: &str,
    descriptor_type: DescriptorType,
) -> Result<(), MatchError> {
    let descriptor = descriptor.trim();
    if descriptor.is_empty() {
        return Err(MatchError::Validation(format!(
            "{} descriptor must not be empty",
            descriptor_type.as_str()
        )));
    }
    match descriptor_type {
        DescriptorType::Smiles => {
            if descriptor.chars().any(|c| c.is_whitespace() || c.is_control()) {
                return Err(MatchError::Validation(
                    "SMILES descriptor must not contain whitespace".to_string(),
                ));
            }
        }
        DescriptorType::InChI => {
            if !descriptor.starts_with("InChI=") {
                return Err(MatchError::Validation(
                    "InChI descriptor must start with 'InChI='".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn validate_identifier(
    identifier: &str,
    identifier_type: MoleculeIdentifierType,
) -> Result<(), MatchError> {
    match identifier_type {
        MoleculeIdentifierType::Smiles => validate_descriptor(identifier, DescriptorType::Smiles),
        MoleculeIdentifierType::InChI => validate_descriptor(identifier, DescriptorType::InChI),
        MoleculeIdentifierType::IdentifierPdb => {
            let id = identifier.trim();
            let well_formed = !id.is_empty()
                && id.len() <= MAX_PDB_IDENTIFIER_LEN
                && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if well_formed {
                Ok(())
            } else {
                Err(MatchError::Validation(format!(
                    "'{id}' is not a chemical component or BIRD identifier"
                )))
            }
        }
    }
}

fn validate_range(ranges: &FormulaRange) -> Result<(), MatchError> {
    if ranges.is_empty() {
        return Err(MatchError::Validation(
            "formula range query must name at least one element".to_string(),
        ));
    }
    for (symbol, range) in ranges {
        if !is_element_symbol(symbol) {
            return Err(MatchError::Validation(format!(
                "unknown element symbol '{symbol}'"
            )));
        }
        if let (Some(min), Some(max)) = (range.min, range.max) {
            if min > max {
                return Err(MatchError::Validation(format!(
                    "range for {symbol} has min {min} greater than max {max}"
                )));
            }
        }
    }
    Ok(())
}
