use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{
    DescriptorType, FormulaRange, LabelOptions, MatchResult, MolFileFormat, MoleculeIdentifierType,
    MoleculeRef, SearchStrategy,
};

/// Failure reported by (or while talking to) the chemistry toolkit.
#[derive(Debug, Error)]
pub enum ToolkitError {
    /// The toolkit understood the request and refused it.
    #[error("toolkit rejected request: {0}")]
    Rejected(String),
    /// The toolkit could not be reached or failed internally.
    #[error("toolkit unavailable: {0}")]
    Unavailable(String),
    /// The toolkit answered with something we could not decode.
    #[error("unexpected toolkit response: {0}")]
    Protocol(String),
}

/// Both result streams of a descriptor search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptorMatches {
    /// Exact graph matches.
    #[serde(default)]
    pub graph: Vec<MatchResult>,
    /// Fingerprint screen hits.
    #[serde(default)]
    pub fingerprint: Vec<MatchResult>,
}

impl DescriptorMatches {
    /// The stream that answers `strategy`.
    pub fn stream_for(&self, strategy: SearchStrategy) -> &[MatchResult] {
        if strategy.is_fingerprint() {
            &self.fingerprint
        } else {
            &self.graph
        }
    }
}

/// Search, depiction and conversion operations of the chemistry toolkit.
#[async_trait]
pub trait ChemToolkit: Send + Sync {
    async fn match_by_descriptor(
        &self,
        descriptor: &str,
        descriptor_type: DescriptorType,
        match_type: SearchStrategy,
    ) -> Result<DescriptorMatches, ToolkitError>;

    async fn match_by_formula(
        &self,
        formula: &str,
        match_subset: bool,
    ) -> Result<Vec<MatchResult>, ToolkitError>;

    async fn match_by_formula_range(
        &self,
        ranges: &FormulaRange,
        match_subset: bool,
    ) -> Result<Vec<MatchResult>, ToolkitError>;

    /// Molecule file contents in `format`.
    async fn to_mol_file(
        &self,
        identifier: &str,
        identifier_type: MoleculeIdentifierType,
        format: MolFileFormat,
    ) -> Result<Vec<u8>, ToolkitError>;

    /// SVG depiction of a single molecule.
    async fn depict_molecule(
        &self,
        identifier: &str,
        identifier_type: MoleculeIdentifierType,
        labels: LabelOptions,
    ) -> Result<Vec<u8>, ToolkitError>;

    /// SVG of `fit` aligned onto `reference`.
    async fn align_molecule_pair(
        &self,
        reference: &MoleculeRef,
        fit: &MoleculeRef,
        labels: LabelOptions,
    ) -> Result<Vec<u8>, ToolkitError>;

    /// Free-form toolkit status for the status route.
    async fn status(&self) -> Result<serde_json::Value, ToolkitError>;
}
