use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How a candidate was matched against the query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SearchStrategy {
    /// Atom type, formal charge, aromaticity, bond order, atom/bond stereo.
    GraphStrict,
    /// Atom type, formal charge, bond type.
    #[default]
    GraphRelaxed,
    /// Relaxed graph comparison plus atom/bond stereochemistry.
    GraphRelaxedStereo,
    /// TREE and MACCS fingerprint screen.
    FingerprintSimilarity,
}

impl SearchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStrategy::GraphStrict => "graph-strict",
            SearchStrategy::GraphRelaxed => "graph-relaxed",
            SearchStrategy::GraphRelaxedStereo => "graph-relaxed-stereo",
            SearchStrategy::FingerprintSimilarity => "fingerprint-similarity",
        }
    }

    pub fn is_fingerprint(&self) -> bool {
        matches!(self, SearchStrategy::FingerprintSimilarity)
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchStrategy {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "graph-strict" => Ok(SearchStrategy::GraphStrict),
            "graph-relaxed" => Ok(SearchStrategy::GraphRelaxed),
            "graph-relaxed-stereo" => Ok(SearchStrategy::GraphRelaxedStereo),
            "fingerprint-similarity" => Ok(SearchStrategy::FingerprintSimilarity),
            other => Err(MatchError::Validation(format!("unknown match type '{other}'"))),
        }
    }
}

/// Shape of a ranked answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RankingMode {
    /// Descending best score, ties in encounter order.
    ScoreAware,
    /// Deduplicated identifiers in encounter order.
    IdentifierOnly,
}

impl RankingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankingMode::ScoreAware => "score-aware",
            RankingMode::IdentifierOnly => "identifier-only",
        }
    }
}

/// Chemical descriptor accepted by the descriptor match routes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    #[serde(rename = "SMILES")]
    Smiles,
    #[serde(rename = "InChI")]
    InChI,
}

impl DescriptorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptorType::Smiles => "SMILES",
            DescriptorType::InChI => "InChI",
        }
    }
}

impl FromStr for DescriptorType {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SMILES" => Ok(DescriptorType::Smiles),
            "InChI" => Ok(DescriptorType::InChI),
            other => Err(MatchError::Validation(format!(
                "unknown descriptor type '{other}', expected SMILES or InChI"
            ))),
        }
    }
}

/// Identifier kinds accepted by depiction and conversion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MoleculeIdentifierType {
    #[serde(rename = "SMILES")]
    Smiles,
    #[serde(rename = "InChI")]
    InChI,
    /// Chemical component or BIRD identifier (`ATP`, `PRD_000010`).
    #[serde(rename = "IdentifierPDB")]
    IdentifierPdb,
}

impl MoleculeIdentifierType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoleculeIdentifierType::Smiles => "SMILES",
            MoleculeIdentifierType::InChI => "InChI",
            MoleculeIdentifierType::IdentifierPdb => "IdentifierPDB",
        }
    }
}

impl FromStr for MoleculeIdentifierType {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SMILES" => Ok(MoleculeIdentifierType::Smiles),
            "InChI" => Ok(MoleculeIdentifierType::InChI),
            "IdentifierPDB" => Ok(MoleculeIdentifierType::IdentifierPdb),
            other => Err(MatchError::Validation(format!(
                "unknown identifier type '{other}', expected SMILES, InChI or IdentifierPDB"
            ))),
        }
    }
}

/// Depiction labelling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStyle {
    #[default]
    Labeled,
    Unlabeled,
}

impl DisplayStyle {
    pub fn labels(&self) -> LabelOptions {
        let on = matches!(self, DisplayStyle::Labeled);
        LabelOptions {
            atom_name: on,
            atom_cip_stereo: on,
            bond_cip_stereo: on,
        }
    }
}

impl FromStr for DisplayStyle {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "labeled" => Ok(DisplayStyle::Labeled),
            "unlabeled" => Ok(DisplayStyle::Unlabeled),
            _ => Err(MatchError::Validation(format!(
                "unknown display style '{s}', expected labeled or unlabeled"
            ))),
        }
    }
}

/// Per-depiction label switches passed to the toolkit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelOptions {
    #[serde(rename = "labelAtomName")]
    pub atom_name: bool,
    #[serde(rename = "labelAtomCIPStereo")]
    pub atom_cip_stereo: bool,
    #[serde(rename = "labelBondCIPStereo")]
    pub bond_cip_stereo: bool,
}

/// Molecule file formats produced by conversion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MolFileFormat {
    #[default]
    Mol,
    Sdf,
    Mol2,
    Mol2h,
}

impl MolFileFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            MolFileFormat::Mol => "chemical/x-mdl-molfile",
            MolFileFormat::Sdf => "chemical/x-mdl-sdfile",
            MolFileFormat::Mol2 | MolFileFormat::Mol2h => "chemical/x-mol2",
        }
    }
}

impl FromStr for MolFileFormat {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mol" => Ok(MolFileFormat::Mol),
            "sdf" => Ok(MolFileFormat::Sdf),
            "mol2" => Ok(MolFileFormat::Mol2),
            "mol2h" => Ok(MolFileFormat::Mol2h),
            _ => Err(MatchError::Validation(format!(
                "unknown molecule format '{s}', expected mol, sdf, mol2 or mol2h"
            ))),
        }
    }
}

/// Opaque handle to a molecule held by the toolkit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct MoleculeHandle(pub String);

/// One candidate hit reported by the toolkit.
///
/// `cc_id` may carry a `|`-separated sub-index suffix (`004|hash1`); the
/// canonical identifier is the part before the first `|`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub cc_id: String,
    #[serde(default, rename = "oeMol")]
    pub molecule: Option<MoleculeHandle>,
    #[serde(default, rename = "searchType")]
    pub strategy: Option<SearchStrategy>,
    #[serde(default)]
    pub match_opts: Option<String>,
    #[serde(default)]
    pub screen_type: Option<String>,
    #[serde(default)]
    pub fp_type: Option<String>,
    /// Similarity in [0, 1]; `None` for exact graph matches.
    #[serde(default)]
    pub fp_score: Option<f64>,
    #[serde(default, rename = "oeIdx")]
    pub index: Option<usize>,
    #[serde(default)]
    pub formula: Option<String>,
}

impl MatchResult {
    pub fn new(cc_id: impl Into<String>) -> Self {
        Self {
            cc_id: cc_id.into(),
            molecule: None,
            strategy: None,
            match_opts: None,
            screen_type: None,
            fp_type: None,
            fp_score: None,
            index: None,
            formula: None,
        }
    }

    /// Exact graph match.
    pub fn graph(cc_id: impl Into<String>, strategy: SearchStrategy) -> Self {
        Self {
            strategy: Some(strategy),
            match_opts: Some(strategy.as_str().to_string()),
            ..Self::new(cc_id)
        }
    }

    /// Fingerprint screen hit.
    pub fn fingerprint(cc_id: impl Into<String>, fp_type: &str, score: f64) -> Self {
        Self {
            strategy: Some(SearchStrategy::FingerprintSimilarity),
            fp_type: Some(fp_type.to_string()),
            fp_score: Some(score),
            ..Self::new(cc_id)
        }
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Identifier truncated at the first `|`.
    pub fn canonical_id(&self) -> &str {
        match self.cc_id.split_once('|') {
            Some((head, _)) => head,
            None => &self.cc_id,
        }
    }
}

/// One entry of a ranked answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedHit {
    pub id: String,
    pub score: f64,
}

/// Deduplicated, ordered identifiers with their best scores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedAnswer {
    pub strategy: SearchStrategy,
    pub mode: RankingMode,
    pub hits: Vec<RankedHit>,
}

impl RankedAnswer {
    pub fn empty(strategy: SearchStrategy, mode: RankingMode) -> Self {
        Self {
            strategy,
            mode,
            hits: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.hits.iter().map(|h| h.id.clone()).collect()
    }

    pub fn scores(&self) -> Vec<f64> {
        self.hits.iter().map(|h| h.score).collect()
    }

    /// Scores are only part of the answer in score-aware mode.
    pub fn score_list(&self) -> Option<Vec<f64>> {
        match self.mode {
            RankingMode::ScoreAware => Some(self.scores()),
            RankingMode::IdentifierOnly => None,
        }
    }

    /// Express the answer as match results again, one per hit.
    pub fn to_match_results(&self) -> Vec<MatchResult> {
        self.hits
            .iter()
            .map(|hit| {
                if self.strategy.is_fingerprint() {
                    MatchResult::fingerprint(hit.id.clone(), "RANKED", hit.score)
                } else {
                    MatchResult::graph(hit.id.clone(), self.strategy)
                }
            })
            .collect()
    }
}

/// Inclusive element-count bounds in a formula range query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ElementRange {
    #[serde(default)]
    pub min: Option<u32>,
    #[serde(default)]
    pub max: Option<u32>,
}

impl ElementRange {
    pub fn new(min: Option<u32>, max: Option<u32>) -> Self {
        Self { min, max }
    }
}

/// Element symbol to count bounds.
pub type FormulaRange = BTreeMap<String, ElementRange>;

/// Which kind of search a [`Query`] runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum QueryKind {
    Descriptor,
    Formula,
    FormulaRange,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Descriptor => "descriptor",
            QueryKind::Formula => "formula",
            QueryKind::FormulaRange => "formula-range",
        }
    }

    /// Ranking used when the request does not choose one.
    pub fn default_ranking(&self) -> RankingMode {
        match self {
            QueryKind::Descriptor => RankingMode::ScoreAware,
            QueryKind::Formula | QueryKind::FormulaRange => RankingMode::IdentifierOnly,
        }
    }
}

/// A normalized search request.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Descriptor {
        descriptor: String,
        descriptor_type: DescriptorType,
    },
    Formula {
        formula: String,
        /// Accept formulas that satisfy only a subset of the query elements.
        match_subset: bool,
    },
    FormulaRange {
        ranges: FormulaRange,
        match_subset: bool,
    },
}

impl Query {
    pub fn kind(&self) -> QueryKind {
        match self {
            Query::Descriptor { .. } => QueryKind::Descriptor,
            Query::Formula { .. } => QueryKind::Formula,
            Query::FormulaRange { .. } => QueryKind::FormulaRange,
        }
    }
}

/// Caller-supplied options; unset fields take per-kind defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOptions {
    #[serde(default)]
    pub match_type: Option<SearchStrategy>,
    #[serde(default)]
    pub ranking_mode: Option<RankingMode>,
}

impl MatchOptions {
    pub fn with_match_type(mut self, match_type: SearchStrategy) -> Self {
        self.match_type = Some(match_type);
        self
    }

    pub fn with_ranking(mut self, mode: RankingMode) -> Self {
        self.ranking_mode = Some(mode);
        self
    }

    /// Effective match type and ranking for `kind`. Formula searches are
    /// exact, so only descriptor queries honour `match_type`.
    ///
    /// Formula and formula-range queries always resolve to
    /// [`SearchStrategy::GraphRelaxed`]; a score-aware formula answer
    /// therefore reports 1.0 for every identifier.
    pub fn resolve(&self, kind: QueryKind) -> (SearchStrategy, RankingMode) {
        let strategy = match kind {
            QueryKind::Descriptor => self.match_type.unwrap_or_default(),
            QueryKind::Formula | QueryKind::FormulaRange => SearchStrategy::default(),
        };
        (
            strategy,
            self.ranking_mode.unwrap_or(kind.default_ranking()),
        )
    }
}

/// Molecule reference used by pair alignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoleculeRef {
    pub identifier: String,
    pub identifier_type: MoleculeIdentifierType,
}

impl MoleculeRef {
    pub fn new(identifier: impl Into<String>, identifier_type: MoleculeIdentifierType) -> Self {
        Self {
            identifier: identifier.into(),
            identifier_type,
        }
    }
}

/// Errors produced by query dispatch.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Malformed or empty query; raised before the toolkit is called.
    #[error("invalid query: {0}")]
    Validation(String),
    /// The toolkit failed; carries its reason.
    #[error("toolkit failure: {0}")]
    Upstream(String),
    /// No search index snapshot is being served yet.
    #[error("search index is not ready")]
    NotReady,
}

impl MatchError {
    pub fn code(&self) -> &'static str {
        match self {
            MatchError::Validation(_) => "VALIDATION_ERROR",
            MatchError::Upstream(_) => "UPSTREAM_ERROR",
            MatchError::NotReady => "NOT_READY",
        }
    }
}
