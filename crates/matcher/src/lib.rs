//! # chem-search Matcher (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` sits between the HTTP routes and the external chemistry
//! toolkit. It validates incoming searches, hands them to the toolkit, and
//! turns the raw candidate lists that come back into deduplicated, ordered
//! answers. Depiction and molecule-file conversion pass through the same
//! dispatcher so every route shares one toolkit instance.
//!
//! Searches only run while the index lifecycle (`index`) reports a serving
//! snapshot; until then they fail with [`MatchError::NotReady`].
//!
//! ## Core Types
//!
//! - [`Query`]: descriptor (SMILES/InChI), formula, or per-element formula
//!   range search.
//! - [`MatchOptions`]: optional match type and ranking mode. Descriptor
//!   queries default to `graph-relaxed` with score-aware ranking, formula
//!   queries to identifier-only ranking.
//! - [`SearchStrategy`]: the four comparison criteria, three exact graph
//!   matches and one fingerprint similarity screen.
//! - [`ResultRanker`]: collapses `ID|suffix` identifiers to their canonical
//!   form, keeps the best score per identifier and orders the answer.
//! - [`QueryDispatcher`]: the entry point used by the routes.
//! - [`ChemToolkit`]: the search/depict/convert half of the toolkit;
//!   [`RemoteToolkit`] implements it (and `index::IndexMaintainer`) over HTTP.
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use index::IndexLifecycleManager;
//! use matcher::{DescriptorType, MatchOptions, Query, QueryDispatcher, RemoteToolkit};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let toolkit = Arc::new(RemoteToolkit::new("http://127.0.0.1:8100")?);
//! let lifecycle = Arc::new(IndexLifecycleManager::new(toolkit.clone()));
//! let dispatcher = QueryDispatcher::new(toolkit, lifecycle);
//!
//! let query = Query::Descriptor {
//!     descriptor: "c1ccc(cc1)[C@@H](C(=O)O)N".into(),
//!     descriptor_type: DescriptorType::Smiles,
//! };
//! let answer = dispatcher.dispatch(&query, &MatchOptions::default()).await?;
//! for hit in &answer.hits {
//!     println!("{} {:.2}", hit.id, hit.score);
//! }
//! # Ok(())
//! # }
//! ```

mod dispatch;
pub mod elements;
pub mod metrics;
mod ranker;
mod remote;
mod toolkit;
pub mod types;

pub use crate::dispatch::{MolFile, QueryDispatcher};
pub use crate::metrics::{set_match_metrics, MatchMetrics};
pub use crate::ranker::{rank, ResultRanker};
pub use crate::remote::RemoteToolkit;
pub use crate::toolkit::{ChemToolkit, DescriptorMatches, ToolkitError};
pub use crate::types::{
    DescriptorType, DisplayStyle, ElementRange, FormulaRange, LabelOptions, MatchError,
    MatchOptions, MatchResult, MolFileFormat, MoleculeHandle, MoleculeIdentifierType,
    MoleculeRef, Query, QueryKind, RankedAnswer, RankedHit, RankingMode, SearchStrategy,
};
