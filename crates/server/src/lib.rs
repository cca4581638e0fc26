//! chem-search server - HTTP API for chemical component search
//!
//! This crate exposes the chemical reference search over HTTP. It supports:
//!
//! - **Descriptor search**: SMILES and InChI matching against the
//!   chemical component and BIRD reference dictionaries
//! - **Formula search**: exact, subset and per-element range matching
//! - **Depiction and conversion**: SVG images and molfile exports
//! - **Index lifecycle**: rebuild, restore and verification of the search index
//! - **Health & Metrics**: liveness/readiness probes and Prometheus metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! ## Public Endpoints
//!
//! - `GET /`, `GET /status` - service status
//! - `GET /healthcheck` - liveness probe
//! - `GET /ready` - readiness probe
//! - `GET /metrics` - Prometheus metrics
//! - `GET|POST /chem-match-v1/{descriptorType}` - descriptor search
//! - `GET|POST /chem-match-v1/formula` - formula search
//! - `GET|POST /chem-match-v1/formula/range` - element range search
//! - `GET|POST /chem-depict-v1/molecule/{identifierType}` - SVG depiction
//! - `GET /chem-depict-v1/alignpair` - aligned pair depiction
//! - `GET|POST /chem-convert-v1/to-molfile/{identifierType}` - molfile export
//!
//! ## Admin Endpoints (API Key Required)
//!
//! - `GET /admin/index` - lifecycle status
//! - `POST /admin/rebuild` - rebuild the index in the background
//! - `POST /admin/restore` - restore the configured dependency bundle
//! - `POST /admin/verify` - check the served snapshot

pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{ServerConfig, StartupMode};
pub use error::{ServerError, ServerResult};
pub use server::{bootstrap_index, build_router, init_tracing, start_server};
pub use state::ServerState;
