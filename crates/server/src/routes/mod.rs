//! API route handlers
//!
//! Routes are organized by functionality:
//!
//! - `health`: service status, liveness, readiness and metrics
//! - `descriptor`: SMILES/InChI structure search
//! - `formula`: molecular formula and formula range search
//! - `depict`: SVG depiction of single molecules and aligned pairs
//! - `convert`: molecule file conversion
//! - `admin`: index lifecycle operations (API key required)
//!
//! Handlers only marshal requests and responses; validation, ranking and
//! toolkit calls live in [`matcher::QueryDispatcher`].

pub mod admin;
pub mod convert;
pub mod depict;
pub mod descriptor;
pub mod formula;
pub mod health;

use crate::error::ServerError;

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
