//! Server error taxonomy.
//!
//! Only startup failures (bind, map load) ever reach the process boundary.
//! Everything else is handled close to where it occurs: protocol errors are
//! answered on the offending connection, validation errors are silently
//! refused, and observer failures are logged per observer.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("map file {path}: {detail}")]
    MapFormat { path: String, detail: String },

    #[error("unknown difficulty {0:?} (expected easy, normal or hard)")]
    UnknownDifficulty(String),

    #[error("observer failed: {0}")]
    Observer(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}
