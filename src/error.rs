//! Typed error taxonomy for the nomenclature engine.
//!
//! Mirrors the error kinds described for the original tool: a lock already
//! held, a tree/profile-store key mismatch ("integrity"), malformed input,
//! and internal assertions that indicate a programmer error rather than bad
//! input. QC failure is deliberately absent here -- spec treats it as data,
//! not an error, and it is threaded through `below_qc` lists instead.

use std::path::PathBuf;

use crate::profile::Key;

/// Errors that can terminate a nomenclature run.
#[derive(Debug, thiserror::Error)]
pub enum NomenclatureError {
    /// The on-disk lock file was already present when a run tried to start.
    #[error("lock file already present at {path}: a run is in progress or the previous run crashed")]
    LockHeld {
        /// Path to the advisory lock file.
        path: PathBuf,
    },

    /// The Tree's `names` key set and the Profile Store's key set disagree.
    #[error(
        "tree and profile store disagree on key set: {} key(s) only in tree, {} key(s) only in store",
        tree_only.len(),
        store_only.len()
    )]
    Integrity {
        /// Keys present in the tree but missing from the profile store.
        tree_only: Vec<Key>,
        /// Keys present in the profile store but missing from the tree.
        store_only: Vec<Key>,
    },

    /// An input file could not be parsed as specified.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// An internal invariant was violated; this indicates a bug rather than
    /// bad input, but we still abort cleanly rather than panic across an
    /// unwind boundary the caller doesn't expect.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// Wraps any underlying I/O failure encountered while reading or writing
    /// state.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wraps a JSON (de)serialization failure for the tree or profile store.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wraps a CSV/TSV parsing failure for the batch input file.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NomenclatureError>;

impl NomenclatureError {
    /// Maps an error to the CLI process exit code it should produce, per
    /// the external interfaces spec.
    pub fn exit_code(&self) -> i32 {
        match self {
            NomenclatureError::MalformedInput(_) => 1,
            NomenclatureError::LockHeld { .. } => 2,
            NomenclatureError::Integrity { .. } => 3,
            NomenclatureError::Assertion(_) | NomenclatureError::Io(_) | NomenclatureError::Json(_) | NomenclatureError::Csv(_) => 4,
        }
    }
}
