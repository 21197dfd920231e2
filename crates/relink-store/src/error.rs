//! Store error type

use std::path::PathBuf;

use relink_trace::TraceError;
use thiserror::Error;

/// Errors from cache store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unable to open cache database {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A statement failed; `op` names what was being done
    #[error("unable to {op}: {source}")]
    Sqlite {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("unable to canonicalize build tags: {0}")]
    Canonical(String),

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error("unknown argument kind {kind:?} at position {position}")]
    UnknownArgumentKind { kind: String, position: i64 },

    #[error("cache schema version {found} is not supported (expected {expected})")]
    SchemaVersion { found: String, expected: u32 },

    /// Append would splice two different link commands into one
    #[error(
        "link command for {program} differs from the one cached as invocation {invocation_id}; capture again with --replace"
    )]
    CaptureConflict { program: String, invocation_id: i64 },

    #[error("invalid recapture policy {0:?} (expected \"append\" or \"replace\")")]
    InvalidPolicy(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Attach an operation name to a rusqlite failure
pub(crate) trait OpContext<T> {
    fn op(self, op: &'static str) -> StoreResult<T>;
}

impl<T> OpContext<T> for rusqlite::Result<T> {
    fn op(self, op: &'static str) -> StoreResult<T> {
        self.map_err(|source| StoreError::Sqlite { op, source })
    }
}
