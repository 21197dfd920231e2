//! Parser for the verbose trace printed by `go build -x`.
//!
//! The trace is a shell-like transcript of every step the go command runs.
//! This crate pulls three things out of it:
//! - the command lines passed to the linker (`$GOTOOLDIR/link ...`)
//! - the content of files staged with `cat > FILE << 'EOF'` heredocs
//! - the `packagefile` directives of those staged manifests

mod command;
mod manifest;
mod parser;

pub use command::{LinkCommand, LinkToken, TokenRole, IMPORTCFG_FLAG, OUTPUT_FLAG};
pub use manifest::{classify_line, ManifestEntry, PackageFile, PACKAGEFILE_DIRECTIVE};
pub use parser::{parse_trace, ParsedTrace, TraceParser, FILE_TERMINATOR};

use thiserror::Error;

/// Errors raised while reading a trace.
#[derive(Debug, Error)]
pub enum TraceError {
    /// A matcher could not be compiled (only possible with an unusable linker path).
    #[error("invalid trace pattern: {0}")]
    Pattern(#[from] regex_lite::Error),

    /// A line that starts with `packagefile` but is not `packagefile NAME=FILE`.
    #[error("malformed packagefile directive: {line:?}")]
    MalformedPackageFile { line: String },
}

/// Result type for trace operations
pub type TraceResult<T> = Result<T, TraceError>;
