//! Link invocation cache.
//!
//! Persists captured linker invocations in a single SQLite file, keyed by
//! a [`Fingerprint`] (program name + canonical build tag set):
//! - `tag_set`: canonical JSON tag arrays, deduplicated
//! - `link_invocation`: one row per (program, tag set)
//! - `argument`: positional linker arguments, literal or placeholder
//! - `artifact`: package archives, unique by file path
//! - `invocation_artifact`: which archives an invocation links
//! - `manifest_line`: non-`packagefile` manifest lines, verbatim
//!
//! Writes happen in one immediate transaction per capture; reads happen in
//! one transaction on a read-only connection.

mod argument;
mod error;
mod fingerprint;
mod read;
mod schema;
mod store;
mod upsert;
mod write;

pub use argument::Argument;
pub use error::{StoreError, StoreResult};
pub use fingerprint::{Fingerprint, TagSet};
pub use read::{Artifact, CachedInvocation};
pub use schema::SCHEMA_VERSION;
pub use store::CacheStore;
pub use write::{CaptureSummary, InvocationSummary, RecapturePolicy};
