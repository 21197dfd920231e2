//! Cache keys: program name + canonical build tag set.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{StoreError, StoreResult};

/// A set of build tags in canonical form: trimmed, sorted, deduplicated,
/// no empties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tags: Vec<String> = tags
            .into_iter()
            .map(|t| Into::<String>::into(t).trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        tags.sort();
        tags.dedup();
        Self(tags)
    }

    pub fn tags(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical JSON array (RFC 8785), the stored form of the tag set
    pub fn canonical(&self) -> StoreResult<String> {
        let bytes = serde_json_canonicalizer::to_vec(&self.0)
            .map_err(|e| StoreError::Canonical(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| StoreError::Canonical(e.to_string()))
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

/// Identity of one cacheable build variant.
///
/// Program names are compared exactly as given: no case folding and no
/// path normalization (`./hello` and `hello` are different programs).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    program: String,
    tags: TagSet,
}

impl Fingerprint {
    pub fn new(program: impl Into<String>, tags: TagSet) -> Self {
        Self {
            program: program.into(),
            tags,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Short stable digest for logs and diagnostics.
    ///
    /// SHA-256 over the JCS encoding of `{"program", "tags"}`. Lookups use
    /// the (program, canonical tags) pair, never this digest.
    pub fn digest(&self) -> StoreResult<String> {
        let jcs = serde_json_canonicalizer::to_vec(self)
            .map_err(|e| StoreError::Canonical(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(&jcs);
        Ok(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tags.is_empty() {
            write!(f, "{}", self.program)
        } else {
            write!(f, "{} [{}]", self.program, self.tags)
        }
    }
}
