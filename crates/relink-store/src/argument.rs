//! Stored linker arguments.

use relink_trace::{LinkToken, TokenRole};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// One positional linker argument as stored in the cache.
///
/// Placeholders carry no text; their value is produced fresh on replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "token", rename_all = "snake_case")]
pub enum Argument {
    Literal(String),
    /// Link output path (value of `-o`)
    OutputPath,
    /// Manifest path (value of `-importcfg`)
    ImportcfgPath,
    /// Path of the entry artifact (the main package archive)
    MainPackage,
}

impl Argument {
    pub(crate) const LITERAL: &'static str = "literal";
    pub(crate) const OUTPUT_PATH: &'static str = "output_path";
    pub(crate) const IMPORTCFG_PATH: &'static str = "importcfg_path";
    pub(crate) const MAIN_PACKAGE: &'static str = "main_package";

    /// Value of the `kind` column
    pub fn kind(&self) -> &'static str {
        match self {
            Argument::Literal(_) => Self::LITERAL,
            Argument::OutputPath => Self::OUTPUT_PATH,
            Argument::ImportcfgPath => Self::IMPORTCFG_PATH,
            Argument::MainPackage => Self::MAIN_PACKAGE,
        }
    }

    /// Value of the `token` column (empty for placeholders)
    pub fn token(&self) -> &str {
        match self {
            Argument::Literal(token) => token,
            _ => "",
        }
    }

    pub fn is_placeholder(&self) -> bool {
        !matches!(self, Argument::Literal(_))
    }

    pub(crate) fn from_row(kind: String, token: String, position: i64) -> StoreResult<Self> {
        match kind.as_str() {
            Self::LITERAL => Ok(Argument::Literal(token)),
            Self::OUTPUT_PATH => Ok(Argument::OutputPath),
            Self::IMPORTCFG_PATH => Ok(Argument::ImportcfgPath),
            Self::MAIN_PACKAGE => Ok(Argument::MainPackage),
            _ => Err(StoreError::UnknownArgumentKind { kind, position }),
        }
    }
}

impl From<&LinkToken> for Argument {
    fn from(token: &LinkToken) -> Self {
        match token.role {
            TokenRole::Literal => Argument::Literal(token.literal.clone()),
            TokenRole::OutputPath => Argument::OutputPath,
            TokenRole::ImportcfgPath => Argument::ImportcfgPath,
        }
    }
}
