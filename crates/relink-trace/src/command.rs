//! Tokenizing a captured linker command line.
//!
//! Splitting is on whitespace only. The go command does not quote linker
//! arguments in its trace for ordinary builds, so an argument containing a
//! space is split in two; this is a known gap.

/// Flag whose value is the link output path
pub const OUTPUT_FLAG: &str = "-o";

/// Flag whose value is the manifest path
pub const IMPORTCFG_FLAG: &str = "-importcfg";

/// What a token stands for in the captured command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRole {
    Literal,
    /// Value of `-o`; recomputed on replay
    OutputPath,
    /// Value of `-importcfg`; recomputed on replay
    ImportcfgPath,
}

/// One token of the command, with the text it had in the trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkToken {
    pub literal: String,
    pub role: TokenRole,
}

/// A tokenized linker command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCommand {
    pub tokens: Vec<LinkToken>,
}

impl LinkCommand {
    pub fn parse(line: &str) -> Self {
        let mut tokens: Vec<LinkToken> = Vec::new();

        for literal in line.split_whitespace() {
            let role = match tokens.last() {
                Some(prev) if prev.role == TokenRole::Literal && prev.literal == OUTPUT_FLAG => {
                    TokenRole::OutputPath
                }
                Some(prev) if prev.role == TokenRole::Literal && prev.literal == IMPORTCFG_FLAG => {
                    TokenRole::ImportcfgPath
                }
                _ => TokenRole::Literal,
            };
            tokens.push(LinkToken {
                literal: literal.to_string(),
                role,
            });
        }

        Self { tokens }
    }

    /// Manifest path as written in the trace (the staged-file key)
    pub fn importcfg(&self) -> Option<&str> {
        self.tokens
            .iter()
            .find(|t| t.role == TokenRole::ImportcfgPath)
            .map(|t| t.literal.as_str())
    }

    /// Output path as written in the trace
    pub fn output(&self) -> Option<&str> {
        self.tokens
            .iter()
            .find(|t| t.role == TokenRole::OutputPath)
            .map(|t| t.literal.as_str())
    }

    /// Trace text of the final operand, normally the main package archive
    pub fn last_literal(&self) -> Option<&str> {
        self.tokens.last().map(|t| t.literal.as_str())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
