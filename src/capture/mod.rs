//! Capture pipeline: traced rebuild, warming loop, single-transaction commit.

mod warm;

pub use warm::{capture_stable_trace, first_uncached, StableTrace};

use std::path::PathBuf;

use log::info;
use serde::Serialize;
use relink_store::{CacheStore, CaptureSummary, Fingerprint, RecapturePolicy, StoreError, TagSet};
use relink_trace::{TraceError, TraceParser};

use crate::config::{ConfigSource, Settings};
use crate::exit::{store_exit_code, ExitCode};
use crate::toolchain::{BuildCommand, BuildDriver, ToolchainError};

/// Inputs to one capture
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub db_path: PathBuf,
    /// Explicit tags; `None` falls back to the build command's `-tags`
    pub tags: Option<TagSet>,
    pub policy: RecapturePolicy,
    pub max_attempts: u32,
}

impl CaptureOptions {
    pub fn from_settings(settings: &Settings, tags: Option<TagSet>) -> Self {
        Self {
            db_path: settings.db.clone(),
            tags,
            policy: settings.recapture,
            max_attempts: settings.max_attempts,
        }
    }
}

/// Fingerprint a build command is cached under
pub fn fingerprint_for(command: &BuildCommand, tags: Option<&TagSet>) -> Fingerprint {
    let tags = match tags {
        Some(tags) => tags.clone(),
        None => TagSet::new(command.tags().unwrap_or_default().iter().cloned()),
    };
    Fingerprint::new(command.program_name(), tags)
}

/// Rebuild `command` until its trace is stable and store the link step.
pub fn run_capture(
    driver: &dyn BuildDriver,
    command: &BuildCommand,
    options: &CaptureOptions,
) -> Result<CaptureSummary, CaptureError> {
    let fingerprint = fingerprint_for(command, options.tags.as_ref());
    info!("capturing {} into {}", fingerprint, options.db_path.display());

    let env = driver.toolchain_env(command.tool())?;
    let parser = TraceParser::new(&env.linker_path().to_string_lossy())?;

    let stable = capture_stable_trace(driver, command, &env, &parser, options.max_attempts)?;
    info!(
        "trace accepted on attempt {} with {} link command(s)",
        stable.attempt,
        stable.trace.link_commands.len()
    );

    let mut store = CacheStore::open(&options.db_path)?;
    let summary = store.record_capture(&fingerprint, &stable.trace, options.policy)?;
    Ok(summary)
}

/// What `relink-capture --json` prints
#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    #[serde(flatten)]
    pub summary: CaptureSummary,
    pub config_sources: Vec<ConfigSource>,
}

impl CaptureReport {
    pub fn new(summary: CaptureSummary, sources: &[ConfigSource]) -> Self {
        Self {
            summary,
            config_sources: sources.to_vec(),
        }
    }
}

/// Capture errors
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unable to remove stale output {path}: {source}")]
    RemoveOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("build cache did not stabilize after {attempts} attempt(s)")]
    CacheUnstable { attempts: u32 },

    #[error("the build trace contains no link step, nothing to cache")]
    NothingToCache,
}

impl CaptureError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CaptureError::Toolchain(e) if e.is_usage() => ExitCode::Usage.as_i32(),
            CaptureError::Toolchain(e) => e.child_code().unwrap_or(ExitCode::Fatal.as_i32()),
            CaptureError::Trace(_) => ExitCode::TraceFormat.as_i32(),
            CaptureError::Store(e) => store_exit_code(e),
            CaptureError::RemoveOutput { .. } => ExitCode::Fatal.as_i32(),
            CaptureError::CacheUnstable { .. } => ExitCode::CacheUnstable.as_i32(),
            CaptureError::NothingToCache => ExitCode::NothingToCache.as_i32(),
        }
    }

    /// Child diagnostics to pass through unchanged, if any
    pub fn child_output(&self) -> Option<&str> {
        match self {
            CaptureError::Toolchain(ToolchainError::Failed { output, .. }) => Some(output),
            _ => None,
        }
    }
}
