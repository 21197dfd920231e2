//! Cache-warming retry loop
//!
//! The first build after a change can link against archives still sitting
//! in the per-build scratch directory. Those paths vanish with the build,
//! so a trace is only accepted once every `packagefile` it stages points
//! inside `GOCACHE`.

use std::fs;
use std::io;
use std::path::Path;

use log::{debug, info, warn};
use relink_trace::{classify_line, ManifestEntry, ParsedTrace, TraceParser, TraceResult};

use super::CaptureError;
use crate::toolchain::{BuildCommand, BuildDriver, ToolchainEnv};

/// An accepted trace and the attempt that produced it
#[derive(Debug, Clone)]
pub struct StableTrace {
    pub trace: ParsedTrace,
    pub attempt: u32,
}

/// Rebuild until the trace references only cached archives.
///
/// Gives up with [`CaptureError::CacheUnstable`] after `max_attempts`
/// builds. Nothing from a rejected attempt leaves this function.
pub fn capture_stable_trace(
    driver: &dyn BuildDriver,
    command: &BuildCommand,
    env: &ToolchainEnv,
    parser: &TraceParser,
    max_attempts: u32,
) -> Result<StableTrace, CaptureError> {
    for attempt in 1..=max_attempts {
        remove_stale_output(Path::new(command.output()))?;

        let text = driver.traced_build(command)?;
        let trace = parser.parse(&text);
        if trace.is_empty() {
            return Err(CaptureError::NothingToCache);
        }

        match first_uncached(&trace, env)? {
            None => {
                info!(
                    "attempt {}/{}: all archives are in the build cache",
                    attempt, max_attempts
                );
                return Ok(StableTrace { trace, attempt });
            }
            Some(file) => {
                warn!(
                    "attempt {}/{}: {} is outside the build cache, rebuilding",
                    attempt, max_attempts, file
                );
            }
        }
    }

    Err(CaptureError::CacheUnstable {
        attempts: max_attempts,
    })
}

/// Delete the previous output so the build cannot skip the link step.
fn remove_stale_output(path: &Path) -> Result<(), CaptureError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("removed stale output {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CaptureError::RemoveOutput {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// First staged `packagefile` whose archive is not under the build cache
pub fn first_uncached(trace: &ParsedTrace, env: &ToolchainEnv) -> TraceResult<Option<String>> {
    for line in trace.packagefile_lines() {
        if let ManifestEntry::PackageFile(pf) = classify_line(line)? {
            if !env.in_cache(&pf.file) {
                return Ok(Some(pf.file));
            }
        }
    }
    Ok(None)
}
