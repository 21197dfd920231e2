//! Replay pipeline: rebuild a cached link step and run the result.
//!
//! 1. look the fingerprint up (read-only)
//! 2. write the manifest to a fresh temporary file
//! 3. resolve placeholders against fresh paths
//! 4. run the linker
//! 5. drop the manifest, keep the binary
//! 6. hand the process over to the binary

mod handoff;

pub use handoff::hand_off;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};
use relink_store::{Argument, Artifact, CacheStore, CachedInvocation, Fingerprint, StoreError};
use serde::Serialize;
use tempfile::{Builder, TempPath};

use crate::config::ConfigSource;
use crate::exit::{store_exit_code, ExitCode};

/// Prefix of the temporary manifest file
pub const MANIFEST_PREFIX: &str = "importcfg.link";

/// Fetch the cached invocation for `fingerprint` from the file at `db_path`.
///
/// A missing file, an uninitialized cache and an unknown fingerprint are
/// all reported as [`ReplayError::CacheMiss`].
pub fn load(db_path: &Path, fingerprint: &Fingerprint) -> Result<CachedInvocation, ReplayError> {
    let miss = || ReplayError::CacheMiss {
        fingerprint: fingerprint.to_string(),
    };
    let Some(mut store) = CacheStore::open_read_only(db_path)? else {
        return Err(miss());
    };
    store.lookup(fingerprint)?.ok_or_else(miss)
}

/// Concrete values for the path placeholders
#[derive(Debug, Clone, Copy)]
pub struct ReplayPaths<'a> {
    pub output: &'a str,
    pub importcfg: &'a str,
}

/// Turn stored arguments into a linker argv.
pub fn resolve_arguments(
    arguments: &[Argument],
    entry: Option<&Artifact>,
    paths: ReplayPaths<'_>,
) -> Result<Vec<String>, ReplayError> {
    arguments
        .iter()
        .enumerate()
        .map(|(position, arg)| match arg {
            Argument::Literal(token) => Ok(token.clone()),
            Argument::OutputPath => Ok(paths.output.to_string()),
            Argument::ImportcfgPath => Ok(paths.importcfg.to_string()),
            Argument::MainPackage => entry
                .map(|a| a.file.clone())
                .ok_or(ReplayError::MissingEntryArtifact { position }),
        })
        .collect()
}

/// Temporary files and argv of a link about to run
#[derive(Debug)]
pub struct PreparedLink {
    manifest: TempPath,
    output: TempPath,
    args: Vec<String>,
}

impl PreparedLink {
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Remove the manifest (failure only logged) and keep the binary.
    pub fn finish(self) -> Result<PathBuf, ReplayError> {
        let manifest_path = self.manifest.to_path_buf();
        if let Err(e) = self.manifest.close() {
            warn!("unable to remove manifest {}: {}", manifest_path.display(), e);
        }
        self.output.keep().map_err(|e| ReplayError::TempFile {
            what: "keep linked binary",
            source: e.error,
        })
    }
}

/// Write the manifest and allocate the output path.
pub fn prepare(invocation: &CachedInvocation, program: &str) -> Result<PreparedLink, ReplayError> {
    let temp_err = |what: &'static str| move |source: std::io::Error| ReplayError::TempFile { what, source };

    let mut manifest = Builder::new()
        .prefix(MANIFEST_PREFIX)
        .tempfile()
        .map_err(temp_err("create manifest"))?;
    for line in invocation.manifest() {
        writeln!(manifest, "{}", line).map_err(temp_err("write manifest"))?;
    }
    manifest.flush().map_err(temp_err("write manifest"))?;
    let manifest = manifest.into_temp_path();

    let output = Builder::new()
        .prefix(&output_prefix(program))
        .tempfile()
        .map_err(temp_err("create output"))?
        .into_temp_path();

    let output_str = output.to_string_lossy().into_owned();
    let manifest_str = manifest.to_string_lossy().into_owned();
    let args = resolve_arguments(
        &invocation.arguments,
        invocation.entry_artifact.as_ref(),
        ReplayPaths {
            output: &output_str,
            importcfg: &manifest_str,
        },
    )?;
    debug!("manifest {} ({} lines)", manifest.display(), invocation.manifest().len());

    Ok(PreparedLink {
        manifest,
        output,
        args,
    })
}

/// Base name of the program, used to make the temp binary recognizable
fn output_prefix(program: &str) -> String {
    let name = Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}.", if name.is_empty() { "relink" } else { name.as_str() })
}

/// Run the linker on a prepared link.
pub fn link(linker: &Path, prepared: &PreparedLink) -> Result<(), ReplayError> {
    info!("running {} {}", linker.display(), prepared.args.join(" "));
    let output = Command::new(linker)
        .args(&prepared.args)
        .output()
        .map_err(|source| ReplayError::LinkerLaunch {
            linker: linker.to_path_buf(),
            source,
        })?;

    if !output.status.success() {
        return Err(ReplayError::LinkerFailed {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    if !output.stdout.is_empty() {
        debug!("linker output: {}", String::from_utf8_lossy(&output.stdout).trim_end());
    }
    Ok(())
}

/// Look up, link and return the path of the new binary.
pub fn relink(db_path: &Path, fingerprint: &Fingerprint, linker: &Path) -> Result<PathBuf, ReplayError> {
    let invocation = load(db_path, fingerprint)?;
    let prepared = prepare(&invocation, fingerprint.program())?;
    link(linker, &prepared)?;
    let binary = prepared.finish()?;
    info!("linked {} to {}", fingerprint, binary.display());
    Ok(binary)
}

/// What `--explain` prints instead of linking
#[derive(Debug, Clone, Serialize)]
pub struct ReplayPlan {
    pub fingerprint: Fingerprint,
    pub invocation_id: i64,
    pub captured_at: String,
    pub linker: PathBuf,
    /// Linker argv with `$OUTPUT` and `$IMPORTCFG` standing in for the
    /// temporary paths
    pub args: Vec<String>,
    pub entry_artifact: Option<Artifact>,
    pub manifest: Vec<String>,
    /// Config layers the settings came from, lowest precedence first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub config_sources: Vec<ConfigSource>,
}

pub const OUTPUT_PLACEHOLDER: &str = "$OUTPUT";
pub const IMPORTCFG_PLACEHOLDER: &str = "$IMPORTCFG";

impl ReplayPlan {
    pub fn build(
        fingerprint: &Fingerprint,
        linker: &Path,
        invocation: &CachedInvocation,
    ) -> Result<Self, ReplayError> {
        let args = resolve_arguments(
            &invocation.arguments,
            invocation.entry_artifact.as_ref(),
            ReplayPaths {
                output: OUTPUT_PLACEHOLDER,
                importcfg: IMPORTCFG_PLACEHOLDER,
            },
        )?;
        Ok(Self {
            fingerprint: fingerprint.clone(),
            invocation_id: invocation.invocation_id,
            captured_at: invocation.captured_at.clone(),
            linker: linker.to_path_buf(),
            args,
            entry_artifact: invocation.entry_artifact.clone(),
            manifest: invocation.manifest(),
            config_sources: Vec::new(),
        })
    }

    /// Attach the config provenance shown alongside the plan.
    pub fn with_config_sources(mut self, sources: &[ConfigSource]) -> Self {
        self.config_sources = sources.to_vec();
        self
    }

    /// Plain-text rendering
    pub fn to_human(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Program:   {}\n", self.fingerprint.program()));
        if !self.fingerprint.tags().is_empty() {
            out.push_str(&format!("Tags:      {}\n", self.fingerprint.tags()));
        }
        out.push_str(&format!("Captured:  {}\n", self.captured_at));
        if let Some(entry) = &self.entry_artifact {
            out.push_str(&format!("Entry:     {} ({})\n", entry.package, entry.file));
        }
        out.push_str(&format!("\nLink:\n  {} {}\n", self.linker.display(), self.args.join(" ")));
        out.push_str(&format!("\nManifest ({} lines):\n", self.manifest.len()));
        for line in &self.manifest {
            out.push_str(&format!("  {}\n", line));
        }
        if !self.config_sources.is_empty() {
            out.push_str("\nConfig:\n");
            for source in &self.config_sources {
                out.push_str(&format!("  {}\n", source));
            }
        }
        out
    }
}

/// Replay errors
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("no cached link invocation for {fingerprint}")]
    CacheMiss { fingerprint: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("argument {position} refers to the entry artifact, but none is recorded")]
    MissingEntryArtifact { position: usize },

    #[error("unable to {what}: {source}")]
    TempFile {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to run linker {linker}: {source}")]
    LinkerLaunch {
        linker: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("linker exited with {}", .code.map_or_else(|| "a signal".to_string(), |c| format!("status {}", c)))]
    LinkerFailed { code: Option<i32>, stderr: String },

    #[error("unable to execute {path}: {source}")]
    Handoff {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReplayError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ReplayError::CacheMiss { .. } => ExitCode::CacheMiss.as_i32(),
            ReplayError::Store(e) => store_exit_code(e),
            ReplayError::MissingEntryArtifact { .. } => ExitCode::Storage.as_i32(),
            ReplayError::LinkerFailed { code, .. } => code.unwrap_or(ExitCode::Fatal.as_i32()),
            ReplayError::TempFile { .. }
            | ReplayError::LinkerLaunch { .. }
            | ReplayError::Handoff { .. } => ExitCode::Fatal.as_i32(),
        }
    }

    /// Linker diagnostics to pass through unchanged, if any
    pub fn child_output(&self) -> Option<&str> {
        match self {
            ReplayError::LinkerFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}
