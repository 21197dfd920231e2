//! Go toolchain access
//!
//! Two subprocesses are involved in a capture:
//! - `<tool> env -json`, queried once for `GOTOOLDIR` and `GOCACHE`
//! - `<tool> build -x ...`, whose combined output is the trace
//!
//! Both sit behind [`BuildDriver`] so the capture loop can be driven with
//! canned traces.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};
use serde::Serialize;

/// Subcommand a capturable command line must start with
pub const BUILD_SUBCOMMAND: &str = "build";

/// Flag that turns on the command trace
pub const TRACE_FLAG: &str = "-x";

/// Linker binary name inside `GOTOOLDIR`
pub const LINKER_NAME: &str = "link";

/// Toolchain paths, computed once and passed to whoever needs them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainEnv {
    /// `GOTOOLDIR`: holds the compiler and linker
    pub tool_dir: PathBuf,
    /// `GOCACHE`: the persistent content-addressed build cache
    pub cache_dir: PathBuf,
}

impl ToolchainEnv {
    pub fn new(tool_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool_dir: tool_dir.into(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Pick the needed variables out of an environment map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ToolchainError> {
        let get = |name: &'static str| {
            vars.get(name)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or(ToolchainError::MissingVar(name))
        };
        Ok(Self::new(get("GOTOOLDIR")?, get("GOCACHE")?))
    }

    /// Parse the output of `go env -json`.
    pub fn from_json(json: &str) -> Result<Self, ToolchainError> {
        let vars: HashMap<String, String> = serde_json::from_str(json)?;
        Self::from_vars(&vars)
    }

    /// `$GOTOOLDIR/link`
    pub fn linker_path(&self) -> PathBuf {
        self.tool_dir.join(LINKER_NAME)
    }

    /// Whether `file` lives under the build cache (component-wise prefix).
    pub fn in_cache(&self, file: &str) -> bool {
        Path::new(file).starts_with(&self.cache_dir)
    }
}

/// A `go build` command line accepted for capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildCommand {
    argv: Vec<String>,
    output: String,
    tags: Option<Vec<String>>,
}

impl BuildCommand {
    /// Validate `argv` (`<tool> build ... -o OUT ...`) and pull out the
    /// output path and any `-tags` value.
    pub fn parse(argv: &[String]) -> Result<Self, ToolchainError> {
        if argv.len() < 2 || argv[1] != BUILD_SUBCOMMAND {
            return Err(ToolchainError::NotABuild(argv.join(" ")));
        }

        let mut output = None;
        let mut tags = None;
        let mut rest = argv[2..].iter();
        while let Some(arg) = rest.next() {
            match arg.as_str() {
                "-o" => {
                    let value = rest.next().ok_or(ToolchainError::MissingValue("-o"))?;
                    output = Some(value.clone());
                }
                "-tags" | "--tags" => {
                    let value = rest.next().ok_or(ToolchainError::MissingValue("-tags"))?;
                    tags = Some(split_tags(value));
                }
                other => {
                    if let Some(value) = other.strip_prefix("-o=") {
                        output = Some(value.to_string());
                    } else if let Some(value) = other
                        .strip_prefix("-tags=")
                        .or_else(|| other.strip_prefix("--tags="))
                    {
                        tags = Some(split_tags(value));
                    }
                }
            }
        }

        let output = output
            .filter(|o| !o.is_empty())
            .ok_or(ToolchainError::MissingOutput)?;
        Ok(Self {
            argv: argv.to_vec(),
            output,
            tags,
        })
    }

    /// Build tool executable (normally `go`)
    pub fn tool(&self) -> &str {
        &self.argv[0]
    }

    /// Value of `-o`, exactly as given
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Program name used in the fingerprint: the output path as given
    pub fn program_name(&self) -> &str {
        &self.output
    }

    /// Tags from the command's own `-tags` flag
    pub fn tags(&self) -> Option<&[String]> {
        self.tags.as_deref()
    }

    /// Arguments for the traced rebuild: `build -x <rest>`
    pub fn traced_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.argv.len());
        args.push(BUILD_SUBCOMMAND.to_string());
        args.push(TRACE_FLAG.to_string());
        args.extend(self.argv[2..].iter().cloned());
        args
    }
}

fn split_tags(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// The subprocesses a capture depends on
pub trait BuildDriver {
    /// Query the toolchain environment of `tool`.
    fn toolchain_env(&self, tool: &str) -> Result<ToolchainEnv, ToolchainError>;

    /// Run the traced rebuild and return its combined stdout and stderr.
    fn traced_build(&self, command: &BuildCommand) -> Result<String, ToolchainError>;
}

/// Runs the real go command
#[derive(Debug, Clone, Copy, Default)]
pub struct GoDriver;

impl BuildDriver for GoDriver {
    fn toolchain_env(&self, tool: &str) -> Result<ToolchainEnv, ToolchainError> {
        let stdout = run_tool(tool, &["env".to_string(), "-json".to_string()])?;
        let env = ToolchainEnv::from_json(&stdout)?;
        debug!(
            "toolchain: GOTOOLDIR={} GOCACHE={}",
            env.tool_dir.display(),
            env.cache_dir.display()
        );
        Ok(env)
    }

    fn traced_build(&self, command: &BuildCommand) -> Result<String, ToolchainError> {
        let args = command.traced_args();
        info!("running {} {}", command.tool(), args.join(" "));
        let output = Command::new(command.tool())
            .args(&args)
            .output()
            .map_err(|source| ToolchainError::Launch {
                program: command.tool().to_string(),
                source,
            })?;

        let mut trace = String::from_utf8_lossy(&output.stdout).into_owned();
        trace.push_str(&String::from_utf8_lossy(&output.stderr));
        if !output.status.success() {
            return Err(ToolchainError::Failed {
                program: command.tool().to_string(),
                code: output.status.code(),
                output: trace,
            });
        }
        Ok(trace)
    }
}

/// Run `tool args...`, returning stdout; a non-zero exit carries stderr.
fn run_tool(tool: &str, args: &[String]) -> Result<String, ToolchainError> {
    let output = Command::new(tool)
        .args(args)
        .output()
        .map_err(|source| ToolchainError::Launch {
            program: tool.to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(ToolchainError::Failed {
            program: tool.to_string(),
            code: output.status.code(),
            output: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn describe_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// Toolchain errors
#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    #[error("expected `<tool> build ...`, got `{0}`")]
    NotABuild(String),

    #[error("the build command must set the output path with -o")]
    MissingOutput,

    #[error("flag {0} needs a value")]
    MissingValue(&'static str),

    #[error("unable to run {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {}", describe_status(.code))]
    Failed {
        program: String,
        code: Option<i32>,
        /// Diagnostics printed by the child, passed through verbatim
        output: String,
    },

    #[error("toolchain environment does not define {0}")]
    MissingVar(&'static str),

    #[error("unable to decode toolchain environment: {0}")]
    Env(#[from] serde_json::Error),
}

impl ToolchainError {
    /// Usage problems are caught before any subprocess runs
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            ToolchainError::NotABuild(_) | ToolchainError::MissingOutput | ToolchainError::MissingValue(_)
        )
    }

    /// Exit status of a failed child, when it produced one
    pub fn child_code(&self) -> Option<i32> {
        match self {
            ToolchainError::Failed { code, .. } => *code,
            _ => None,
        }
    }
}
