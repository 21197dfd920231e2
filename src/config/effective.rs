//! Merged settings with the list of files that contributed to them

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use relink_store::RecapturePolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::defaults::builtin_layer;
use super::merge::merge_layers;

/// Where a layer came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    User,
    Project,
    Cli,
}

/// One contributing layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfigOrigin::Builtin => "builtin",
            ConfigOrigin::User => "user",
            ConfigOrigin::Project => "project",
            ConfigOrigin::Cli => "cli",
        };
        f.pad(name)
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{:<8} {}", self.origin, path)?,
            None => write!(f, "{}", self.origin)?,
        }
        if let Some(digest) = &self.digest {
            write!(f, " (sha256 {})", digest.get(..12).unwrap_or(digest))?;
        }
        Ok(())
    }
}

/// Typed view of the merged layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Cache database file
    pub db: PathBuf,
    /// 0 = warnings, 1 = info, 2 = debug
    pub log_level: u8,
    /// Upper bound on warming-loop build attempts
    pub max_attempts: u32,
    /// What a second capture of the same fingerprint does
    pub recapture: RecapturePolicy,
}

/// Flag values that override every file layer; unset flags are skipped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recapture: Option<RecapturePolicy>,
}

/// Config file locations to consult
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// `~/.config/relink/config.toml`; skipped when absent
    pub user: Option<PathBuf>,
    /// `./relink.toml`; skipped when absent
    pub project: Option<PathBuf>,
    /// `--config FILE`; replaces `project` and must exist
    pub explicit: Option<PathBuf>,
}

impl ConfigPaths {
    pub const USER_RELATIVE: &'static str = ".config/relink/config.toml";
    pub const PROJECT_FILE: &'static str = "relink.toml";

    /// Standard locations, with `explicit` standing in for the project file.
    pub fn discover(explicit: Option<PathBuf>) -> Self {
        let user = std::env::var_os("HOME").map(|home| PathBuf::from(home).join(Self::USER_RELATIVE));
        Self {
            user,
            project: Some(PathBuf::from(Self::PROJECT_FILE)),
            explicit,
        }
    }
}

/// Result of merging every layer
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub settings: Settings,
    /// Layers in precedence order, lowest first
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Merge built-in defaults, the config files in `paths`, and `cli`.
    pub fn build(paths: &ConfigPaths, cli: &CliOverrides) -> Result<Self, ConfigError> {
        let mut layers = vec![builtin_layer()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = paths.user.as_deref().filter(|p| p.exists()) {
            let (value, digest) = load_toml_file(path)?;
            layers.push(value);
            sources.push(file_source(ConfigOrigin::User, path, digest));
        }

        let project = match &paths.explicit {
            Some(path) if !path.exists() => return Err(ConfigError::MissingFile(path.clone())),
            Some(path) => Some(path.as_path()),
            None => paths.project.as_deref().filter(|p| p.exists()),
        };
        if let Some(path) = project {
            let (value, digest) = load_toml_file(path)?;
            layers.push(value);
            sources.push(file_source(ConfigOrigin::Project, path, digest));
        }

        let cli_value = serde_json::to_value(cli).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if cli_value.as_object().is_some_and(|m| !m.is_empty()) {
            layers.push(cli_value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let settings: Settings =
            serde_json::from_value(merged).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        validate(&settings)?;

        debug!("effective settings {:?} from {} layers", settings, sources.len());
        Ok(Self { settings, sources })
    }

    /// Defaults only, no files consulted
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::build(&ConfigPaths::default(), &CliOverrides::default())
    }
}

fn file_source(origin: ConfigOrigin, path: &Path, digest: String) -> ConfigSource {
    ConfigSource {
        origin,
        path: Some(path.display().to_string()),
        digest: Some(digest),
    }
}

/// Read a TOML file as JSON plus the digest of its bytes
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let digest = hex::encode(Sha256::digest(&bytes));

    let text = String::from_utf8(bytes).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: format!("invalid UTF-8: {}", e),
    })?;
    let table: toml::Table = toml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    Ok((toml_to_json(toml::Value::Table(table)), digest))
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_json(value)))
                .collect(),
        ),
    }
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.max_attempts == 0 {
        return Err(ConfigError::Invalid("max_attempts must be at least 1".to_string()));
    }
    if settings.log_level > 2 {
        return Err(ConfigError::Invalid(format!(
            "log_level must be 0, 1 or 2 (got {})",
            settings.log_level
        )));
    }
    if settings.db.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("db must not be empty".to_string()));
    }
    Ok(())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("config file {0} does not exist")]
    MissingFile(PathBuf),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
