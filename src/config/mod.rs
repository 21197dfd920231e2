//! Layered configuration
//!
//! Lowest to highest precedence:
//! 1. Built-in defaults
//! 2. User config (~/.config/relink/config.toml)
//! 3. Project config (./relink.toml, or the file given with --config)
//! 4. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::{builtin_layer, DEFAULT_DB, DEFAULT_MAX_ATTEMPTS};
pub use effective::{
    CliOverrides, ConfigError, ConfigOrigin, ConfigPaths, ConfigSource, EffectiveConfig, Settings,
};
pub use merge::{merge_into, merge_layers};
