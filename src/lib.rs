//! relink: capture a Go program's link step once, replay it directly later.
//!
//! `relink-capture` runs `go build -x`, pulls the linker invocation and its
//! manifest out of the trace and stores them keyed by program name and
//! build tags. `relink-exec` rebuilds that invocation with fresh temporary
//! paths, runs the linker and then becomes the linked program.

pub mod capture;
pub mod config;
pub mod exit;
pub mod logging;
pub mod replay;
pub mod toolchain;

pub use capture::{run_capture, CaptureError, CaptureOptions};
pub use config::{CliOverrides, ConfigError, ConfigPaths, EffectiveConfig, Settings};
pub use exit::ExitCode;
pub use replay::{ReplayError, ReplayPlan};
pub use toolchain::{BuildCommand, BuildDriver, GoDriver, ToolchainEnv, ToolchainError};
