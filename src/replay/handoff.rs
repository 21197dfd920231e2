//! Transfer control to the freshly linked binary

use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

use log::debug;

use super::ReplayError;

/// Run `binary` as `program` with `args` and the inherited environment.
///
/// On Unix the current process image is replaced, so this only returns on
/// failure. Elsewhere the binary runs as a child with inherited stdio and
/// its exit status is returned for the caller to exit with.
pub fn hand_off(binary: &Path, program: &str, args: &[OsString]) -> Result<i32, ReplayError> {
    debug!("handing off to {} as {:?} with {} argument(s)", binary.display(), program, args.len());
    let mut command = Command::new(binary);
    command.args(args);
    run(command, binary, program)
}

#[cfg(unix)]
fn run(mut command: Command, binary: &Path, program: &str) -> Result<i32, ReplayError> {
    use std::os::unix::process::CommandExt;

    let source = command.arg0(program).exec();
    Err(ReplayError::Handoff {
        path: binary.to_path_buf(),
        source,
    })
}

#[cfg(not(unix))]
fn run(mut command: Command, binary: &Path, _program: &str) -> Result<i32, ReplayError> {
    let status = command.status().map_err(|source| ReplayError::Handoff {
        path: binary.to_path_buf(),
        source,
    })?;
    Ok(status.code().unwrap_or(1))
}
