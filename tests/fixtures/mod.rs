//! Shared fixtures: canned `go build -x` traces and a scripted driver.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;

use relink::toolchain::{BuildCommand, BuildDriver, ToolchainEnv, ToolchainError};

pub const TOOL_DIR: &str = "/usr/local/go/pkg/tool/linux_amd64";
pub const GOCACHE: &str = "/home/dev/.cache/go-build";

/// Link line of [`warm_trace`] after variable substitution
pub const WARM_LINK_LINE: &str = "-o /tmp/go-build42/b001/exe/a.out -importcfg /tmp/go-build42/b001/importcfg.link -buildmode=exe -buildid=Qm9v/YmFy -extld=gcc /home/dev/.cache/go-build/3c/3c1f-d";

/// Trace of a build where every archive is already in the build cache
pub fn warm_trace() -> String {
    format!(
        r#"WORK=/tmp/go-build42
mkdir -p $WORK/b001/
cat >$WORK/b001/importcfg.link << 'EOF' # internal
packagefile example.com/hello=/home/dev/.cache/go-build/3c/3c1f-d
packagefile fmt=/home/dev/.cache/go-build/8a/8a2e-d
packagefile runtime=/home/dev/.cache/go-build/51/51aa-d
modinfo "0w\xaf\f\x92t\b\x02A\x10path\texample.com/hello\n"
EOF
mkdir -p $WORK/b001/exe/
cd .
{TOOL_DIR}/link -o $WORK/b001/exe/a.out -importcfg $WORK/b001/importcfg.link -buildmode=exe -buildid=Qm9v/YmFy -extld=gcc /home/dev/.cache/go-build/3c/3c1f-d
{TOOL_DIR}/buildid -w $WORK/b001/exe/a.out # internal
mv $WORK/b001/exe/a.out hello
rm -r $WORK/b001/
"#
    )
}

/// Trace of a cold build: the main package still lives in the scratch dir
pub fn cold_trace() -> String {
    format!(
        r#"WORK=/tmp/go-build41
mkdir -p $WORK/b001/
cat >$WORK/b001/importcfg << 'EOF' # internal
# import config
packagefile fmt=/home/dev/.cache/go-build/8a/8a2e-d
EOF
cd /src/hello
{TOOL_DIR}/compile -o $WORK/b001/_pkg_.a -trimpath "$WORK/b001=>" -p main -importcfg $WORK/b001/importcfg -pack ./main.go
cat >$WORK/b001/importcfg.link << 'EOF' # internal
packagefile example.com/hello=$WORK/b001/_pkg_.a
packagefile fmt=/home/dev/.cache/go-build/8a/8a2e-d
packagefile runtime=/home/dev/.cache/go-build/51/51aa-d
EOF
mkdir -p $WORK/b001/exe/
{TOOL_DIR}/link -o $WORK/b001/exe/a.out -importcfg $WORK/b001/importcfg.link -buildmode=exe $WORK/b001/_pkg_.a
mv $WORK/b001/exe/a.out hello
"#
    )
}

/// Trace of a library build: compiles, never links
pub fn library_trace() -> String {
    format!(
        "WORK=/tmp/go-build43\nmkdir -p $WORK/b001/\n{TOOL_DIR}/compile -o $WORK/b001/_pkg_.a -p example.com/lib ./lib.go\n"
    )
}

pub fn toolchain() -> ToolchainEnv {
    ToolchainEnv::new(TOOL_DIR, GOCACHE)
}

/// Driver that hands out canned traces in order and counts builds
pub struct ScriptedDriver {
    traces: RefCell<VecDeque<String>>,
    pub builds: RefCell<u32>,
    pub env_queries: RefCell<u32>,
}

impl ScriptedDriver {
    pub fn new(traces: Vec<String>) -> Self {
        Self {
            traces: RefCell::new(traces.into()),
            builds: RefCell::new(0),
            env_queries: RefCell::new(0),
        }
    }

    pub fn builds(&self) -> u32 {
        *self.builds.borrow()
    }
}

impl BuildDriver for ScriptedDriver {
    fn toolchain_env(&self, _tool: &str) -> Result<ToolchainEnv, ToolchainError> {
        *self.env_queries.borrow_mut() += 1;
        Ok(toolchain())
    }

    fn traced_build(&self, command: &BuildCommand) -> Result<String, ToolchainError> {
        *self.builds.borrow_mut() += 1;
        self.traces
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| ToolchainError::Failed {
                program: command.tool().to_string(),
                code: Some(1),
                output: "no more scripted traces\n".to_string(),
            })
    }
}

pub fn build_command(output: &str, extra: &[&str]) -> BuildCommand {
    let mut argv: Vec<String> = vec!["go".into(), "build".into(), "-o".into(), output.into()];
    argv.extend(extra.iter().map(|s| s.to_string()));
    argv.push(".".into());
    BuildCommand::parse(&argv).unwrap()
}
