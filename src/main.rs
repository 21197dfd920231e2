//! relink-capture CLI
//!
//! Runs a `go build` with tracing and stores its link step.

use clap::Parser;
use relink::capture::{run_capture, CaptureOptions, CaptureReport};
use relink::config::{CliOverrides, ConfigPaths, EffectiveConfig};
use relink::exit::ExitCode;
use relink::logging;
use relink::toolchain::{BuildCommand, GoDriver};
use relink_store::{RecapturePolicy, TagSet};
use std::io::Write;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "relink-capture")]
#[command(about = "Capture the link step of a go build for later replay", version)]
struct Cli {
    /// Cache database file (default: link.db)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Build tags for the fingerprint, comma-separated (default: the command's -tags)
    #[arg(long, value_delimiter = ',')]
    tags: Option<Vec<String>>,

    /// Replace a previous capture of the same fingerprint instead of adding to it
    #[arg(long)]
    replace: bool,

    /// Builds to try before giving up on a stable cache (default: 3)
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Project config file (default: ./relink.toml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// 0 = warnings, 1 = info, 2 = debug
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
    log_level: Option<u8>,

    /// Print the capture summary as JSON
    #[arg(long)]
    json: bool,

    /// The go build command (after --)
    #[arg(last = true, required = true)]
    cmd: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    let overrides = CliOverrides {
        db: cli.db.clone(),
        log_level: cli.log_level,
        max_attempts: cli.max_attempts,
        recapture: cli.replace.then_some(RecapturePolicy::Replace),
    };
    let config = match EffectiveConfig::build(&ConfigPaths::discover(cli.config.clone()), &overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(ExitCode::Usage.as_i32());
        }
    };
    logging::init(config.settings.log_level);

    let command = match BuildCommand::parse(&cli.cmd) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Usage: relink-capture [OPTIONS] -- go build -o OUTPUT [build flags] [packages]");
            process::exit(ExitCode::Usage.as_i32());
        }
    };

    let options = CaptureOptions::from_settings(&config.settings, cli.tags.clone().map(TagSet::new));
    match run_capture(&GoDriver, &command, &options) {
        Ok(summary) => {
            if cli.json {
                match serde_json::to_string_pretty(&CaptureReport::new(summary, &config.sources)) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error serializing output: {}", e);
                        process::exit(ExitCode::Fatal.as_i32());
                    }
                }
            } else {
                for inv in &summary.invocations {
                    println!(
                        "cached {} (invocation {}): {} arguments, {} artifacts, {} manifest lines",
                        summary.fingerprint, inv.invocation_id, inv.arguments, inv.artifacts, inv.manifest_lines
                    );
                }
            }
        }
        Err(e) => {
            if let Some(output) = e.child_output() {
                let _ = std::io::stderr().write_all(output.as_bytes());
            }
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}
