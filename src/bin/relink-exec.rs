//! relink-exec CLI
//!
//! Relinks a captured program and runs it in place of this process.

use clap::Parser;
use relink::config::{CliOverrides, ConfigPaths, EffectiveConfig};
use relink::exit::ExitCode;
use relink::logging;
use relink::replay::{self, ReplayError, ReplayPlan};
use relink_store::{Fingerprint, TagSet};
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "relink-exec")]
#[command(about = "Relink a captured go program and run it", version)]
struct Cli {
    /// Cache database file (default: link.db)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Build tags the program was captured with, comma-separated
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    /// Linker executable ($GOTOOLDIR/link)
    #[arg(long)]
    link: PathBuf,

    /// Print the reconstructed link step instead of running it
    #[arg(long)]
    explain: bool,

    /// With --explain: human-readable output instead of JSON
    #[arg(long, requires = "explain")]
    human: bool,

    /// Project config file (default: ./relink.toml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// 0 = warnings, 1 = info, 2 = debug
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
    log_level: Option<u8>,

    /// Program name (exactly as given to -o at capture time), then the
    /// arguments passed to it; nothing after the name is read as a flag
    #[arg(
        value_name = "PROGRAM [ARGS]...",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<OsString>,
}

impl Cli {
    /// Program name and its arguments
    fn program(&self) -> (String, &[OsString]) {
        match self.command.split_first() {
            Some((program, args)) => (program.to_string_lossy().into_owned(), args),
            None => (String::new(), &[]),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let overrides = CliOverrides {
        db: cli.db.clone(),
        log_level: cli.log_level,
        ..Default::default()
    };
    let config = match EffectiveConfig::build(&ConfigPaths::discover(cli.config.clone()), &overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(ExitCode::Usage.as_i32());
        }
    };
    logging::init(config.settings.log_level);

    let (program, args) = cli.program();
    let fingerprint = Fingerprint::new(program.as_str(), TagSet::new(&cli.tags));
    let db = &config.settings.db;

    if cli.explain {
        run_explain(db, &fingerprint, &cli, &config);
    }

    let binary = match replay::relink(db, &fingerprint, &cli.link) {
        Ok(binary) => binary,
        Err(e) => fail(e),
    };
    match replay::hand_off(&binary, &program, args) {
        Ok(code) => process::exit(code),
        Err(e) => fail(e),
    }
}

fn run_explain(db: &std::path::Path, fingerprint: &Fingerprint, cli: &Cli, config: &EffectiveConfig) -> ! {
    let plan = replay::load(db, fingerprint)
        .and_then(|invocation| ReplayPlan::build(fingerprint, &cli.link, &invocation))
        .map(|plan| plan.with_config_sources(&config.sources));
    let plan = match plan {
        Ok(plan) => plan,
        Err(e) => fail(e),
    };

    if cli.human {
        print!("{}", plan.to_human());
    } else {
        match serde_json::to_string_pretty(&plan) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(ExitCode::Fatal.as_i32());
            }
        }
    }
    process::exit(ExitCode::Success.as_i32());
}

fn fail(e: ReplayError) -> ! {
    if let Some(output) = e.child_output() {
        let _ = std::io::stderr().write_all(output.as_bytes());
    }
    eprintln!("Error: {}", e);
    process::exit(e.exit_code());
}
