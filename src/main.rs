//! insserv binary.
//!
//! Enables or removes init scripts by maintaining their runlevel links.

use anyhow::Context;
use buckos_insserv::{resolve_targets, Engine, RunConfig, RunReport};
use clap::Parser;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "insserv",
    about = "Enable an installed init script by ordering its runlevel links",
    version,
    author
)]
struct Cli {
    /// Init scripts or an init directory, optionally `name,start=LEVELS,stop=LEVELS`
    scripts: Vec<String>,

    /// Remove the listed scripts from their runlevels
    #[arg(short, long)]
    remove: bool,

    /// Ignore failed dependency checks
    #[arg(short, long)]
    force: bool,

    /// Use the header defaults, dropping links they do not ask for
    #[arg(short, long)]
    default: bool,

    /// Show what would change without touching anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Print the dry-run report as JSON
    #[arg(long)]
    json: bool,

    /// Init script directory
    #[arg(short, long, value_name = "INIT_DIR")]
    path: Option<PathBuf>,

    /// Facility configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run settings in TOML
    #[arg(long, value_name = "TOML")]
    settings: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn run_config(&self) -> anyhow::Result<RunConfig> {
        let mut config = match &self.settings {
            Some(path) => RunConfig::from_file(path)
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => RunConfig::default(),
        };

        if let Some(path) = &self.path {
            config.init_dir = path.clone();
        }
        if let Some(file) = &self.config {
            config.facility_file = file.clone();
        }
        config.remove |= self.remove;
        config.force |= self.force;
        config.defaults |= self.default;
        config.dry_run |= self.dry_run;
        Ok(config)
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for action in &report.actions {
        println!("{}", action);
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = cli.run_config()?;
    let targets = resolve_targets(&cli.scripts, &mut config)?;
    debug!(config = ?config, "Resolved configuration");

    let dry_run = config.dry_run;
    let report = Engine::new(config, targets).run()?;

    if dry_run || cli.json {
        print_report(&report, cli.json)?;
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("insserv: {:#}", err);
        std::process::exit(1);
    }
}
