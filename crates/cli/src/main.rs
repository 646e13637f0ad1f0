//! rulegate command-line gate.
//!
//! Runs the rule-id conflict check for the repository in the current
//! directory (or `--repo`) and exits non-zero when the change reuses a rule
//! id another file already owns. `dirs` runs the same check over two plain
//! directory trees. Also provides subcommands for generating and validating
//! the configuration file.

mod render;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use rulegate_core::config::{default_config_toml, GateConfig, Policy, DEFAULT_CONFIG_FILE};
use rulegate_core::{check_repository, run_gate, GateReport, MemoryRuleSource};

use crate::style::Tone;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Fail a change that reuses a rule id another rule file already owns.
#[derive(Parser, Debug)]
#[command(
    name = "rulegate",
    version,
    about = "Detect rule id conflicts between a change and its reference branch"
)]
struct Cli {
    /// Path to the TOML configuration file [default: <repo>/rulegate.toml].
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Repository to check.
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,

    /// Rule-definitions directory, relative to the repository root.
    #[arg(long, global = true)]
    rules_dir: Option<String>,

    /// Reference branch to compare against.
    #[arg(long, global = true)]
    branch: Option<String>,

    /// Remote holding the reference branch.
    #[arg(long, global = true)]
    remote: Option<String>,

    /// Use the local remote-tracking ref without fetching.
    #[arg(long, global = true)]
    no_fetch: bool,

    /// Check every changed file instead of stopping at the first failure.
    #[arg(long, global = true)]
    all: bool,

    /// Fail when the reference branch itself declares an id in several files.
    #[arg(long, global = true)]
    strict_reference: bool,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the conflict check (the default).
    Check,

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,
    },

    /// Validate the configuration file.
    Validate,

    /// Compare two directory trees instead of a repository and its
    /// reference branch.
    Dirs {
        /// Tree holding the reference rule files (e.g. a checkout of main).
        #[arg(long)]
        reference: PathBuf,

        /// Tree holding the changed rule files.
        #[arg(long, default_value = ".")]
        working: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            println!("{}", style::line(Tone::Fail, &format!("Error: {:#}", e)));
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout carries only the report.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode> {
    match cli.command {
        Some(Commands::Init { ref output }) => cmd_init(output).map(|()| ExitCode::SUCCESS),
        Some(Commands::Validate) => cmd_validate(cli).map(|()| ExitCode::SUCCESS),
        Some(Commands::Dirs {
            ref reference,
            ref working,
        }) => cmd_dirs(cli, reference, working),
        Some(Commands::Check) | None => cmd_check(cli),
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(|| cli.repo.join(DEFAULT_CONFIG_FILE))
}

/// Load the config file (an explicit `--config` must exist) and apply
/// command-line overrides, without validating.
fn read_config(cli: &Cli) -> Result<GateConfig> {
    let path = config_path(cli);
    let mut config = match cli.config {
        Some(_) => GateConfig::load_from_file(&path),
        None => GateConfig::load_or_default(&path),
    }
    .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    apply_overrides(&mut config, cli);
    Ok(config)
}

/// The effective configuration for a check: file, overrides, validation and
/// environment references.
fn load_config(cli: &Cli) -> Result<GateConfig> {
    let mut config = read_config(cli)?;
    config.validate().context("invalid configuration")?;
    config.resolve_env_vars();
    debug!(
        rules_dir = %config.rules_dir,
        reference = %config.reference_name(),
        policy = ?config.policy,
        "effective configuration"
    );
    Ok(config)
}

fn apply_overrides(config: &mut GateConfig, cli: &Cli) {
    if let Some(ref dir) = cli.rules_dir {
        config.rules_dir = dir.clone();
    }
    if let Some(ref branch) = cli.branch {
        config.reference_branch = branch.clone();
    }
    if let Some(ref remote) = cli.remote {
        config.remote = remote.clone();
    }
    if cli.no_fetch {
        config.fetch = false;
    }
    if cli.all {
        config.policy = Policy::CollectAll;
    }
    if cli.strict_reference {
        config.strict_reference = true;
    }
    config.normalize();
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_check(cli: &Cli) -> Result<ExitCode> {
    let config = load_config(cli)?;
    let report = check_repository(&cli.repo, &config)
        .with_context(|| format!("cannot check against {}", config.reference_name()))?;
    emit(cli, &report)
}

fn compare_dirs(cli: &Cli, reference: &Path, working: &Path) -> Result<GateReport> {
    let config = load_config(cli)?;
    let mut source = MemoryRuleSource::from_dirs(reference, working)
        .context("cannot load directory trees")?;
    run_gate(&mut source, &config)
        .with_context(|| format!("cannot check against {}", reference.display()))
}

fn cmd_dirs(cli: &Cli, reference: &Path, working: &Path) -> Result<ExitCode> {
    let report = compare_dirs(cli, reference, working)?;
    emit(cli, &report)
}

/// Print `report` in the requested format and map it to the exit code.
fn emit(cli: &Cli, report: &GateReport) -> Result<ExitCode> {
    match cli.format {
        OutputFormat::Text => println!("{}", render::render_text(report, cli.verbose > 0)),
        OutputFormat::Json => println!(
            "{}",
            report.to_json().context("failed to serialize report")?
        ),
    }
    Ok(ExitCode::from(report.exit_code()))
}

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, default_config_toml()).context("failed to write config file")?;

    println!(
        "{}",
        style::line(
            Tone::Pass,
            &format!("Default configuration written to {}", output.display())
        )
    );
    println!();
    println!("Next steps:");
    println!("  1. Point rules_dir at your rule-definitions directory");
    println!("  2. Set reference_branch to the branch pull requests merge into");
    println!(
        "  3. Validate with: rulegate validate --config {}",
        output.display()
    );
    Ok(())
}

fn cmd_validate(cli: &Cli) -> Result<()> {
    let path = config_path(cli);
    println!("Validating configuration: {}", path.display());
    println!();

    let mut config = read_config(cli)?;
    println!("  {}", style::line(Tone::Pass, "TOML structure is valid"));

    config.resolve_env_vars();
    println!(
        "  {}",
        style::line(Tone::Pass, "Environment variable references processed")
    );

    if let Err(e) = config.validate() {
        println!(
            "  {}",
            style::line(Tone::Fail, &format!("Validation error: {}", e))
        );
        anyhow::bail!("configuration validation failed");
    }
    println!("  {}", style::line(Tone::Pass, "All fields are valid"));

    println!();
    println!("{}", style::heading("Configuration summary:"));
    println!("  Rules directory : {}", config.rules_dir);
    println!("  Extension       : .{}", config.extension);
    println!("  Recursive       : {}", config.recursive);
    println!(
        "  Exclude         : {}",
        if config.exclude.is_empty() {
            "none".to_string()
        } else {
            config.exclude.join(", ")
        }
    );
    println!("  Reference       : {}", config.reference_name());
    println!("  Fetch           : {}", config.fetch);
    println!(
        "  Policy          : {}",
        match config.policy {
            Policy::FailFast => "fail fast",
            Policy::CollectAll => "collect all",
        }
    );
    println!("  Strict reference: {}", config.strict_reference);
    println!(
        "  Fetch token     : {}",
        match (&config.token_env, &config.token) {
            (None, _) => "not configured",
            (Some(_), Some(_)) => "set",
            (Some(_), None) => "NOT SET",
        }
    );
    println!();
    println!("Configuration is valid.");
    Ok(())
}
