//! CLI Command Handlers
//!
//! Implementation of all CLI commands for the regime trader.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapters::recorder::JsonlRecorder;
use crate::adapters::replay::{classify_bars, load_bars, run_session, SessionOptions, SessionSummary};
use crate::config::{load_config, Config};
use crate::domain::RegimeSnapshot;

/// Regime-gated trading decision engine
#[derive(Parser, Debug)]
#[command(
    name = "regime-trader",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Regime-gated trading decision engine",
    long_about = "Classifies the market regime across three timeframes and only lets a \
                  signal through when the chain of checks for that regime passes."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a bar file through the engine on a paper account
    Run(RunCmd),

    /// Print the regime after a bar file has closed
    Classify(ClassifyCmd),

    /// Load and validate a configuration file
    CheckConfig(CheckConfigCmd),
}

impl Command {
    pub fn config_path(&self) -> &Path {
        match self {
            Command::Run(cmd) => &cmd.config,
            Command::Classify(cmd) => &cmd.config,
            Command::CheckConfig(cmd) => &cmd.config,
        }
    }
}

/// Replay run
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: PathBuf,

    /// JSON-lines bar file in the configured base timeframe
    #[arg(short, long, value_name = "FILE")]
    pub bars: PathBuf,

    /// Paper account starting balance
    #[arg(long, value_name = "AMOUNT", default_value = "10000")]
    pub balance: f64,

    /// Base bars closed before the first decision
    #[arg(long, value_name = "BARS", default_value = "0")]
    pub warmup: usize,

    /// Record accepted signals as PASSED without placing orders
    #[arg(long)]
    pub no_submit: bool,

    /// Override the decision file from the config
    #[arg(long, value_name = "FILE")]
    pub decisions: Option<PathBuf>,
}

/// Regime classification over a bar file
#[derive(Parser, Debug)]
pub struct ClassifyCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: PathBuf,

    /// JSON-lines bar file in the configured base timeframe
    #[arg(short, long, value_name = "FILE")]
    pub bars: PathBuf,

    /// Output format (text, json)
    #[arg(short, long, value_name = "FORMAT", default_value = "text")]
    pub format: String,
}

/// Configuration check
#[derive(Parser, Debug)]
pub struct CheckConfigCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: PathBuf,
}

/// Execute the parsed command
pub async fn execute(app: CliApp) -> Result<()> {
    let path = app.command.config_path().to_path_buf();
    let loaded = load_config(&path);
    let level = loaded.as_ref().map(|c| c.logging.level.clone()).unwrap_or_else(|_| "info".to_string());
    init_logging(app.verbose, app.debug, &level)?;

    let config = loaded.with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    match app.command {
        Command::Run(cmd) => run_command(cmd, config).await,
        Command::Classify(cmd) => classify_command(cmd, config),
        Command::CheckConfig(cmd) => check_config_command(cmd, config),
    }
}

/// Initialize logging system. `RUST_LOG` wins over the flags, the flags over `level`.
pub fn init_logging(verbose: bool, debug: bool, level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let fallback = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        level
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Handle run command
async fn run_command(cmd: RunCmd, config: Config) -> Result<()> {
    tracing::info!("Starting regime-trader replay for {}", config.instrument.symbol);
    tracing::info!("Config: {}", cmd.config.display());

    let bars = load_bars(&cmd.bars).with_context(|| format!("Failed to load bars from {}", cmd.bars.display()))?;
    let decisions = cmd.decisions.clone().unwrap_or_else(|| config.recorder.resolved_path());
    let recorder = JsonlRecorder::open(&decisions)
        .with_context(|| format!("Failed to open decision file {}", decisions.display()))?;

    if cmd.no_submit {
        tracing::warn!("Orders will not be submitted - accepted signals are recorded as PASSED");
    }

    let options = SessionOptions {
        balance: cmd.balance,
        submit_orders: !cmd.no_submit,
        warmup_bars: cmd.warmup,
    };
    let bar_count = bars.len();
    let summary = run_session(&config, bars, Arc::new(recorder), options)
        .await
        .context("Replay failed")?;

    print_summary(&config, bar_count, cmd.balance, &summary);
    println!("  Decisions:  {}", decisions.display());
    Ok(())
}

fn print_summary(config: &Config, bars: usize, start_balance: f64, summary: &SessionSummary) {
    println!("Replay: {} ({} bars, {} cycles)", config.instrument.symbol, bars, summary.cycles);
    for (outcome, count) in &summary.outcomes {
        println!("  {:<10}  {}", outcome, count);
    }
    println!("  {:<10}  {}", "COOLDOWN", summary.cooling_down);

    let wins = summary.exits.iter().filter(|exit| exit.profit > 0.0).count();
    println!("  Closed trades: {} ({} winning)", summary.exits.len(), wins);
    let managed = &summary.managed;
    println!(
        "  Exit closes: {} ({} lots), stops trailed: {}, exits held back: {}",
        managed.closes, managed.closed_volume, managed.stops_trailed, managed.held_back
    );
    println!("  Open positions: {}", summary.open_positions);
    println!(
        "  Balance: {:.2} -> {:.2} ({:+.2})",
        start_balance,
        summary.final_balance,
        summary.final_balance - start_balance
    );
    if let Some(snapshot) = &summary.last_snapshot {
        println!("  Last regime: {} ({:.2})", snapshot.regime, snapshot.confidence);
    }
}

/// Handle classify command
fn classify_command(cmd: ClassifyCmd, config: Config) -> Result<()> {
    let bars = load_bars(&cmd.bars).with_context(|| format!("Failed to load bars from {}", cmd.bars.display()))?;
    let last = bars.last().map(|bar| bar.time + config.replay.base.seconds()).unwrap_or_default();
    let at = DateTime::<Utc>::from_timestamp(last, 0).unwrap_or_else(Utc::now);

    let snapshot = classify_bars(&config, bars, at).context("Classification failed")?;

    match cmd.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        _ => print_snapshot(&config, &snapshot),
    }
    Ok(())
}

fn print_snapshot(config: &Config, snapshot: &RegimeSnapshot) {
    let [primary, secondary, tertiary] = config.regime.timeframes();
    println!("{} @ {}", config.instrument.symbol, snapshot.timestamp.format("%Y-%m-%d %H:%M UTC"));
    println!("  Regime:     {}", snapshot.regime);
    println!("  Confidence: {:.2}", snapshot.confidence);
    println!(
        "  ADX:        {} {:.1} / {} {:.1} / {} {:.1}",
        primary, snapshot.adx_primary, secondary, snapshot.adx_secondary, tertiary, snapshot.adx_tertiary
    );
    println!("  +DI / -DI:  {:.1} / {:.1}", snapshot.plus_di, snapshot.minus_di);
    println!(
        "  ATR:        {:.5} (avg {:.5}, ratio {:.2})",
        snapshot.atr_current,
        snapshot.atr_average,
        snapshot.volatility_ratio()
    );
}

/// Handle check-config command
fn check_config_command(cmd: CheckConfigCmd, config: Config) -> Result<()> {
    let [primary, secondary, tertiary] = config.regime.timeframes();
    println!("✓ {} is valid", cmd.config.display());
    println!("  Instrument: {} ({} digits)", config.instrument.symbol, config.instrument.digits);
    println!("  Timeframes: {} / {} / {}", primary, secondary, tertiary);
    println!(
        "  ADX thresholds: trend {:.1}, breakout {:.1}, ranging {:.1} (scaled for {})",
        config.regime.scaled_trend_threshold(),
        config.regime.scaled_breakout_threshold(),
        config.regime.scaled_ranging_threshold(),
        primary
    );
    println!("  Recorder: {}", config.recorder.resolved_path().display());
    Ok(())
}
