use anyhow::Result;
use clap::Parser;
use oddscout::config::{CheckKind, Mode, SettingsTree};
use oddscout::pipeline::Pipeline;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Scan scraped bookmaker odds for arbitrage and +EV opportunities.
#[derive(Debug, Parser)]
#[command(name = "oddscout", version)]
struct Cli {
    /// Prematch or live record sets.
    #[arg(long, value_enum, default_value_t = Mode::Prematch)]
    mode: Mode,

    /// Sport whose settings tree and record files are processed.
    #[arg(long, default_value = "football")]
    sport: String,

    /// What to look for: arbitrage or positive expected value.
    #[arg(long = "check", value_enum, default_value_t = CheckKind::Arb)]
    check: CheckKind,

    /// Keep running, one cycle every --delay seconds.
    #[arg(long = "loop")]
    run_loop: bool,

    /// Seconds between cycles when looping.
    #[arg(long, default_value_t = 1.0)]
    delay: f64,

    /// Withhold arbitrage opportunities until every involved source has
    /// refreshed since the opportunity appeared.
    #[arg(long)]
    show_only_confirmed: bool,

    /// Root of the settings tree.
    #[arg(long, default_value = "settings")]
    settings_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("oddscout=info")),
        )
        .init();

    let cli = Cli::parse();
    let tree = SettingsTree::new(&cli.settings_dir, &cli.sport);
    let pipeline =
        Pipeline::from_settings(&tree, cli.mode, &cli.sport, cli.check, cli.show_only_confirmed)?;

    tracing::info!(
        mode = %cli.mode,
        sport = %cli.sport,
        check = %cli.check,
        output = %pipeline.output_dir.display(),
        "starting"
    );

    if cli.run_loop {
        loop {
            if let Err(e) = pipeline.run_cycle() {
                tracing::error!(error = %e, "cycle failed");
            }
            tracing::info!(delay = cli.delay, "cycle complete, waiting");
            tokio::time::sleep(Duration::from_secs_f64(cli.delay)).await;
        }
    } else {
        pipeline.run_cycle()?;
        Ok(())
    }
}
