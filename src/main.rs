//! rig: grab a Reddit post ID before anyone else does.
//!
//! First create a "script" app at https://www.reddit.com/prefs/apps, then list
//! its ID and secret in the configuration file, optionally with how many
//! workers should share it (`repeat`). More parallelism comes from running
//! several instances with different accounts.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use rig::config::Config;
use rig::coordinator::{reddit_identities, status_line, RaceCoordinator, RaceError};
use rig::platform::Location;
use rig::predictor::GateError;
use rig::{logging, PostId};

#[derive(Parser)]
#[command(name = "rig")]
#[command(about = "RIG - Reddit ID Grabber: collect your most wanted post IDs (redd.it/abcdef)")]
struct Cli {
    /// The ID you want to capture. If not specified, will start in watch mode
    #[arg(short, long)]
    post_id: Option<String>,

    /// Configuration file with your credentials
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Force watch mode instead of grabbing
    #[arg(short, long)]
    watch: bool,

    /// Log file
    #[arg(long, env = "RIG_LOG_FILE", default_value = "rig.log")]
    log_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_file).context("Cannot set up logging")?;

    let watch = cli.watch || cli.post_id.is_none();
    let target = match (&cli.post_id, watch) {
        (Some(raw), false) => Some(
            raw.to_lowercase()
                .parse::<PostId>()
                .context("Wrong ID format, must specify 6 base36 chars")?,
        ),
        _ => None,
    };

    if !cli.config.exists() {
        bail!("Cannot find {}", cli.config.display());
    }
    info!("\"{}\" set for configuration...", cli.config.display());
    info!("Watch mode: {}", watch);
    if let Some(target) = target {
        info!("Looking for post id: {}", target);
    }

    let config = Config::load(&cli.config)?;
    info!("User \"{}\" will post in {}", config.username, config.location);

    let identities = reddit_identities(&config).context("Cannot build API clients")?;
    let coordinator = RaceCoordinator::new(identities, config.location.clone(), config.race.clone())
        .with_stream(Location::Community(config.platform.stream.clone()));

    let Some(target) = target else {
        coordinator.watch().await?;
        return Ok(());
    };

    match coordinator.run(target).await {
        Ok(report) => {
            info!("{}", report.status_line());
            if !report.claimed {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(RaceError::Gate(e @ GateError::AlreadyPassed { .. })) => {
            info!("{}", e);
            info!("{}", status_line(target, false));
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
