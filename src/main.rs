// Logbook Migrator - one-shot copy of the legacy logbook into the bookkeeping service

use clap::Parser;
use tracing::{error, info};

use logbook_migrator::{app_state::AppState, cli::Args, config::Config, infrastructure::monitoring};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    monitoring::init_tracing(&args.log_level);

    // Load configuration
    let config = Config::from_env(args.dry_run)?;

    // Initialize application state
    let app_state = AppState::new(config, &args).await?;

    let result = app_state.migrator.run(args.plan()).await;
    app_state.metrics.log_summary();

    match result {
        Ok(report) => {
            info!(?report, "Migration finished");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}
