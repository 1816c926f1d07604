use std::sync::Arc;
use tracing::info;

use crate::{
    cli::Args,
    config::Config,
    error::{AppError, AppResult},
    infrastructure::{
        blob_provider::{BlobProvider, FsBlobProvider},
        database::{connect_pool, LogbookSource, MySqlLogbookSource, MySqlTargetStore, TargetStore},
        memory::{InMemoryRemote, InMemoryTargetStore},
        monitoring::MigrationMetrics,
        remote_client::{HttpRemoteClient, RemoteLogClient},
    },
    migration::Migrator,
};

pub struct AppState {
    pub migrator: Migrator,
    pub metrics: Arc<MigrationMetrics>,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config, args: &Args) -> AppResult<Self> {
        // Logbook is always read from the real database
        let logbook_pool = connect_pool(&config.logbook_db).await?;
        let source: Arc<dyn LogbookSource> = Arc::new(MySqlLogbookSource::new(logbook_pool));

        let (target, remote): (Arc<dyn TargetStore>, Arc<dyn RemoteLogClient>) = if args.dry_run {
            info!("Dry run: target database and API are replaced by in-memory stand-ins");
            (Arc::new(InMemoryTargetStore::new()), Arc::new(InMemoryRemote::new()))
        } else {
            let target_db = config.target_db.as_ref().ok_or_else(|| {
                AppError::ConfigurationError("Target database is not configured".to_string())
            })?;
            let remote_config = config.remote.as_ref().ok_or_else(|| {
                AppError::ConfigurationError("Remote API is not configured".to_string())
            })?;

            let target_pool = connect_pool(target_db).await?;
            info!("Using API @ \"{}\"", remote_config.base_url());
            (
                Arc::new(MySqlTargetStore::new(target_pool)),
                Arc::new(HttpRemoteClient::new(remote_config, args.tlsskipverify)?),
            )
        };

        let blobs: Arc<dyn BlobProvider> = Arc::new(FsBlobProvider::new(config.files.root.clone()));
        let metrics = Arc::new(MigrationMetrics::new());
        let mut options = args.options();
        // Replication writes creation times through the target pool, or nothing in a dry run
        options.max_concurrency = config
            .target_db
            .as_ref()
            .unwrap_or(&config.logbook_db)
            .max_connections as usize;
        let migrator = Migrator::new(source, target, remote, blobs, metrics.clone(), options);

        Ok(Self {
            migrator,
            metrics,
            config,
        })
    }
}
