// Infrastructure modules
pub mod blob_provider;         // Attachment file lookup
pub mod database;              // Logbook source and target store
pub mod memory;                // In-memory implementations for dry runs and tests
pub mod monitoring;            // Migration counters and tracing setup
pub mod remote_client;         // Bookkeeping REST client

// Re-export core infrastructure components
pub use blob_provider::{attachment_path, BlobProvider, FsBlobProvider};
pub use database::{connect_pool, InsertOutcome, LogbookSource, MySqlLogbookSource, MySqlTargetStore, TargetStore};
pub use memory::{InMemoryBlobs, InMemoryLogbook, InMemoryRemote, InMemoryTargetStore, RemoteCall};
pub use monitoring::{init_tracing, MetricsSnapshot, MigrationMetrics};
pub use remote_client::{HttpRemoteClient, RemoteLogClient};
