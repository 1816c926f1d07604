// Logbook Migrator - legacy logbook to bookkeeping service migration

// Connections, clients and stores
pub mod infrastructure;

// Thread reconstruction and replication
pub mod migration;

// Source rows and outgoing entries
pub mod models;

pub mod app_state;
pub mod cli;
pub mod config;
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
