// Migration Monitoring - counters shared by every migration task
// Reported once at the end of a run; nothing is exported.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Counters updated concurrently by replication tasks
#[derive(Debug, Default)]
pub struct MigrationMetrics {
    logs_created: AtomicU64,
    replies_created: AtomicU64,
    tags_created: AtomicU64,
    tag_cache_hits: AtomicU64,
    tag_link_failures: AtomicU64,
    attachments_uploaded: AtomicU64,
    attachments_skipped: AtomicU64,
    runs_created: AtomicU64,
    subsystems_inserted: AtomicU64,
    users_inserted: AtomicU64,
    duplicates_skipped: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub logs_created: u64,
    pub replies_created: u64,
    pub tags_created: u64,
    pub tag_cache_hits: u64,
    pub tag_link_failures: u64,
    pub attachments_uploaded: u64,
    pub attachments_skipped: u64,
    pub runs_created: u64,
    pub subsystems_inserted: u64,
    pub users_inserted: u64,
    pub duplicates_skipped: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl MigrationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_log_created(&self) {
        bump(&self.logs_created);
    }

    pub fn record_reply_created(&self) {
        bump(&self.replies_created);
    }

    pub fn record_tag_created(&self) {
        bump(&self.tags_created);
    }

    pub fn record_tag_cache_hit(&self) {
        bump(&self.tag_cache_hits);
    }

    pub fn record_tag_link_failure(&self) {
        bump(&self.tag_link_failures);
    }

    pub fn record_attachment_uploaded(&self) {
        bump(&self.attachments_uploaded);
    }

    pub fn record_attachment_skipped(&self) {
        bump(&self.attachments_skipped);
    }

    pub fn record_run_created(&self) {
        bump(&self.runs_created);
    }

    pub fn record_subsystem_inserted(&self) {
        bump(&self.subsystems_inserted);
    }

    pub fn record_user_inserted(&self) {
        bump(&self.users_inserted);
    }

    pub fn record_duplicate_skipped(&self) {
        bump(&self.duplicates_skipped);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            logs_created: load(&self.logs_created),
            replies_created: load(&self.replies_created),
            tags_created: load(&self.tags_created),
            tag_cache_hits: load(&self.tag_cache_hits),
            tag_link_failures: load(&self.tag_link_failures),
            attachments_uploaded: load(&self.attachments_uploaded),
            attachments_skipped: load(&self.attachments_skipped),
            runs_created: load(&self.runs_created),
            subsystems_inserted: load(&self.subsystems_inserted),
            users_inserted: load(&self.users_inserted),
            duplicates_skipped: load(&self.duplicates_skipped),
        }
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!(
            logs = s.logs_created,
            replies = s.replies_created,
            tags_created = s.tags_created,
            tag_cache_hits = s.tag_cache_hits,
            tag_link_failures = s.tag_link_failures,
            attachments_uploaded = s.attachments_uploaded,
            attachments_skipped = s.attachments_skipped,
            runs = s.runs_created,
            subsystems = s.subsystems_inserted,
            users = s.users_inserted,
            duplicates = s.duplicates_skipped,
            "Migration summary"
        );
    }
}

impl MetricsSnapshot {
    /// Total log entries created, top-level and replies.
    pub fn entries_created(&self) -> u64 {
        self.logs_created + self.replies_created
    }
}
