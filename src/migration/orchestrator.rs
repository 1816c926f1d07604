// Migration Orchestrator - sequences the selected migrations and fans threads out to the replicator
// Order is fixed: subsystems, users, comments, runs.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::blob_provider::BlobProvider;
use crate::infrastructure::database::{InsertOutcome, LogbookSource, TargetStore};
use crate::infrastructure::monitoring::MigrationMetrics;
use crate::infrastructure::remote_client::RemoteLogClient;
use crate::migration::replicator::{ReplicatorOptions, ThreadContext, ThreadReplicator};
use crate::migration::run_mapping::{build_run_payload, RunQuery, RUN_FIELD_MAPPINGS};
use crate::migration::tag_resolver::TagResolver;
use crate::models::SourceId;

/// Which migrations a run performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    /// Only verify connectivity; nothing else runs.
    pub check: bool,
    pub subsystems: bool,
    pub users: bool,
    pub comments: bool,
    pub runs: bool,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        !(self.check || self.subsystems || self.users || self.comments || self.runs)
    }
}

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// One task per thread root instead of one root at a time.
    pub parallel: bool,
    /// Threads replicated at once in parallel mode; matches the target pool size so no task
    /// waits on a connection.
    pub max_concurrency: usize,
    pub replicator: ReplicatorOptions,
    pub run_query: RunQuery,
    /// Accepted for compatibility; identifiers are never shifted.
    pub id_offset: i64,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            max_concurrency: 8,
            replicator: ReplicatorOptions::default(),
            run_query: RunQuery::default(),
            id_offset: 1_000_000_000,
        }
    }
}

/// Outcome of the comment migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentMigration {
    pub threads: usize,
    pub entries: usize,
    /// Comments not reachable from any root, left behind.
    pub orphans: Vec<SourceId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub subsystems_inserted: usize,
    pub users_inserted: usize,
    pub comments: Option<CommentMigration>,
    pub runs_created: usize,
}

pub struct Migrator {
    source: Arc<dyn LogbookSource>,
    target: Arc<dyn TargetStore>,
    remote: Arc<dyn RemoteLogClient>,
    blobs: Arc<dyn BlobProvider>,
    tags: Arc<TagResolver>,
    metrics: Arc<MigrationMetrics>,
    options: MigrationOptions,
}

impl Migrator {
    pub fn new(
        source: Arc<dyn LogbookSource>,
        target: Arc<dyn TargetStore>,
        remote: Arc<dyn RemoteLogClient>,
        blobs: Arc<dyn BlobProvider>,
        metrics: Arc<MigrationMetrics>,
        options: MigrationOptions,
    ) -> Self {
        let tags = Arc::new(TagResolver::new(remote.clone(), metrics.clone()));
        Self {
            source,
            target,
            remote,
            blobs,
            tags,
            metrics,
            options,
        }
    }

    pub fn metrics(&self) -> Arc<MigrationMetrics> {
        self.metrics.clone()
    }

    /// Execute the plan. The first failing step aborts the rest.
    pub async fn run(&self, plan: MigrationPlan) -> AppResult<MigrationReport> {
        let mut report = MigrationReport::default();

        if plan.check {
            self.check_connection().await?;
            return Ok(report);
        }
        if plan.is_empty() {
            warn!("No migration selected, nothing to do");
            return Ok(report);
        }
        info!("ID offset {} is reserved and not applied", self.options.id_offset);

        if plan.subsystems {
            report.subsystems_inserted = self.migrate_subsystems().await?;
        }
        if plan.users {
            report.users_inserted = self.migrate_users().await?;
        }
        if plan.comments {
            report.comments = Some(self.migrate_comments().await?);
        }
        if plan.runs {
            report.runs_created = self.migrate_runs().await?;
        }

        Ok(report)
    }

    /// Databases are verified when their pools open; this issues the one read-only remote call.
    #[instrument(skip(self))]
    pub async fn check_connection(&self) -> AppResult<()> {
        let logs = self.remote.list_logs().await?;
        info!("GET /logs answered with {} bytes", logs.to_string().len());
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn migrate_subsystems(&self) -> AppResult<usize> {
        let subsystems = self.source.fetch_subsystems().await?;
        info!("Migrating {} subsystems", subsystems.len());

        let mut inserted = 0;
        for subsystem in &subsystems {
            match self.target.insert_subsystem(subsystem).await? {
                InsertOutcome::Inserted { last_id } => {
                    info!("Subsystem {} \"{}\" inserted, last ID {}", subsystem.id, subsystem.name, last_id);
                    self.metrics.record_subsystem_inserted();
                    inserted += 1;
                }
                InsertOutcome::Skipped => {
                    info!("Subsystem {} \"{}\" already present, skipped", subsystem.id, subsystem.name);
                    self.metrics.record_duplicate_skipped();
                }
            }
        }
        Ok(inserted)
    }

    #[instrument(skip(self))]
    pub async fn migrate_users(&self) -> AppResult<usize> {
        let users = self.source.fetch_users().await?;
        info!("Migrating {} users", users.len());

        let mut inserted = 0;
        for user in &users {
            match self.target.insert_user(user).await? {
                InsertOutcome::Inserted { last_id } => {
                    info!("User {} {:?} inserted, last ID {}", user.id, user.username, last_id);
                    self.metrics.record_user_inserted();
                    inserted += 1;
                }
                InsertOutcome::Skipped => {
                    info!("User {} {:?} already present, skipped", user.id, user.username);
                    self.metrics.record_duplicate_skipped();
                }
            }
        }
        Ok(inserted)
    }

    #[instrument(skip(self))]
    pub async fn migrate_comments(&self) -> AppResult<CommentMigration> {
        let comments = self.source.fetch_comments().await?;
        let subsystems = self.source.fetch_subsystems().await?;
        let associations = self.source.fetch_comment_subsystems().await?;
        let attachments = self.source.fetch_attachments().await?;
        info!(
            "Fetched {} comments, {} subsystem links, {} attachments",
            comments.len(),
            associations.len(),
            attachments.len()
        );

        let context = Arc::new(ThreadContext::new(comments, subsystems, associations, attachments));
        let orphans = context.forest.orphans();
        if !orphans.is_empty() {
            warn!(
                "{} comments are unreachable from any thread root and will not be migrated: {:?}",
                orphans.len(),
                orphans
            );
        }

        let roots = context.forest.roots().to_vec();
        info!("Replicating {} threads (parallel={})", roots.len(), self.options.parallel);

        let replicator = Arc::new(ThreadReplicator::new(
            self.remote.clone(),
            self.target.clone(),
            self.blobs.clone(),
            self.tags.clone(),
            context,
            self.options.replicator.clone(),
            self.metrics.clone(),
        ));

        let entries = if self.options.parallel {
            replicate_parallel(replicator, &roots, self.options.max_concurrency).await?
        } else {
            replicate_sequential(&replicator, &roots).await?
        };

        Ok(CommentMigration {
            threads: roots.len(),
            entries,
            orphans,
        })
    }

    #[instrument(skip(self))]
    pub async fn migrate_runs(&self) -> AppResult<usize> {
        let query = &self.options.run_query;
        let rows = self.source.fetch_runs(query, RUN_FIELD_MAPPINGS).await?;
        info!(
            "Migrating {} runs (range {}..={}, limit {})",
            rows.len(),
            query.min_run,
            query.max_run,
            query.limit
        );

        for row in &rows {
            let payload = build_run_payload(row, RUN_FIELD_MAPPINGS)?;
            self.remote.create_run(&payload).await?;
            self.metrics.record_run_created();
            info!("Run {:?} created", row.run);
        }
        Ok(rows.len())
    }
}

async fn replicate_sequential(replicator: &ThreadReplicator, roots: &[SourceId]) -> AppResult<usize> {
    let mut entries = 0;
    for root in roots {
        let nodes = replicator.replicate_thread(*root).await.map_err(|e| {
            error!("Thread rooted at {} failed: {}", root, e);
            e
        })?;
        entries += nodes.len();
    }
    Ok(entries)
}

/// At most `max_concurrency` threads run at once. Every task is joined even after a failure;
/// the run fails once all have finished.
async fn replicate_parallel(
    replicator: Arc<ThreadReplicator>,
    roots: &[SourceId],
    max_concurrency: usize,
) -> AppResult<usize> {
    let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for &root in roots {
        let replicator = replicator.clone();
        let permits = permits.clone();
        tasks.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => replicator.replicate_thread(root).await,
                Err(e) => Err(AppError::MigrationError(format!("Concurrency limiter closed: {}", e))),
            };
            (root, result)
        });
    }

    let mut entries = 0;
    let mut failed: Vec<SourceId> = Vec::new();
    let mut aborted = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(nodes))) => entries += nodes.len(),
            Ok((root, Err(e))) => {
                error!("Thread rooted at {} failed: {}", root, e);
                failed.push(root);
            }
            Err(e) => {
                error!("Replication task did not complete: {}", e);
                aborted += 1;
            }
        }
    }

    if failed.is_empty() && aborted == 0 {
        return Ok(entries);
    }
    failed.sort_unstable();
    Err(AppError::MigrationError(format!(
        "{} of {} threads failed (roots {:?}, {} aborted tasks)",
        failed.len() + aborted,
        roots.len(),
        failed,
        aborted
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory::{
        InMemoryBlobs, InMemoryLogbook, InMemoryRemote, InMemoryTargetStore, RemoteCall,
    };
    use crate::models::{AttachmentMeta, CommentRecord, RunRow, SubsystemRef, UserRecord};
    use chrono::NaiveDateTime;
    use serde_json::json;

    fn comment(id: SourceId, parent: Option<SourceId>, root_parent: Option<SourceId>) -> CommentRecord {
        CommentRecord {
            id,
            run: Some(600),
            user_id: Some(1),
            title: Some(format!("title {}", id)),
            body: Some("text".to_string()),
            class: Some("HUMAN".to_string()),
            comment_type: Some("GENERAL".to_string()),
            created_at: NaiveDateTime::parse_from_str("2018-02-01 10:00:00", "%Y-%m-%d %H:%M:%S").ok(),
            deleted: false,
            parent,
            root_parent,
        }
    }

    fn logbook() -> InMemoryLogbook {
        InMemoryLogbook {
            comments: vec![
                comment(1, None, None),
                comment(2, Some(1), Some(1)),
                comment(10, None, None),
                comment(11, Some(10), Some(10)),
                comment(20, None, None),
                comment(30, Some(404), Some(404)),
            ],
            subsystems: vec![
                SubsystemRef { id: 1, name: "TPC".to_string() },
                SubsystemRef { id: 2, name: "ITS".to_string() },
            ],
            comment_subsystems: vec![(1, 1), (10, 1), (20, 1), (20, 2)],
            users: vec![
                UserRecord { id: 1, username: Some("shifter".to_string()) },
                UserRecord { id: 2, username: Some("expert".to_string()) },
            ],
            ..Default::default()
        }
    }

    struct Harness {
        remote: Arc<InMemoryRemote>,
        target: Arc<InMemoryTargetStore>,
        migrator: Migrator,
    }

    fn harness(source: InMemoryLogbook, blobs: InMemoryBlobs, parallel: bool) -> Harness {
        let remote = Arc::new(InMemoryRemote::new());
        let target = Arc::new(InMemoryTargetStore::new());
        let migrator = Migrator::new(
            Arc::new(source),
            target.clone(),
            remote.clone(),
            Arc::new(blobs),
            Arc::new(MigrationMetrics::new()),
            MigrationOptions {
                parallel,
                ..Default::default()
            },
        );
        Harness {
            remote,
            target,
            migrator,
        }
    }

    fn comments_only() -> MigrationPlan {
        MigrationPlan {
            comments: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sequential_comment_migration_skips_orphans() {
        let h = harness(logbook(), InMemoryBlobs::new(), false);

        let report = h.migrator.run(comments_only()).await.unwrap();
        let comments = report.comments.unwrap();

        assert_eq!(comments.threads, 3);
        assert_eq!(comments.entries, 5);
        assert_eq!(comments.orphans, vec![30]);

        let snapshot = h.migrator.metrics().snapshot();
        assert_eq!(snapshot.logs_created, 3);
        assert_eq!(snapshot.replies_created, 2);
        assert_eq!(snapshot.entries_created(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_threads_share_the_tag_cache() {
        let h = harness(logbook(), InMemoryBlobs::new(), true);

        let report = h.migrator.run(comments_only()).await.unwrap();
        assert_eq!(report.comments.unwrap().entries, 5);

        assert_eq!(h.remote.tag_creations("TPC"), 1);
        assert_eq!(h.remote.tag_creations("ITS"), 1);
        assert_eq!(h.remote.tag_creations("COMMENT_TYPE/GENERAL"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallel_failure_still_joins_other_threads() {
        let mut source = logbook();
        source.attachments = vec![AttachmentMeta {
            comment_id: 10,
            attachment_id: 1,
            file_name: "missing.txt".to_string(),
            size: Some(10),
            title: None,
            content_type: Some("text/plain".to_string()),
            created_at: None,
            deleted: false,
        }];
        let h = harness(source, InMemoryBlobs::new(), true);

        let result = h.migrator.run(comments_only()).await;
        match result {
            Err(AppError::MigrationError(message)) => assert!(message.contains("[10]"), "{}", message),
            other => panic!("expected a migration error, got {:?}", other),
        }

        // Threads 1 and 20 completed despite the failure of thread 10
        let roots_created = h
            .remote
            .calls()
            .iter()
            .filter(|c| matches!(c, RemoteCall::CreateLog { .. }))
            .count();
        assert_eq!(roots_created, 3);
        assert_eq!(h.migrator.metrics().snapshot().replies_created, 1);
    }

    /// Target store that records the peak number of concurrent creation time writes.
    #[derive(Default)]
    struct PeakTrackingTarget {
        in_flight: std::sync::atomic::AtomicUsize,
        peak: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TargetStore for PeakTrackingTarget {
        async fn update_log_creation_time(&self, _log_id: i64, _created_at: NaiveDateTime) -> AppResult<()> {
            use std::sync::atomic::Ordering;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }

        async fn insert_subsystem(&self, _subsystem: &SubsystemRef) -> AppResult<InsertOutcome> {
            Ok(InsertOutcome::Skipped)
        }

        async fn insert_user(&self, _user: &UserRecord) -> AppResult<InsertOutcome> {
            Ok(InsertOutcome::Skipped)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_fan_out_never_exceeds_the_pool_size() {
        let source = InMemoryLogbook {
            comments: (1..=40).map(|id| comment(id, None, None)).collect(),
            ..Default::default()
        };
        let target = Arc::new(PeakTrackingTarget::default());
        let migrator = Migrator::new(
            Arc::new(source),
            target.clone(),
            Arc::new(InMemoryRemote::new()),
            Arc::new(InMemoryBlobs::new()),
            Arc::new(MigrationMetrics::new()),
            MigrationOptions {
                parallel: true,
                max_concurrency: 3,
                ..Default::default()
            },
        );

        let report = migrator.run(comments_only()).await.unwrap();

        assert_eq!(report.comments.unwrap().entries, 40);
        let peak = target.peak.load(std::sync::atomic::Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 3, "peak concurrency was {}", peak);
    }

    #[tokio::test]
    async fn test_sequential_failure_stops_at_first_thread() {
        let mut source = logbook();
        source.attachments = vec![AttachmentMeta {
            comment_id: 1,
            attachment_id: 1,
            file_name: "missing.txt".to_string(),
            size: Some(10),
            title: None,
            content_type: Some("text/plain".to_string()),
            created_at: None,
            deleted: false,
        }];
        let h = harness(source, InMemoryBlobs::new(), false);

        assert!(h.migrator.run(comments_only()).await.is_err());
        assert_eq!(h.migrator.metrics().snapshot().logs_created, 1);
    }

    #[tokio::test]
    async fn test_subsystems_and_users_insert_or_skip() {
        let mut source = logbook();
        source.users.push(UserRecord { id: 1, username: Some("shifter".to_string()) });
        let h = harness(source, InMemoryBlobs::new(), false);

        let report = h
            .migrator
            .run(MigrationPlan {
                subsystems: true,
                users: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(report.subsystems_inserted, 2);
        assert_eq!(report.users_inserted, 2);
        assert_eq!(h.target.subsystems().get(&2), Some(&"ITS".to_string()));
        assert_eq!(h.target.users().len(), 2);
        assert_eq!(h.migrator.metrics().snapshot().duplicates_skipped, 1);

        // A second pass only skips
        assert_eq!(h.migrator.migrate_subsystems().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_runs_are_mapped_and_submitted() {
        let mut source = logbook();
        for run in [400, 700, 800] {
            let mut row = RunRow {
                run: Some(run),
                ..Default::default()
            };
            row.values.insert("run_type".to_string(), json!("PHYSICS"));
            source.runs.push(row);
        }
        let remote = Arc::new(InMemoryRemote::new());
        let migrator = Migrator::new(
            Arc::new(source),
            Arc::new(InMemoryTargetStore::new()),
            remote.clone(),
            Arc::new(InMemoryBlobs::new()),
            Arc::new(MigrationMetrics::new()),
            MigrationOptions {
                run_query: RunQuery {
                    min_run: 500,
                    max_run: 9_999_999,
                    limit: 10,
                },
                ..Default::default()
            },
        );

        assert_eq!(migrator.migrate_runs().await.unwrap(), 2);

        let runs: Vec<serde_json::Value> = remote
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                RemoteCall::CreateRun { run } => Some(run),
                _ => None,
            })
            .collect();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0]["runType"], json!("PHYSICS"));
    }

    #[tokio::test]
    async fn test_check_only_touches_the_log_listing() {
        let h = harness(logbook(), InMemoryBlobs::new(), false);

        h.migrator
            .run(MigrationPlan {
                check: true,
                comments: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(h.remote.calls(), vec![RemoteCall::ListLogs]);
    }
}
