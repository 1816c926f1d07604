// In-memory implementations of the source, target, remote and blob interfaces
// Used by dry runs and by tests; nothing here survives the process.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::infrastructure::blob_provider::BlobProvider;
use crate::infrastructure::database::{InsertOutcome, LogbookSource, TargetStore};
use crate::infrastructure::remote_client::RemoteLogClient;
use crate::migration::run_mapping::{RunFieldMapping, RunQuery};
use crate::models::{
    AttachmentMeta, AttachmentUpload, CommentRecord, NewLogEntry, RemoteId, RunRow, SourceId,
    SubsystemRef, UserRecord,
};

fn lock<T>(mutex: &Mutex<T>) -> AppResult<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| AppError::MigrationError("In-memory store lock poisoned".to_string()))
}

/// Logbook tables held in vectors
#[derive(Debug, Clone, Default)]
pub struct InMemoryLogbook {
    pub comments: Vec<CommentRecord>,
    pub subsystems: Vec<SubsystemRef>,
    pub comment_subsystems: Vec<(SourceId, i64)>,
    pub attachments: Vec<AttachmentMeta>,
    pub users: Vec<UserRecord>,
    pub runs: Vec<RunRow>,
}

#[async_trait]
impl LogbookSource for InMemoryLogbook {
    async fn fetch_comments(&self) -> AppResult<Vec<CommentRecord>> {
        let mut comments = self.comments.clone();
        comments.sort_by_key(|c| c.id);
        Ok(comments)
    }

    async fn fetch_subsystems(&self) -> AppResult<Vec<SubsystemRef>> {
        Ok(self.subsystems.clone())
    }

    async fn fetch_comment_subsystems(&self) -> AppResult<Vec<(SourceId, i64)>> {
        Ok(self.comment_subsystems.clone())
    }

    async fn fetch_attachments(&self) -> AppResult<Vec<AttachmentMeta>> {
        Ok(self.attachments.clone())
    }

    async fn fetch_users(&self) -> AppResult<Vec<UserRecord>> {
        Ok(self.users.clone())
    }

    async fn fetch_runs(&self, query: &RunQuery, _mappings: &[RunFieldMapping]) -> AppResult<Vec<RunRow>> {
        Ok(self
            .runs
            .iter()
            .filter(|r| matches!(r.run, Some(n) if n >= query.min_run && n <= query.max_run))
            .take(query.limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

/// One call made against the in-memory remote, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    CreateLog { id: RemoteId, entry: NewLogEntry },
    CreateReply { id: RemoteId, entry: NewLogEntry, parent: RemoteId, root: RemoteId },
    FindTag { tag_text: String },
    CreateTag { id: RemoteId, tag_text: String },
    LinkTag { tag_id: RemoteId, log_id: RemoteId },
    UploadAttachment { log_id: RemoteId, file_name: String, file_mime: String },
    CreateRun { run: Value },
    ListLogs,
}

/// Remote bookkeeping service that assigns sequential identifiers and records every call
#[derive(Debug)]
pub struct InMemoryRemote {
    next_id: AtomicI64,
    tags: Mutex<HashMap<String, RemoteId>>,
    calls: Mutex<Vec<RemoteCall>>,
    fail_tag_links: AtomicBool,
    latency: Option<Duration>,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            tags: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            fail_tag_links: AtomicBool::new(false),
            latency: None,
        }
    }

    /// Pretend the tag already exists remotely.
    pub fn with_existing_tag(self, tag_text: &str, id: RemoteId) -> Self {
        if let Ok(mut tags) = self.tags.lock() {
            tags.insert(tag_text.to_string(), id);
        }
        self
    }

    /// Make every tag link call fail.
    pub fn with_failing_tag_links(self) -> Self {
        self.fail_tag_links.store(true, Ordering::SeqCst);
        self
    }

    /// Delay tag lookups and creations, widening race windows between tasks.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of `create_tag` calls made for the given text.
    pub fn tag_creations(&self, tag_text: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RemoteCall::CreateTag { tag_text: t, .. } if t == tag_text))
            .count()
    }

    fn allocate_id(&self) -> RemoteId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn record(&self, call: RemoteCall) -> AppResult<()> {
        lock(&self.calls)?.push(call);
        Ok(())
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RemoteLogClient for InMemoryRemote {
    async fn create_log(&self, entry: &NewLogEntry) -> AppResult<RemoteId> {
        let id = self.allocate_id();
        self.record(RemoteCall::CreateLog { id, entry: entry.clone() })?;
        Ok(id)
    }

    async fn create_reply(&self, entry: &NewLogEntry, parent: RemoteId, root: RemoteId) -> AppResult<RemoteId> {
        let id = self.allocate_id();
        self.record(RemoteCall::CreateReply {
            id,
            entry: entry.clone(),
            parent,
            root,
        })?;
        Ok(id)
    }

    async fn find_tag(&self, tag_text: &str) -> AppResult<Option<RemoteId>> {
        self.delay().await;
        self.record(RemoteCall::FindTag { tag_text: tag_text.to_string() })?;
        Ok(lock(&self.tags)?.get(tag_text).copied())
    }

    async fn create_tag(&self, tag_text: &str) -> AppResult<RemoteId> {
        self.delay().await;
        let id = self.allocate_id();
        lock(&self.tags)?.insert(tag_text.to_string(), id);
        self.record(RemoteCall::CreateTag { id, tag_text: tag_text.to_string() })?;
        Ok(id)
    }

    async fn link_tag(&self, tag_id: RemoteId, log_id: RemoteId) -> AppResult<()> {
        self.record(RemoteCall::LinkTag { tag_id, log_id })?;
        if self.fail_tag_links.load(Ordering::SeqCst) {
            return Err(AppError::RemoteError(
                "PATCH /tags/{id}/logs returned 200 OK: unexpected body".to_string(),
            ));
        }
        Ok(())
    }

    async fn upload_attachment(&self, log_id: RemoteId, attachment: &AttachmentUpload) -> AppResult<()> {
        self.record(RemoteCall::UploadAttachment {
            log_id,
            file_name: attachment.file_name.clone(),
            file_mime: attachment.file_mime.clone(),
        })
    }

    async fn create_run(&self, run: &Value) -> AppResult<()> {
        self.record(RemoteCall::CreateRun { run: run.clone() })
    }

    async fn list_logs(&self) -> AppResult<Value> {
        self.record(RemoteCall::ListLogs)?;
        Ok(serde_json::json!({ "data": { "items": [] } }))
    }
}

/// Target storage with insert-or-skip semantics on the primary key
#[derive(Debug, Default)]
pub struct InMemoryTargetStore {
    creation_times: Mutex<HashMap<i64, NaiveDateTime>>,
    subsystems: Mutex<BTreeMap<i64, String>>,
    users: Mutex<BTreeSet<i64>>,
}

impl InMemoryTargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn creation_time(&self, log_id: i64) -> Option<NaiveDateTime> {
        self.creation_times.lock().ok()?.get(&log_id).copied()
    }

    pub fn subsystems(&self) -> BTreeMap<i64, String> {
        self.subsystems.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn users(&self) -> BTreeSet<i64> {
        self.users.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TargetStore for InMemoryTargetStore {
    async fn update_log_creation_time(&self, log_id: i64, created_at: NaiveDateTime) -> AppResult<()> {
        lock(&self.creation_times)?.insert(log_id, created_at);
        Ok(())
    }

    async fn insert_subsystem(&self, subsystem: &SubsystemRef) -> AppResult<InsertOutcome> {
        let mut subsystems = lock(&self.subsystems)?;
        if subsystems.contains_key(&subsystem.id) {
            return Ok(InsertOutcome::Skipped);
        }
        subsystems.insert(subsystem.id, subsystem.name.clone());
        Ok(InsertOutcome::Inserted { last_id: subsystem.id as u64 })
    }

    async fn insert_user(&self, user: &UserRecord) -> AppResult<InsertOutcome> {
        if lock(&self.users)?.insert(user.id) {
            Ok(InsertOutcome::Inserted { last_id: user.id as u64 })
        } else {
            Ok(InsertOutcome::Skipped)
        }
    }
}

/// Attachment payloads keyed by `(comment id, attachment id)`
#[derive(Debug, Default)]
pub struct InMemoryBlobs {
    payloads: HashMap<(SourceId, i64), Vec<u8>>,
}

impl InMemoryBlobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(mut self, comment_id: SourceId, attachment_id: i64, bytes: Vec<u8>) -> Self {
        self.payloads.insert((comment_id, attachment_id), bytes);
        self
    }
}

#[async_trait]
impl BlobProvider for InMemoryBlobs {
    async fn read(&self, meta: &AttachmentMeta) -> AppResult<Vec<u8>> {
        self.payloads
            .get(&(meta.comment_id, meta.attachment_id))
            .cloned()
            .ok_or_else(|| {
                AppError::BlobError(format!(
                    "No payload for attachment {} of comment {}",
                    meta.attachment_id, meta.comment_id
                ))
            })
    }
}
