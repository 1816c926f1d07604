// Thread Replicator - replays one comment thread against the remote service
// Pre-order: a reply is only created once its parent has a remote identifier.

use base64::{engine::general_purpose, Engine as _};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::blob_provider::BlobProvider;
use crate::infrastructure::database::TargetStore;
use crate::infrastructure::monitoring::MigrationMetrics;
use crate::infrastructure::remote_client::RemoteLogClient;
use crate::migration::attachment_policy::AttachmentPolicy;
use crate::migration::tag_resolver::TagResolver;
use crate::migration::thread_builder::ThreadForest;
use crate::models::{
    AttachmentMeta, AttachmentUpload, CommentRecord, LogSubtype, NewLogEntry, RemoteId, SourceId,
    SubsystemRef, ORIGIN_HUMAN,
};

const DEFAULT_MIME: &str = "application/octet-stream";

/// Read-only lookup data shared by every replication task of a run.
#[derive(Debug, Clone, Default)]
pub struct ThreadContext {
    pub forest: ThreadForest,
    subsystem_names: HashMap<i64, String>,
    comment_subsystems: HashMap<SourceId, Vec<i64>>,
    attachments: HashMap<SourceId, Vec<AttachmentMeta>>,
}

impl ThreadContext {
    pub fn new(
        comments: Vec<CommentRecord>,
        subsystems: Vec<SubsystemRef>,
        comment_subsystems: Vec<(SourceId, i64)>,
        attachments: Vec<AttachmentMeta>,
    ) -> Self {
        let mut by_comment: HashMap<SourceId, Vec<i64>> = HashMap::new();
        for (comment_id, subsystem_id) in comment_subsystems {
            by_comment.entry(comment_id).or_default().push(subsystem_id);
        }

        let mut files: HashMap<SourceId, Vec<AttachmentMeta>> = HashMap::new();
        for meta in attachments {
            files.entry(meta.comment_id).or_default().push(meta);
        }

        Self {
            forest: ThreadForest::build(comments),
            subsystem_names: subsystems.into_iter().map(|s| (s.id, s.name)).collect(),
            comment_subsystems: by_comment,
            attachments: files,
        }
    }

    pub fn subsystems_of(&self, comment_id: SourceId) -> &[i64] {
        self.comment_subsystems
            .get(&comment_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn subsystem_name(&self, subsystem_id: i64) -> Option<&str> {
        self.subsystem_names.get(&subsystem_id).map(String::as_str)
    }

    pub fn attachments_of(&self, comment_id: SourceId) -> &[AttachmentMeta] {
        self.attachments
            .get(&comment_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Where a reply hangs in the remote thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyContext {
    pub parent: RemoteId,
    pub root: RemoteId,
}

/// One replicated comment, in visitation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicatedNode {
    pub source_id: SourceId,
    pub remote_id: RemoteId,
    pub depth: usize,
    /// `None` for the thread root.
    pub reply_to: Option<ReplyContext>,
}

#[derive(Debug, Clone)]
pub struct ReplicatorOptions {
    /// Subtype given to thread roots; replies are always comments.
    pub root_subtype: LogSubtype,
    pub attachments: AttachmentPolicy,
}

impl Default for ReplicatorOptions {
    fn default() -> Self {
        Self {
            root_subtype: LogSubtype::Run,
            attachments: AttachmentPolicy::default(),
        }
    }
}

pub struct ThreadReplicator {
    remote: Arc<dyn RemoteLogClient>,
    target: Arc<dyn TargetStore>,
    blobs: Arc<dyn BlobProvider>,
    tags: Arc<TagResolver>,
    context: Arc<ThreadContext>,
    options: ReplicatorOptions,
    metrics: Arc<MigrationMetrics>,
}

impl ThreadReplicator {
    pub fn new(
        remote: Arc<dyn RemoteLogClient>,
        target: Arc<dyn TargetStore>,
        blobs: Arc<dyn BlobProvider>,
        tags: Arc<TagResolver>,
        context: Arc<ThreadContext>,
        options: ReplicatorOptions,
        metrics: Arc<MigrationMetrics>,
    ) -> Self {
        Self {
            remote,
            target,
            blobs,
            tags,
            context,
            options,
            metrics,
        }
    }

    /// Replicate the thread starting at `root`, stopping at the first failure.
    #[instrument(skip(self))]
    pub async fn replicate_thread(&self, root: SourceId) -> AppResult<Vec<ReplicatedNode>> {
        let mut visited = Vec::new();
        let mut stack: Vec<(SourceId, usize, Option<ReplyContext>)> = vec![(root, 0, None)];

        while let Some((source_id, depth, reply_to)) = stack.pop() {
            let remote_id = self.replicate_node(source_id, depth, reply_to).await?;

            let child_context = ReplyContext {
                parent: remote_id,
                root: reply_to.map(|ctx| ctx.root).unwrap_or(remote_id),
            };
            // Reversed so children pop in builder order
            for child in self.context.forest.children(source_id).iter().rev() {
                stack.push((*child, depth + 1, Some(child_context)));
            }

            visited.push(ReplicatedNode {
                source_id,
                remote_id,
                depth,
                reply_to,
            });
        }

        Ok(visited)
    }

    async fn replicate_node(
        &self,
        source_id: SourceId,
        depth: usize,
        reply_to: Option<ReplyContext>,
    ) -> AppResult<RemoteId> {
        let comment = self
            .context
            .forest
            .record(source_id)
            .ok_or_else(|| AppError::NotFound(format!("Comment {} is not in the forest", source_id)))?;

        let remote_id = match reply_to {
            None => {
                let entry = log_entry(comment, self.options.root_subtype);
                let id = self.remote.create_log(&entry).await?;
                self.metrics.record_log_created();
                id
            }
            Some(ctx) => {
                let entry = log_entry(comment, LogSubtype::Comment);
                let id = self.remote.create_reply(&entry, ctx.parent, ctx.root).await?;
                self.metrics.record_reply_created();
                id
            }
        };
        info!(
            "Logbook.ID={}, Remote.parentID={:?}, Depth={} -> Remote.ID={}",
            source_id,
            reply_to.map(|ctx| ctx.parent),
            depth,
            remote_id
        );

        match comment.created_at {
            Some(created_at) => {
                self.target
                    .update_log_creation_time(remote_id, created_at)
                    .await?
            }
            None => warn!("Comment {} has no creation time, keeping the remote timestamp", source_id),
        }

        if let Some(tag_text) = comment.type_tag() {
            debug!("Linking type tag \"{}\"", tag_text);
            self.tags.link(remote_id, &tag_text).await?;
        }

        for subsystem_id in self.context.subsystems_of(source_id) {
            match self.context.subsystem_name(*subsystem_id) {
                Some(name) if !name.is_empty() => {
                    debug!("Linking subsystem tag \"{}\"", name);
                    self.tags.link(remote_id, name).await?;
                }
                _ => warn!(
                    "Comment {} references unknown subsystem {}, no tag linked",
                    source_id, subsystem_id
                ),
            }
        }

        let attachments = self.context.attachments_of(source_id);
        if !attachments.is_empty() {
            info!("Uploading {} attachments", attachments.len());
        }
        for meta in attachments {
            self.upload_attachment(remote_id, meta).await?;
        }

        Ok(remote_id)
    }

    async fn upload_attachment(&self, log_id: RemoteId, meta: &AttachmentMeta) -> AppResult<()> {
        let mime = meta.content_type.as_deref().unwrap_or(DEFAULT_MIME);
        info!(
            "File \"{}\" ({:.0} kB)",
            meta.file_name,
            meta.size.unwrap_or(0) as f64 / 1024.0
        );

        if let Some(reason) = self.options.attachments.check_mime(mime) {
            warn!("Skipping \"{}\": {}", meta.file_name, reason);
            self.metrics.record_attachment_skipped();
            return Ok(());
        }

        let bytes = self.blobs.read(meta).await?;
        if let Some(reason) = self.options.attachments.check_size(bytes.len()) {
            warn!("Skipping \"{}\": {}", meta.file_name, reason);
            self.metrics.record_attachment_skipped();
            return Ok(());
        }

        let upload = AttachmentUpload {
            file_name: meta.file_name.clone(),
            file_mime: mime.to_string(),
            title: meta.title.clone(),
            file_data: general_purpose::STANDARD.encode(&bytes),
            creation_time: meta.created_at,
        };
        self.remote.upload_attachment(log_id, &upload).await?;
        self.metrics.record_attachment_uploaded();
        Ok(())
    }
}

fn log_entry(comment: &CommentRecord, subtype: LogSubtype) -> NewLogEntry {
    NewLogEntry {
        title: comment.title.clone().unwrap_or_default(),
        body: comment.body.clone().unwrap_or_default(),
        user_id: comment.user_id,
        origin: ORIGIN_HUMAN.to_string(),
        subtype,
    }
}
