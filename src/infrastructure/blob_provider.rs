// Blob Provider - attachment bytes stored beside the logbook database
// Layout: <root>/<YYYY>-<MM>/<commentID>_<attachmentID>.<ext>

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::AttachmentMeta;

#[async_trait]
pub trait BlobProvider: Send + Sync {
    /// Read the full payload of an attachment.
    async fn read(&self, meta: &AttachmentMeta) -> AppResult<Vec<u8>>;
}

/// Derive the on-disk location of an attachment from its metadata.
///
/// Year and month come from the attachment's creation time, the extension from its stored
/// filename. Attachments without a creation time cannot be located.
pub fn attachment_path(root: &Path, meta: &AttachmentMeta) -> AppResult<PathBuf> {
    let created_at = meta.created_at.ok_or_else(|| {
        AppError::BlobError(format!(
            "Attachment {} of comment {} has no creation time",
            meta.attachment_id, meta.comment_id
        ))
    })?;

    Ok(root
        .join(created_at.format("%Y-%m").to_string())
        .join(format!("{}_{}.{}", meta.comment_id, meta.attachment_id, meta.extension())))
}

/// Filesystem implementation rooted at the logbook files directory
pub struct FsBlobProvider {
    root: PathBuf,
}

impl FsBlobProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobProvider for FsBlobProvider {
    async fn read(&self, meta: &AttachmentMeta) -> AppResult<Vec<u8>> {
        let path = attachment_path(&self.root, meta)?;
        debug!("Reading from \"{}\"", path.display());
        tokio::fs::read(&path)
            .await
            .map_err(|e| AppError::BlobError(format!("Failed to read {}: {}", path.display(), e)))
    }
}
