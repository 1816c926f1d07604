// Attachment skip policy
// Stopgap exclusions for payloads the remote service currently mishandles.

use std::fmt;

/// Content type the service fails to store.
pub const BLOCKED_MIME: &str = "image/jpeg";
/// Payloads of this many bytes or more are rejected by the service.
pub const MAX_UPLOAD_BYTES: usize = 8000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    BlockedMime(String),
    TooLarge { size: usize, limit: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::BlockedMime(mime) => write!(f, "content type {} is not accepted by the server", mime),
            SkipReason::TooLarge { size, limit } => {
                write!(f, "{} bytes exceeds the {} byte upload limit", size, limit)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPolicy {
    pub blocked_mime_types: Vec<String>,
    pub max_bytes: usize,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            blocked_mime_types: vec![BLOCKED_MIME.to_string()],
            max_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl AttachmentPolicy {
    /// Checked before the payload is read.
    pub fn check_mime(&self, mime: &str) -> Option<SkipReason> {
        self.blocked_mime_types
            .iter()
            .any(|blocked| blocked.eq_ignore_ascii_case(mime))
            .then(|| SkipReason::BlockedMime(mime.to_string()))
    }

    /// Checked against the payload actually read.
    pub fn check_size(&self, size: usize) -> Option<SkipReason> {
        (size >= self.max_bytes).then_some(SkipReason::TooLarge {
            size,
            limit: self.max_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_is_never_uploaded() {
        let policy = AttachmentPolicy::default();
        assert_eq!(
            policy.check_mime("image/jpeg"),
            Some(SkipReason::BlockedMime("image/jpeg".to_string()))
        );
        assert!(policy.check_mime("IMAGE/JPEG").is_some());
    }

    #[test]
    fn test_size_limit_is_inclusive() {
        let policy = AttachmentPolicy::default();
        assert!(policy.check_size(8000).is_some());
        assert!(policy.check_size(12_000).is_some());
        assert_eq!(policy.check_size(7999), None);
    }

    #[test]
    fn test_small_text_is_uploaded() {
        let policy = AttachmentPolicy::default();
        assert_eq!(policy.check_mime("text/plain"), None);
        assert_eq!(policy.check_size(100), None);
    }
}
