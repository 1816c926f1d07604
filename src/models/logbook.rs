// Rows read from the legacy logbook database

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier assigned by the logbook database.
pub type SourceId = i64;

/// One row of `logbook_comments`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: SourceId,
    pub run: Option<i64>,
    pub user_id: Option<i64>,
    pub title: Option<String>,
    pub body: Option<String>,
    /// `HUMAN` or `PROCESS`
    pub class: Option<String>,
    /// `GENERAL`, `HARDWARE`, `CAVERN`, `DQM/QA`, `SOFTWARE`, `NETWORK`, `EOS`, `DCS` or `OTHER`
    pub comment_type: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub deleted: bool,
    pub parent: Option<SourceId>,
    pub root_parent: Option<SourceId>,
}

impl CommentRecord {
    /// A comment with neither a parent nor a root parent starts a thread.
    pub fn is_thread_root(&self) -> bool {
        self.parent.is_none() && self.root_parent.is_none()
    }

    /// Tag text encoding the comment type enum, if the row has one.
    pub fn type_tag(&self) -> Option<String> {
        self.comment_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| format!("COMMENT_TYPE/{}", t))
    }
}

/// One row of `logbook_files`. The bytes live on disk, see `blob_provider`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub comment_id: SourceId,
    pub attachment_id: i64,
    pub file_name: String,
    /// Size recorded in the database; the payload read from disk is authoritative.
    pub size: Option<i64>,
    pub title: Option<String>,
    pub content_type: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub deleted: bool,
}

impl AttachmentMeta {
    /// Text after the last `.` of the stored filename.
    pub fn extension(&self) -> &str {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .unwrap_or(self.file_name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: Option<String>,
}

/// One row of the `logbook` run table, reduced to the columns named in the run field mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRow {
    pub run: Option<i64>,
    /// Source column name -> decoded value (`Null` when the column was NULL).
    pub values: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(parent: Option<SourceId>, root_parent: Option<SourceId>) -> CommentRecord {
        CommentRecord {
            id: 1,
            run: None,
            user_id: Some(3),
            title: None,
            body: None,
            class: None,
            comment_type: Some("HARDWARE".to_string()),
            created_at: None,
            deleted: false,
            parent,
            root_parent,
        }
    }

    #[test]
    fn test_thread_root_requires_no_parent_and_no_root() {
        assert!(comment(None, None).is_thread_root());
        assert!(!comment(Some(1), Some(1)).is_thread_root());
        assert!(!comment(None, Some(1)).is_thread_root());
    }

    #[test]
    fn test_type_tag() {
        assert_eq!(comment(None, None).type_tag().as_deref(), Some("COMMENT_TYPE/HARDWARE"));

        let mut untyped = comment(None, None);
        untyped.comment_type = None;
        assert_eq!(untyped.type_tag(), None);
    }

    #[test]
    fn test_extension_uses_last_dot() {
        let mut meta = AttachmentMeta {
            comment_id: 1,
            attachment_id: 2,
            file_name: "scan.final.pdf".to_string(),
            size: None,
            title: None,
            content_type: None,
            created_at: None,
            deleted: false,
        };
        assert_eq!(meta.extension(), "pdf");

        meta.file_name = "README".to_string();
        assert_eq!(meta.extension(), "README");
    }
}
