// Entries sent to the remote bookkeeping service

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Identifier assigned by the remote service; unrelated to logbook identifiers.
pub type RemoteId = i64;

pub const ORIGIN_HUMAN: &str = "human";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogSubtype {
    Run,
    Comment,
}

impl LogSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSubtype::Run => "run",
            LogSubtype::Comment => "comment",
        }
    }
}

/// Content shared by top-level log entries and threaded replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub title: String,
    pub body: String,
    pub user_id: Option<i64>,
    pub origin: String,
    pub subtype: LogSubtype,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub file_mime: String,
    pub title: Option<String>,
    /// Base64 (standard alphabet) encoded payload.
    pub file_data: String,
    pub creation_time: Option<NaiveDateTime>,
}
