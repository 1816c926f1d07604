// Migration data model - source logbook rows and outgoing bookkeeping entries

pub mod logbook;
pub mod remote;

pub use logbook::{AttachmentMeta, CommentRecord, RunRow, SourceId, SubsystemRef, UserRecord};
pub use remote::{AttachmentUpload, LogSubtype, NewLogEntry, RemoteId, ORIGIN_HUMAN};
