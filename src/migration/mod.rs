// Migration pipeline - thread reconstruction, tag resolution, replication and orchestration

pub mod attachment_policy;
pub mod orchestrator;
pub mod replicator;
pub mod run_mapping;
pub mod tag_resolver;
pub mod thread_builder;

pub use attachment_policy::{AttachmentPolicy, SkipReason};
pub use orchestrator::{CommentMigration, MigrationOptions, MigrationPlan, MigrationReport, Migrator};
pub use replicator::{ReplicatedNode, ReplicatorOptions, ReplyContext, ThreadContext, ThreadReplicator};
pub use run_mapping::{build_run_payload, RunFieldMapping, RunQuery, RUN_FIELD_MAPPINGS};
pub use tag_resolver::TagResolver;
pub use thread_builder::ThreadForest;
