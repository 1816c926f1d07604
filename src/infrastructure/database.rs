// Database Interface - Logbook source reads and direct target writes
// The logbook is read-only; the target is only written where the remote API has no endpoint.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};
use crate::migration::run_mapping::{FieldKind, RunFieldMapping, RunQuery};
use crate::models::{AttachmentMeta, CommentRecord, RunRow, SourceId, SubsystemRef, UserRecord};

/// Result of an insert-or-skip write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted { last_id: u64 },
    /// The row already existed (unique key hit).
    Skipped,
}

/// Read access to the legacy logbook tables
#[async_trait]
pub trait LogbookSource: Send + Sync {
    /// All comments, ordered by identifier.
    async fn fetch_comments(&self) -> AppResult<Vec<CommentRecord>>;
    async fn fetch_subsystems(&self) -> AppResult<Vec<SubsystemRef>>;
    /// `(comment id, subsystem id)` pairs of the association table.
    async fn fetch_comment_subsystems(&self) -> AppResult<Vec<(SourceId, i64)>>;
    /// All attachment metadata, ordered by comment then attachment identifier.
    async fn fetch_attachments(&self) -> AppResult<Vec<AttachmentMeta>>;
    async fn fetch_users(&self) -> AppResult<Vec<UserRecord>>;
    /// Runs inside the query bounds, decoding only the mapped columns.
    async fn fetch_runs(&self, query: &RunQuery, mappings: &[RunFieldMapping]) -> AppResult<Vec<RunRow>>;
}

/// Direct writes into the target's own storage
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Overwrites the creation time the remote API stamped at insert.
    async fn update_log_creation_time(&self, log_id: i64, created_at: NaiveDateTime) -> AppResult<()>;
    async fn insert_subsystem(&self, subsystem: &SubsystemRef) -> AppResult<InsertOutcome>;
    async fn insert_user(&self, user: &UserRecord) -> AppResult<InsertOutcome>;
}

/// Open a MySQL pool and verify the connection.
pub async fn connect_pool(config: &DatabaseConfig) -> AppResult<MySqlPool> {
    let (host, port) = config
        .host_and_port()
        .map_err(|e| AppError::ConfigurationError(e.to_string()))?;

    info!("Opening DB @ \"{}\"", config.redacted());

    let options = MySqlConnectOptions::new()
        .host(&host)
        .port(port)
        .username(&config.username)
        .password(&config.password)
        .database(&config.name);

    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .test_before_acquire(true)
        .connect_with(options)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to connect to {}: {}", config.redacted(), e))
        })?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Database health check failed: {}", e)))?;

    Ok(pool)
}

/// MySQL implementation of the logbook reader
pub struct MySqlLogbookSource {
    pool: MySqlPool,
}

impl MySqlLogbookSource {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn column<'r, T>(row: &'r MySqlRow, name: &str) -> AppResult<T>
where
    T: sqlx::Decode<'r, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
{
    row.try_get(name)
        .map_err(|e| AppError::DatabaseError(format!("Failed to scan column {}: {}", name, e)))
}

fn flag(row: &MySqlRow, name: &str) -> AppResult<bool> {
    Ok(column::<Option<i64>>(row, name)?.unwrap_or(0) != 0)
}

#[async_trait]
impl LogbookSource for MySqlLogbookSource {
    async fn fetch_comments(&self) -> AppResult<Vec<CommentRecord>> {
        let rows = sqlx::query(
            "SELECT id, run, userid, title, comment, class, comment_type, time_created, deleted, parent, root_parent \
             FROM logbook_comments ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to query logbook_comments: {}", e)))?;

        rows.iter()
            .map(|row| -> AppResult<CommentRecord> {
                Ok(CommentRecord {
                    id: column(row, "id")?,
                    run: column(row, "run")?,
                    user_id: column(row, "userid")?,
                    title: column(row, "title")?,
                    body: column(row, "comment")?,
                    class: column(row, "class")?,
                    comment_type: column(row, "comment_type")?,
                    created_at: column(row, "time_created")?,
                    deleted: flag(row, "deleted")?,
                    parent: column(row, "parent")?,
                    root_parent: column(row, "root_parent")?,
                })
            })
            .collect()
    }

    async fn fetch_subsystems(&self) -> AppResult<Vec<SubsystemRef>> {
        let rows = sqlx::query("SELECT id, name FROM logbook_subsystems ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to query logbook_subsystems: {}", e))
            })?;

        rows.iter()
            .map(|row| -> AppResult<SubsystemRef> {
                Ok(SubsystemRef {
                    id: column(row, "id")?,
                    name: column::<Option<String>>(row, "name")?.unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn fetch_comment_subsystems(&self) -> AppResult<Vec<(SourceId, i64)>> {
        let rows = sqlx::query(
            "SELECT commentid, subsystemid FROM logbook_comments_subsystems ORDER BY commentid, subsystemid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to query logbook_comments_subsystems: {}", e))
        })?;

        rows.iter()
            .map(|row| -> AppResult<(SourceId, i64)> {
                Ok((column(row, "commentid")?, column(row, "subsystemid")?))
            })
            .collect()
    }

    async fn fetch_attachments(&self) -> AppResult<Vec<AttachmentMeta>> {
        let rows = sqlx::query(
            "SELECT commentid, fileid, filename, size, title, content_type, time_created, deleted \
             FROM logbook_files ORDER BY commentid, fileid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to query logbook_files: {}", e)))?;

        rows.iter()
            .map(|row| -> AppResult<AttachmentMeta> {
                Ok(AttachmentMeta {
                    comment_id: column(row, "commentid")?,
                    attachment_id: column(row, "fileid")?,
                    file_name: column::<Option<String>>(row, "filename")?.unwrap_or_default(),
                    size: column(row, "size")?,
                    title: column(row, "title")?,
                    content_type: column(row, "content_type")?,
                    created_at: column(row, "time_created")?,
                    deleted: flag(row, "deleted")?,
                })
            })
            .collect()
    }

    async fn fetch_users(&self) -> AppResult<Vec<UserRecord>> {
        let rows = sqlx::query("SELECT id, username FROM logbook_users ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to query logbook_users: {}", e)))?;

        rows.iter()
            .map(|row| -> AppResult<UserRecord> {
                Ok(UserRecord {
                    id: column(row, "id")?,
                    username: column(row, "username")?,
                })
            })
            .collect()
    }

    async fn fetch_runs(&self, query: &RunQuery, mappings: &[RunFieldMapping]) -> AppResult<Vec<RunRow>> {
        let rows = sqlx::query("SELECT * FROM logbook WHERE run >= ? AND run <= ? ORDER BY run LIMIT ?")
            .bind(query.min_run)
            .bind(query.max_run)
            .bind(query.limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to query logbook runs: {}", e)))?;

        let mut runs = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut run = RunRow {
                run: column(row, "run")?,
                ..RunRow::default()
            };
            for mapping in mappings {
                let value = match mapping.kind {
                    FieldKind::Integer => column::<Option<i64>>(row, mapping.source)?
                        .map(serde_json::Value::from),
                    FieldKind::Text => column::<Option<String>>(row, mapping.source)?
                        .map(serde_json::Value::from),
                    FieldKind::EpochSeconds => column::<Option<f64>>(row, mapping.source)?
                        .map(serde_json::Value::from),
                };
                run.values
                    .insert(mapping.source.to_string(), value.unwrap_or(serde_json::Value::Null));
            }
            runs.push(run);
        }
        Ok(runs)
    }
}

/// MySQL implementation of the target store
pub struct MySqlTargetStore {
    pool: MySqlPool,
}

impl MySqlTargetStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn outcome(result: sqlx::mysql::MySqlQueryResult) -> InsertOutcome {
        if result.rows_affected() == 0 {
            InsertOutcome::Skipped
        } else {
            InsertOutcome::Inserted {
                last_id: result.last_insert_id(),
            }
        }
    }
}

#[async_trait]
impl TargetStore for MySqlTargetStore {
    async fn update_log_creation_time(&self, log_id: i64, created_at: NaiveDateTime) -> AppResult<()> {
        sqlx::query("UPDATE log SET creation_time = ? WHERE log_id = ?")
            .bind(created_at)
            .bind(log_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to update creation time of log {}: {}", log_id, e))
            })?;
        Ok(())
    }

    async fn insert_subsystem(&self, subsystem: &SubsystemRef) -> AppResult<InsertOutcome> {
        let result = sqlx::query("INSERT IGNORE INTO sub_system (subsystem_id, subsystem_name) VALUES (?, ?)")
            .bind(subsystem.id)
            .bind(&subsystem.name)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to insert subsystem {}: {}", subsystem.id, e))
            })?;
        Ok(Self::outcome(result))
    }

    async fn insert_user(&self, user: &UserRecord) -> AppResult<InsertOutcome> {
        let result = sqlx::query("INSERT IGNORE INTO user (user_id, external_id, sams_id) VALUES (?, ?, ?)")
            .bind(user.id)
            .bind(user.id)
            .bind(user.id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to insert user {}: {}", user.id, e)))?;
        Ok(Self::outcome(result))
    }
}
