// Remote Log Client - REST access to the bookkeeping service
// Every call is a single request with bearer authorization; there is no retry layer.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::RemoteConfig;
use crate::error::{AppError, AppResult};
use crate::models::{AttachmentUpload, NewLogEntry, RemoteId};

#[async_trait]
pub trait RemoteLogClient: Send + Sync {
    /// Create a top-level log entry.
    async fn create_log(&self, entry: &NewLogEntry) -> AppResult<RemoteId>;
    /// Create a reply inside the thread rooted at `root`, directly under `parent`.
    async fn create_reply(&self, entry: &NewLogEntry, parent: RemoteId, root: RemoteId) -> AppResult<RemoteId>;
    /// Look a tag up by its exact text.
    async fn find_tag(&self, tag_text: &str) -> AppResult<Option<RemoteId>>;
    async fn create_tag(&self, tag_text: &str) -> AppResult<RemoteId>;
    async fn link_tag(&self, tag_id: RemoteId, log_id: RemoteId) -> AppResult<()>;
    async fn upload_attachment(&self, log_id: RemoteId, attachment: &AttachmentUpload) -> AppResult<()>;
    async fn create_run(&self, run: &Value) -> AppResult<()>;
    /// Read-only call used by the connectivity check.
    async fn list_logs(&self) -> AppResult<Value>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogDto<'a> {
    title: &'a str,
    body: &'a str,
    origin: &'a str,
    subtype: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<i64>,
    attachments: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCommentDto<'a> {
    #[serde(flatten)]
    log: CreateLogDto<'a>,
    parent_id: RemoteId,
    root_id: RemoteId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTagDto<'a> {
    tag_text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkLogToTagDto {
    log_id: RemoteId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateAttachmentDto<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    creation_time: Option<String>,
    file_data: &'a str,
    file_mime: &'a str,
    file_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
}

impl<'a> CreateLogDto<'a> {
    fn from_entry(entry: &'a NewLogEntry) -> Self {
        Self {
            title: &entry.title,
            body: &entry.body,
            origin: &entry.origin,
            subtype: entry.subtype.as_str(),
            user: entry.user_id,
            attachments: Vec::new(),
        }
    }
}

impl<'a> CreateAttachmentDto<'a> {
    fn from_upload(attachment: &'a AttachmentUpload) -> Self {
        Self {
            // Logbook timestamps are stored as UTC wall-clock values without a zone
            creation_time: attachment
                .creation_time
                .map(|t| t.and_utc().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
            file_data: &attachment.file_data,
            file_mime: &attachment.file_mime,
            file_name: &attachment.file_name,
            title: attachment.title.as_deref(),
        }
    }
}

/// reqwest implementation of the remote client
pub struct HttpRemoteClient {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl HttpRemoteClient {
    pub fn new(config: &RemoteConfig, tls_skip_verify: bool) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(tls_skip_verify)
            .build()
            .map_err(|e| AppError::ConfigurationError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            api_token: config.api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: reqwest::RequestBuilder, operation: &str) -> AppResult<Value> {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| AppError::RemoteError(format!("{} request failed: {}", operation, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::RemoteError(format!("{} response unreadable: {}", operation, e)))?;
        debug!("{} -> {}", operation, status);

        if !status.is_success() {
            return Err(AppError::RemoteError(format!(
                "{} returned {}: {}",
                operation, status, body
            )));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| {
            AppError::DeserializationError(format!("{} returned invalid JSON: {}", operation, e))
        })
    }
}

#[async_trait]
impl RemoteLogClient for HttpRemoteClient {
    async fn create_log(&self, entry: &NewLogEntry) -> AppResult<RemoteId> {
        let dto = CreateLogDto::from_entry(entry);
        let payload = self
            .send(self.client.post(self.url("logs")).json(&dto), "POST /logs")
            .await?;
        item_id(&payload, "logId")
    }

    async fn create_reply(&self, entry: &NewLogEntry, parent: RemoteId, root: RemoteId) -> AppResult<RemoteId> {
        let dto = CreateCommentDto {
            log: CreateLogDto::from_entry(entry),
            parent_id: parent,
            root_id: root,
        };
        let payload = self
            .send(self.client.post(self.url("logs/threads")).json(&dto), "POST /logs/threads")
            .await?;
        item_id(&payload, "logId")
    }

    async fn find_tag(&self, tag_text: &str) -> AppResult<Option<RemoteId>> {
        let request = self.client.get(self.url("tags")).query(&[("tagText", tag_text)]);
        let payload = self.send(request, "GET /tags").await?;
        matching_item_id(&payload, "tagText", tag_text, "tagId")
    }

    async fn create_tag(&self, tag_text: &str) -> AppResult<RemoteId> {
        let payload = self
            .send(
                self.client.post(self.url("tags")).json(&CreateTagDto { tag_text }),
                "POST /tags",
            )
            .await?;
        item_id(&payload, "tagId")
    }

    async fn link_tag(&self, tag_id: RemoteId, log_id: RemoteId) -> AppResult<()> {
        let request = self
            .client
            .patch(self.url(&format!("tags/{}/logs", tag_id)))
            .json(&LinkLogToTagDto { log_id });
        self.send(request, "PATCH /tags/{id}/logs").await?;
        Ok(())
    }

    async fn upload_attachment(&self, log_id: RemoteId, attachment: &AttachmentUpload) -> AppResult<()> {
        let dto = CreateAttachmentDto::from_upload(attachment);
        let request = self
            .client
            .post(self.url(&format!("logs/{}/attachments", log_id)))
            .json(&dto);
        self.send(request, "POST /logs/{id}/attachments").await?;
        Ok(())
    }

    async fn create_run(&self, run: &Value) -> AppResult<()> {
        self.send(self.client.post(self.url("runs")).json(run), "POST /runs")
            .await?;
        Ok(())
    }

    async fn list_logs(&self) -> AppResult<Value> {
        self.send(self.client.get(self.url("logs")), "GET /logs").await
    }
}

fn as_remote_id(value: &Value) -> Option<RemoteId> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Identifier of a single-entity response, `{"data": {"item": {<field>: ..}}}`.
pub(crate) fn item_id(payload: &Value, field: &str) -> AppResult<RemoteId> {
    payload
        .pointer(&format!("/data/item/{}", field))
        .and_then(as_remote_id)
        .ok_or_else(|| {
            AppError::DeserializationError(format!("Response has no data.item.{}: {}", field, payload))
        })
}

/// Identifier of the list entry whose `match_field` equals `expected` exactly,
/// from `{"data": {"items": [..]}}`. Entries matching only loosely are ignored.
pub(crate) fn matching_item_id(
    payload: &Value,
    match_field: &str,
    expected: &str,
    id_field: &str,
) -> AppResult<Option<RemoteId>> {
    let items = payload
        .pointer("/data/items")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            AppError::DeserializationError(format!("Response has no data.items: {}", payload))
        })?;

    match items
        .iter()
        .find(|item| item.get(match_field).and_then(Value::as_str) == Some(expected))
    {
        None => Ok(None),
        Some(item) => item
            .get(id_field)
            .and_then(as_remote_id)
            .map(Some)
            .ok_or_else(|| {
                AppError::DeserializationError(format!("List item has no {}: {}", id_field, item))
            }),
    }
}
