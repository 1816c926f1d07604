// Tag Resolver - memoizing tag text -> remote tag id cache shared by all replication tasks
// The cache lock is held across the remote lookup/creation, so a text is never created twice.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::infrastructure::monitoring::MigrationMetrics;
use crate::infrastructure::remote_client::RemoteLogClient;
use crate::models::RemoteId;

pub struct TagResolver {
    client: Arc<dyn RemoteLogClient>,
    cache: Mutex<HashMap<String, RemoteId>>,
    metrics: Arc<MigrationMetrics>,
}

impl TagResolver {
    pub fn new(client: Arc<dyn RemoteLogClient>, metrics: Arc<MigrationMetrics>) -> Self {
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Remote identifier for `tag_text`, looking it up or creating it on first use.
    ///
    /// Errors from the lookup or creation are returned to the caller and nothing is cached.
    pub async fn resolve(&self, tag_text: &str) -> AppResult<RemoteId> {
        let mut cache = self.cache.lock().await;

        if let Some(id) = cache.get(tag_text) {
            self.metrics.record_tag_cache_hit();
            return Ok(*id);
        }

        let id = match self.client.find_tag(tag_text).await? {
            Some(id) => {
                debug!("Tag \"{}\" exists remotely with ID={}", tag_text, id);
                id
            }
            None => {
                let id = self.client.create_tag(tag_text).await?;
                self.metrics.record_tag_created();
                info!("Tag \"{}\" did not exist, created with ID={}", tag_text, id);
                id
            }
        };

        cache.insert(tag_text.to_string(), id);
        Ok(id)
    }

    /// Resolve `tag_text` and link it to a log entry.
    ///
    /// The link result is checked but never fatal: the service answers some successful links
    /// with a status the client reports as an error.
    pub async fn link(&self, log_id: RemoteId, tag_text: &str) -> AppResult<RemoteId> {
        let tag_id = self.resolve(tag_text).await?;

        if let Err(e) = self.client.link_tag(tag_id, log_id).await {
            self.metrics.record_tag_link_failure();
            warn!("Linking tag \"{}\" (ID={}) to log {} reported: {}", tag_text, tag_id, log_id, e);
        }

        Ok(tag_id)
    }

    /// Number of distinct tag texts resolved so far.
    #[cfg(test)]
    pub async fn cached(&self) -> usize {
        self.cache.lock().await.len()
    }
}
