// JSON-backed subscriber store. One document:
// { user_id: { handle, display_name, subscribed_at, active } }

use crate::core::broadcast::{BroadcastError, Subscriber, SubscriberStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tokio::sync::RwLock;

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
struct SubscriberDoc {
    handle: Option<String>,
    display_name: Option<String>,
    subscribed_at: DateTime<Utc>,
    #[serde(default = "default_true")]
    active: bool,
}

impl SubscriberDoc {
    fn from_subscriber(subscriber: &Subscriber) -> Self {
        Self {
            handle: subscriber.handle.clone(),
            display_name: subscriber.display_name.clone(),
            subscribed_at: subscriber.subscribed_at,
            active: subscriber.active,
        }
    }

    fn into_subscriber(self, user_id: u64) -> Subscriber {
        Subscriber {
            user_id,
            handle: self.handle,
            display_name: self.display_name,
            subscribed_at: self.subscribed_at,
            active: self.active,
        }
    }
}

pub struct JsonSubscriberStore {
    path: PathBuf,
    cache: RwLock<HashMap<u64, Subscriber>>,
}

impl JsonSubscriberStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cache = if path.exists() {
            let file = File::open(&path).expect("Failed to open subscriber JSON file");
            let reader = BufReader::new(file);
            let docs: HashMap<u64, SubscriberDoc> =
                serde_json::from_reader(reader).unwrap_or_default();
            docs.into_iter()
                .map(|(user_id, doc)| (user_id, doc.into_subscriber(user_id)))
                .collect()
        } else {
            HashMap::new()
        };

        Self {
            path,
            cache: RwLock::new(cache),
        }
    }

    async fn persist(&self) -> Result<(), BroadcastError> {
        let cache = self.cache.read().await;
        let docs: HashMap<u64, SubscriberDoc> = cache
            .iter()
            .map(|(user_id, subscriber)| (*user_id, SubscriberDoc::from_subscriber(subscriber)))
            .collect();

        let tmp = self.path.with_extension("tmp");
        let file = File::create(&tmp).map_err(|e| BroadcastError::Storage(e.to_string()))?;
        serde_json::to_writer_pretty(file, &docs)
            .map_err(|e| BroadcastError::Storage(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| BroadcastError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl SubscriberStore for JsonSubscriberStore {
    async fn upsert(&self, subscriber: Subscriber) -> Result<(), BroadcastError> {
        let mut cache = self.cache.write().await;
        cache.insert(subscriber.user_id, subscriber);
        drop(cache);
        self.persist().await
    }

    async fn get(&self, user_id: u64) -> Result<Option<Subscriber>, BroadcastError> {
        let cache = self.cache.read().await;
        Ok(cache.get(&user_id).cloned())
    }

    async fn all(&self) -> Result<Vec<Subscriber>, BroadcastError> {
        let cache = self.cache.read().await;
        Ok(cache.values().cloned().collect())
    }
}
