// JSON-backed content store. Persists all items in a single document:
// { content_id: { kind, payload_ref, caption, display_name, created_at } }
//
// Writes go to a temp file first and are renamed into place so a crash
// mid-write never truncates the document.

use crate::core::broadcast::{
    BroadcastError, ContentItem, ContentKind, ContentPayload, ContentStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tokio::sync::RwLock;

#[derive(Debug, Serialize, Deserialize)]
struct ContentDoc {
    kind: ContentKind,
    payload_ref: String,
    caption: Option<String>,
    display_name: String,
    created_at: DateTime<Utc>,
}

impl ContentDoc {
    fn from_item(item: &ContentItem) -> Self {
        Self {
            kind: item.kind,
            payload_ref: item.payload.as_ref_str().to_string(),
            caption: item.caption.clone(),
            display_name: item.display_name.clone(),
            created_at: item.created_at,
        }
    }

    fn into_item(self, id: String) -> ContentItem {
        let payload = match self.kind {
            ContentKind::Text => ContentPayload::Inline(self.payload_ref),
            _ => ContentPayload::Blob(self.payload_ref),
        };
        ContentItem {
            id,
            kind: self.kind,
            payload,
            caption: self.caption,
            display_name: self.display_name,
            created_at: self.created_at,
        }
    }
}

pub struct JsonContentStore {
    path: PathBuf,
    cache: RwLock<HashMap<String, ContentItem>>,
}

impl JsonContentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cache = if path.exists() {
            let file = File::open(&path).expect("Failed to open content JSON file");
            let reader = BufReader::new(file);
            let docs: HashMap<String, ContentDoc> =
                serde_json::from_reader(reader).unwrap_or_default();
            docs.into_iter()
                .map(|(id, doc)| (id.clone(), doc.into_item(id)))
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
        let docs: HashMap<&String, ContentDoc> = cache
            .iter()
            .map(|(id, item)| (id, ContentDoc::from_item(item)))
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
impl ContentStore for JsonContentStore {
    async fn insert(&self, item: ContentItem) -> Result<(), BroadcastError> {
        let mut cache = self.cache.write().await;
        cache.insert(item.id.clone(), item);
        drop(cache);
        self.persist().await
    }

    async fn get(&self, id: &str) -> Result<Option<ContentItem>, BroadcastError> {
        let cache = self.cache.read().await;
        Ok(cache.get(id).cloned())
    }

    async fn remove(&self, id: &str) -> Result<bool, BroadcastError> {
        let mut cache = self.cache.write().await;
        let existed = cache.remove(id).is_some();
        drop(cache);
        if !existed {
            return Ok(false);
        }
        self.persist().await?;
        Ok(true)
    }

    async fn set_display_name(&self, id: &str, name: &str) -> Result<bool, BroadcastError> {
        let mut cache = self.cache.write().await;
        let Some(item) = cache.get_mut(id) else {
            return Ok(false);
        };
        item.display_name = name.to_string();
        drop(cache);
        self.persist().await?;
        Ok(true)
    }

    async fn all(&self) -> Result<Vec<ContentItem>, BroadcastError> {
        let cache = self.cache.read().await;
        Ok(cache.values().cloned().collect())
    }
}
