// Content library - CRUD over content items and their schedules.
//
// One service fronts both stores so the cross-invariants hold in one
// place: a schedule is only accepted for live content, and deleting
// content cascades to every schedule referencing it.

use super::broadcast_models::{
    BroadcastError, ContentItem, ContentKind, ContentPayload, ScheduleEntry, Target, Trigger,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

// ============================================================================
// STORAGE TRAITS (PORTS)
// ============================================================================

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn insert(&self, item: ContentItem) -> Result<(), BroadcastError>;

    async fn get(&self, id: &str) -> Result<Option<ContentItem>, BroadcastError>;

    /// Returns `false` when the id is unknown.
    async fn remove(&self, id: &str) -> Result<bool, BroadcastError>;

    /// Returns `false` when the id is unknown.
    async fn set_display_name(&self, id: &str, name: &str) -> Result<bool, BroadcastError>;

    async fn all(&self) -> Result<Vec<ContentItem>, BroadcastError>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn upsert(&self, entry: ScheduleEntry) -> Result<(), BroadcastError>;

    async fn get(&self, id: &str) -> Result<Option<ScheduleEntry>, BroadcastError>;

    /// Returns `false` when the id is unknown.
    async fn remove(&self, id: &str) -> Result<bool, BroadcastError>;

    /// Remove every entry referencing the content id. Returns how many went.
    async fn remove_for_content(&self, content_id: &str) -> Result<usize, BroadcastError>;

    async fn active(&self) -> Result<Vec<ScheduleEntry>, BroadcastError>;
}

/// Blob storage for photo/video/audio payloads.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Persist a blob and return its opaque reference.
    async fn save(
        &self,
        content_id: &str,
        kind: ContentKind,
        bytes: &[u8],
    ) -> Result<String, BroadcastError>;

    /// Remove a blob; an already-missing blob is not an error.
    async fn remove(&self, blob_ref: &str) -> Result<(), BroadcastError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryStats {
    pub content_count: usize,
    pub active_schedules: usize,
}

pub struct ContentLibrary<C: ContentStore, S: ScheduleStore, M: MediaStore> {
    content: C,
    schedules: S,
    media: M,
}

impl<C: ContentStore, S: ScheduleStore, M: MediaStore> ContentLibrary<C, S, M> {
    pub fn new(content: C, schedules: S, media: M) -> Self {
        Self {
            content,
            schedules,
            media,
        }
    }

    /// Store a text content item. The body is carried inline.
    pub async fn add_text(
        &self,
        body: impl Into<String>,
        caption: Option<String>,
        display_name: Option<String>,
    ) -> Result<ContentItem, BroadcastError> {
        let id = Uuid::new_v4().to_string();
        let item = ContentItem {
            display_name: display_name.unwrap_or_else(|| id.clone()),
            id,
            kind: ContentKind::Text,
            payload: ContentPayload::Inline(body.into()),
            caption,
            created_at: Utc::now(),
        };
        self.content.insert(item.clone()).await?;
        tracing::info!(content_id = %item.id, "text content added");
        Ok(item)
    }

    /// Store a media content item; the bytes go to the media store and the
    /// item carries the blob reference.
    pub async fn add_media(
        &self,
        kind: ContentKind,
        bytes: &[u8],
        caption: Option<String>,
        display_name: Option<String>,
    ) -> Result<ContentItem, BroadcastError> {
        if kind.media_extension().is_none() {
            return Err(BroadcastError::Validation(
                "text content has no media payload".to_string(),
            ));
        }
        let id = Uuid::new_v4().to_string();
        let blob_ref = self.media.save(&id, kind, bytes).await?;
        let item = ContentItem {
            display_name: display_name.unwrap_or_else(|| id.clone()),
            id,
            kind,
            payload: ContentPayload::Blob(blob_ref),
            caption,
            created_at: Utc::now(),
        };
        self.content.insert(item.clone()).await?;
        tracing::info!(content_id = %item.id, kind = %item.kind, "media content added");
        Ok(item)
    }

    pub async fn get(&self, id: &str) -> Result<Option<ContentItem>, BroadcastError> {
        self.content.get(id).await
    }

    /// All content, oldest first.
    pub async fn list(&self) -> Result<Vec<ContentItem>, BroadcastError> {
        let mut items = self.content.all().await?;
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    pub async fn rename(&self, id: &str, new_name: &str) -> Result<bool, BroadcastError> {
        if new_name.trim().is_empty() {
            return Err(BroadcastError::Validation(
                "display name must not be empty".to_string(),
            ));
        }
        self.content.set_display_name(id, new_name.trim()).await
    }

    /// Delete a content item, its media blob, and every schedule referencing
    /// it. Returns `false` when the id is unknown.
    pub async fn remove(&self, id: &str) -> Result<bool, BroadcastError> {
        let Some(item) = self.content.get(id).await? else {
            return Ok(false);
        };

        if let ContentPayload::Blob(blob_ref) = &item.payload {
            if let Err(err) = self.media.remove(blob_ref).await {
                tracing::warn!(content_id = id, error = %err, "failed to remove media blob");
            }
        }

        self.content.remove(id).await?;
        let cascaded = self.schedules.remove_for_content(id).await?;
        tracing::info!(content_id = id, cascaded, "content removed");
        Ok(true)
    }

    /// Create a schedule for existing content.
    pub async fn schedule(
        &self,
        content_id: &str,
        trigger: Trigger,
        target: Target,
    ) -> Result<ScheduleEntry, BroadcastError> {
        if self.content.get(content_id).await?.is_none() {
            return Err(BroadcastError::UnknownContent(content_id.to_string()));
        }
        let entry = ScheduleEntry {
            id: Uuid::new_v4().to_string(),
            content_id: content_id.to_string(),
            trigger,
            target,
            created_at: Utc::now(),
            active: true,
        };
        self.schedules.upsert(entry.clone()).await?;
        tracing::info!(schedule_id = %entry.id, content_id, "schedule created");
        Ok(entry)
    }

    pub async fn remove_schedule(&self, id: &str) -> Result<bool, BroadcastError> {
        self.schedules.remove(id).await
    }

    pub async fn get_schedule(&self, id: &str) -> Result<Option<ScheduleEntry>, BroadcastError> {
        self.schedules.get(id).await
    }

    pub async fn active_schedules(&self) -> Result<Vec<ScheduleEntry>, BroadcastError> {
        self.schedules.active().await
    }

    /// Reassign the audience of the newest active schedule for a content id.
    /// "Newest" is decided by `created_at`, ties broken by schedule id, so
    /// the pick is deterministic. Returns `false` when there is none.
    pub async fn update_latest_target(
        &self,
        content_id: &str,
        target: Target,
    ) -> Result<bool, BroadcastError> {
        let latest = self
            .schedules
            .active()
            .await?
            .into_iter()
            .filter(|e| e.content_id == content_id)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        match latest {
            Some(mut entry) => {
                entry.target = target;
                self.schedules.upsert(entry).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Earliest upcoming fire instant across a content item's active
    /// schedules, for operator listings.
    pub async fn next_fire_at(
        &self,
        content_id: &str,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> Result<Option<DateTime<Utc>>, BroadcastError> {
        Ok(self
            .schedules
            .active()
            .await?
            .iter()
            .filter(|e| e.content_id == content_id)
            .filter_map(|e| e.trigger.next_fire_after(now, tz))
            .min())
    }

    pub async fn stats(&self) -> Result<LibraryStats, BroadcastError> {
        Ok(LibraryStats {
            content_count: self.content.all().await?.len(),
            active_schedules: self.schedules.active().await?.len(),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
