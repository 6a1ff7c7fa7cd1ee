// Subscriber registry - who receives scheduled content.
//
// Records are soft-deleted: unsubscribing (or a confirmed unreachable
// delivery) deactivates the record but keeps it for history.

use super::broadcast_models::{BroadcastError, Subscriber};
use async_trait::async_trait;
use chrono::Utc;

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn upsert(&self, subscriber: Subscriber) -> Result<(), BroadcastError>;

    async fn get(&self, user_id: u64) -> Result<Option<Subscriber>, BroadcastError>;

    async fn all(&self) -> Result<Vec<Subscriber>, BroadcastError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct SubscriberService<S: SubscriberStore> {
    store: S,
}

impl<S: SubscriberStore> SubscriberService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Subscribe a user. Returns `false` if they were already active.
    /// A returning user gets a fresh `subscribed_at`.
    pub async fn subscribe(
        &self,
        user_id: u64,
        handle: Option<String>,
        display_name: Option<String>,
    ) -> Result<bool, BroadcastError> {
        if let Some(existing) = self.store.get(user_id).await? {
            if existing.active {
                return Ok(false);
            }
        }
        self.store
            .upsert(Subscriber {
                user_id,
                handle,
                display_name,
                subscribed_at: Utc::now(),
                active: true,
            })
            .await?;
        tracing::info!(user_id, "subscriber added");
        Ok(true)
    }

    /// Deactivate a subscriber. Returns `false` if they were not active.
    pub async fn unsubscribe(&self, user_id: u64) -> Result<bool, BroadcastError> {
        match self.store.get(user_id).await? {
            Some(mut subscriber) if subscriber.active => {
                subscriber.active = false;
                self.store.upsert(subscriber).await?;
                tracing::info!(user_id, "subscriber deactivated");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Deactivate a subscriber the delivery port reported as permanently
    /// unreachable (e.g. the recipient blocked the bot).
    pub async fn mark_unreachable(&self, user_id: u64) -> Result<(), BroadcastError> {
        if self.unsubscribe(user_id).await? {
            tracing::warn!(user_id, "subscriber unreachable, deactivated");
        }
        Ok(())
    }

    pub async fn is_subscriber(&self, user_id: u64) -> Result<bool, BroadcastError> {
        Ok(self
            .store
            .get(user_id)
            .await?
            .map(|s| s.active)
            .unwrap_or(false))
    }

    /// Every record, active or not. Audience resolution filters itself.
    pub async fn all(&self) -> Result<Vec<Subscriber>, BroadcastError> {
        self.store.all().await
    }

    pub async fn active(&self) -> Result<Vec<Subscriber>, BroadcastError> {
        Ok(self
            .store
            .all()
            .await?
            .into_iter()
            .filter(|s| s.active)
            .collect())
    }

    pub async fn active_count(&self) -> Result<usize, BroadcastError> {
        Ok(self.active().await?.len())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;

    #[derive(Default)]
    struct MockSubscriberStore {
        subscribers: DashMap<u64, Subscriber>,
    }

    #[async_trait]
    impl SubscriberStore for MockSubscriberStore {
        async fn upsert(&self, subscriber: Subscriber) -> Result<(), BroadcastError> {
            self.subscribers.insert(subscriber.user_id, subscriber);
            Ok(())
        }

        async fn get(&self, user_id: u64) -> Result<Option<Subscriber>, BroadcastError> {
            Ok(self.subscribers.get(&user_id).map(|s| s.clone()))
        }

        async fn all(&self) -> Result<Vec<Subscriber>, BroadcastError> {
            Ok(self.subscribers.iter().map(|s| s.clone()).collect())
        }
    }

    #[tokio::test]
    async fn subscribe_is_idempotent_for_active_users() {
        let service = SubscriberService::new(MockSubscriberStore::default());

        assert!(service
            .subscribe(1, Some("alice".to_string()), None)
            .await
            .unwrap());
        assert!(!service
            .subscribe(1, Some("alice".to_string()), None)
            .await
            .unwrap());
        assert_eq!(service.active_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_soft_deletes() {
        let service = SubscriberService::new(MockSubscriberStore::default());
        service.subscribe(1, None, None).await.unwrap();

        assert!(service.unsubscribe(1).await.unwrap());
        assert!(!service.unsubscribe(1).await.unwrap());

        // Record survives for history, just inactive.
        assert_eq!(service.all().await.unwrap().len(), 1);
        assert_eq!(service.active_count().await.unwrap(), 0);
        assert!(!service.is_subscriber(1).await.unwrap());
    }

    #[tokio::test]
    async fn resubscribe_reactivates() {
        let service = SubscriberService::new(MockSubscriberStore::default());
        service.subscribe(1, None, None).await.unwrap();
        service.unsubscribe(1).await.unwrap();

        assert!(service.subscribe(1, None, None).await.unwrap());
        assert!(service.is_subscriber(1).await.unwrap());
    }
}
