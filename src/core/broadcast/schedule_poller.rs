// Schedule poller - the periodic driver of the distribution engine.
//
// Each tick evaluates every active schedule, resolves the audience for the
// due ones, and fans out delivery with per-recipient failure isolation.
// One-shot schedules are removed before dispatch so a duplicate evaluation
// inside the same window cannot re-fire them.

use super::audience::resolve_audience;
use super::broadcast_models::ContentItem;
use super::content_library::{ContentLibrary, ContentStore, MediaStore, ScheduleStore};
use super::subscriber_service::{SubscriberService, SubscriberStore};
use crate::core::chats::ChatRegistry;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// DELIVERY PORT
// ============================================================================

/// Per-recipient delivery failure. `Blocked` is the permanent-unreachable
/// signal that triggers subscriber deactivation instead of a retry.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("recipient has blocked the bot")]
    Blocked,

    #[error("delivery failed: {0}")]
    Failed(String),
}

/// External send capability, one call per recipient. Implementations may
/// retry internally but must return within a bounded time so the sweep
/// finishes before the next tick.
#[async_trait]
pub trait DeliveryPort: Send + Sync {
    async fn send_to_user(&self, user_id: u64, content: &ContentItem) -> Result<(), DeliveryError>;

    async fn send_to_group(&self, chat_id: i64, content: &ContentItem)
        -> Result<(), DeliveryError>;
}

// ============================================================================
// POLLER
// ============================================================================

/// Aggregate counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Schedules that were due this tick.
    pub fired: usize,
    pub sent: usize,
    pub failed: usize,
}

pub struct SchedulePoller<C, S, M, U>
where
    C: ContentStore,
    S: ScheduleStore,
    M: MediaStore,
    U: SubscriberStore,
{
    library: Arc<ContentLibrary<C, S, M>>,
    subscribers: Arc<SubscriberService<U>>,
    chats: Arc<ChatRegistry>,
    delivery: Arc<dyn DeliveryPort>,
    tick: ChronoDuration,
    tz: Tz,
}

impl<C, S, M, U> SchedulePoller<C, S, M, U>
where
    C: ContentStore,
    S: ScheduleStore,
    M: MediaStore,
    U: SubscriberStore,
{
    pub fn new(
        library: Arc<ContentLibrary<C, S, M>>,
        subscribers: Arc<SubscriberService<U>>,
        chats: Arc<ChatRegistry>,
        delivery: Arc<dyn DeliveryPort>,
        tick: ChronoDuration,
        tz: Tz,
    ) -> Self {
        Self {
            library,
            subscribers,
            chats,
            delivery,
            tick,
            tz,
        }
    }

    /// Evaluate every active schedule once. Runs to completion; nothing in
    /// here is fatal - failures degrade to logged skips.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let entries = match self.library.active_schedules().await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!(error = %err, "could not load schedules, skipping sweep");
                return report;
            }
        };

        for entry in entries {
            if !entry.is_due(now, self.tick, self.tz) {
                continue;
            }
            report.fired += 1;

            // One-shot entries go away first; even if delivery stalls into
            // the next tick the entry cannot be evaluated again.
            if !entry.trigger.is_recurring() {
                match self.library.remove_schedule(&entry.id).await {
                    Ok(_) => tracing::info!(schedule_id = %entry.id, "one-shot schedule removed"),
                    Err(err) => {
                        tracing::error!(schedule_id = %entry.id, error = %err, "failed to remove one-shot schedule")
                    }
                }
            }

            let content = match self.library.get(&entry.content_id).await {
                Ok(Some(content)) => content,
                Ok(None) => {
                    tracing::warn!(
                        schedule_id = %entry.id,
                        content_id = %entry.content_id,
                        "schedule references missing content, skipping"
                    );
                    continue;
                }
                Err(err) => {
                    tracing::error!(schedule_id = %entry.id, error = %err, "content lookup failed");
                    continue;
                }
            };

            let subscribers = match self.subscribers.all().await {
                Ok(subscribers) => subscribers,
                Err(err) => {
                    tracing::error!(error = %err, "subscriber lookup failed, skipping firing");
                    continue;
                }
            };

            let audience =
                resolve_audience(&entry.target, &subscribers, &self.chats.known_groups());
            if !audience.unresolved.is_empty() {
                tracing::warn!(
                    schedule_id = %entry.id,
                    handles = ?audience.unresolved,
                    "explicit handles never subscribed, cannot deliver to them"
                );
            }

            let (sent, failed) = self.dispatch(&content, &audience.users, &audience.groups).await;
            report.sent += sent;
            report.failed += failed;

            tracing::info!(
                schedule_id = %entry.id,
                content_id = %content.id,
                sent,
                failed,
                "schedule fired"
            );
        }

        report
    }

    /// Deliver to every resolved recipient. One recipient's failure never
    /// aborts delivery to the rest.
    async fn dispatch(&self, content: &ContentItem, users: &[u64], groups: &[i64]) -> (usize, usize) {
        let mut sent = 0;
        let mut failed = 0;

        for user_id in users {
            match self.delivery.send_to_user(*user_id, content).await {
                Ok(()) => sent += 1,
                Err(DeliveryError::Blocked) => {
                    failed += 1;
                    if let Err(err) = self.subscribers.mark_unreachable(*user_id).await {
                        tracing::error!(user_id, error = %err, "failed to deactivate unreachable subscriber");
                    }
                }
                Err(err) => {
                    failed += 1;
                    tracing::warn!(user_id, error = %err, "delivery to user failed");
                }
            }
        }

        for chat_id in groups {
            match self.delivery.send_to_group(*chat_id, content).await {
                Ok(()) => sent += 1,
                Err(err) => {
                    failed += 1;
                    tracing::warn!(chat_id, error = %err, "delivery to group failed");
                }
            }
        }

        (sent, failed)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::broadcast::broadcast_models::{
        BroadcastError, ContentKind, ScheduleEntry, Subscriber, Target, Trigger,
    };
    use chrono::NaiveTime;
    use dashmap::DashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockContentStore {
        items: DashMap<String, ContentItem>,
    }

    #[async_trait]
    impl ContentStore for MockContentStore {
        async fn insert(&self, item: ContentItem) -> Result<(), BroadcastError> {
            self.items.insert(item.id.clone(), item);
            Ok(())
        }

        async fn get(&self, id: &str) -> Result<Option<ContentItem>, BroadcastError> {
            Ok(self.items.get(id).map(|i| i.clone()))
        }

        async fn remove(&self, id: &str) -> Result<bool, BroadcastError> {
            Ok(self.items.remove(id).is_some())
        }

        async fn set_display_name(&self, id: &str, name: &str) -> Result<bool, BroadcastError> {
            match self.items.get_mut(id) {
                Some(mut item) => {
                    item.display_name = name.to_string();
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn all(&self) -> Result<Vec<ContentItem>, BroadcastError> {
            Ok(self.items.iter().map(|i| i.clone()).collect())
        }
    }

    #[derive(Default)]
    struct MockScheduleStore {
        entries: DashMap<String, ScheduleEntry>,
    }

    #[async_trait]
    impl ScheduleStore for MockScheduleStore {
        async fn upsert(&self, entry: ScheduleEntry) -> Result<(), BroadcastError> {
            self.entries.insert(entry.id.clone(), entry);
            Ok(())
        }

        async fn get(&self, id: &str) -> Result<Option<ScheduleEntry>, BroadcastError> {
            Ok(self.entries.get(id).map(|e| e.clone()))
        }

        async fn remove(&self, id: &str) -> Result<bool, BroadcastError> {
            Ok(self.entries.remove(id).is_some())
        }

        async fn remove_for_content(&self, content_id: &str) -> Result<usize, BroadcastError> {
            let before = self.entries.len();
            self.entries.retain(|_, entry| entry.content_id != content_id);
            Ok(before - self.entries.len())
        }

        async fn active(&self) -> Result<Vec<ScheduleEntry>, BroadcastError> {
            Ok(self
                .entries
                .iter()
                .filter(|e| e.active)
                .map(|e| e.clone())
                .collect())
        }
    }

    #[derive(Default)]
    struct MockMediaStore;

    #[async_trait]
    impl MediaStore for MockMediaStore {
        async fn save(
            &self,
            content_id: &str,
            kind: ContentKind,
            _bytes: &[u8],
        ) -> Result<String, BroadcastError> {
            Ok(format!(
                "{}.{}",
                content_id,
                kind.media_extension().unwrap_or("bin")
            ))
        }

        async fn remove(&self, _blob_ref: &str) -> Result<(), BroadcastError> {
            Ok(())
        }
    }

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

    #[derive(Default)]
    struct MockDelivery {
        user_sends: Mutex<Vec<(u64, String)>>,
        group_sends: Mutex<Vec<(i64, String)>>,
        blocked_users: Vec<u64>,
        failing_users: Vec<u64>,
    }

    #[async_trait]
    impl DeliveryPort for MockDelivery {
        async fn send_to_user(
            &self,
            user_id: u64,
            content: &ContentItem,
        ) -> Result<(), DeliveryError> {
            if self.blocked_users.contains(&user_id) {
                return Err(DeliveryError::Blocked);
            }
            if self.failing_users.contains(&user_id) {
                return Err(DeliveryError::Failed("flood limit".to_string()));
            }
            self.user_sends
                .lock()
                .unwrap()
                .push((user_id, content.payload.as_ref_str().to_string()));
            Ok(())
        }

        async fn send_to_group(
            &self,
            chat_id: i64,
            content: &ContentItem,
        ) -> Result<(), DeliveryError> {
            self.group_sends
                .lock()
                .unwrap()
                .push((chat_id, content.payload.as_ref_str().to_string()));
            Ok(())
        }
    }

    struct Fixture {
        poller: SchedulePoller<MockContentStore, MockScheduleStore, MockMediaStore, MockSubscriberStore>,
        library: Arc<ContentLibrary<MockContentStore, MockScheduleStore, MockMediaStore>>,
        subscribers: Arc<SubscriberService<MockSubscriberStore>>,
        chats: Arc<ChatRegistry>,
        delivery: Arc<MockDelivery>,
    }

    fn fixture(delivery: MockDelivery) -> Fixture {
        let library = Arc::new(ContentLibrary::new(
            MockContentStore::default(),
            MockScheduleStore::default(),
            MockMediaStore::default(),
        ));
        let subscribers = Arc::new(SubscriberService::new(MockSubscriberStore::default()));
        let chats = Arc::new(ChatRegistry::new());
        let delivery = Arc::new(delivery);
        let poller = SchedulePoller::new(
            Arc::clone(&library),
            Arc::clone(&subscribers),
            Arc::clone(&chats),
            Arc::clone(&delivery) as Arc<dyn DeliveryPort>,
            ChronoDuration::seconds(60),
            chrono_tz::UTC,
        );
        Fixture {
            poller,
            library,
            subscribers,
            chats,
            delivery,
        }
    }

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn once_schedule_delivers_once_then_disappears() {
        let f = fixture(MockDelivery::default());
        f.subscribers
            .subscribe(1, Some("alice".to_string()), None)
            .await
            .unwrap();
        let content = f.library.add_text("hello", None, None).await.unwrap();
        let entry = f
            .library
            .schedule(
                &content.id,
                Trigger::Once(utc("2025-03-10T12:01:00Z")),
                Target::All,
            )
            .await
            .unwrap();

        // Before the target instant: nothing happens.
        let early = f.poller.sweep(utc("2025-03-10T12:00:00Z")).await;
        assert_eq!(early, SweepReport::default());

        // The tick past the instant delivers and removes the schedule.
        let report = f.poller.sweep(utc("2025-03-10T12:01:10Z")).await;
        assert_eq!(
            report,
            SweepReport {
                fired: 1,
                sent: 1,
                failed: 0
            }
        );
        assert_eq!(
            f.delivery.user_sends.lock().unwrap().clone(),
            vec![(1, "hello".to_string())]
        );
        assert!(f.library.get_schedule(&entry.id).await.unwrap().is_none());

        // A duplicate evaluation in the same window finds nothing to fire.
        let again = f.poller.sweep(utc("2025-03-10T12:01:30Z")).await;
        assert_eq!(again, SweepReport::default());
    }

    #[tokio::test]
    async fn one_recipient_failure_does_not_abort_the_rest() {
        let f = fixture(MockDelivery {
            failing_users: vec![2],
            ..Default::default()
        });
        f.subscribers.subscribe(1, None, None).await.unwrap();
        f.subscribers.subscribe(2, None, None).await.unwrap();
        f.subscribers.subscribe(3, None, None).await.unwrap();
        let content = f.library.add_text("news", None, None).await.unwrap();
        f.library
            .schedule(
                &content.id,
                Trigger::Daily(NaiveTime::from_hms_opt(14, 30, 0).unwrap()),
                Target::Subscribers,
            )
            .await
            .unwrap();

        let report = f.poller.sweep(utc("2025-03-10T14:30:00Z")).await;

        assert_eq!(report.fired, 1);
        assert_eq!(report.sent, 2);
        assert_eq!(report.failed, 1);
        // A transient failure does not deactivate anyone.
        assert_eq!(f.subscribers.active_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn blocked_recipient_is_deactivated() {
        let f = fixture(MockDelivery {
            blocked_users: vec![2],
            ..Default::default()
        });
        f.subscribers.subscribe(1, None, None).await.unwrap();
        f.subscribers.subscribe(2, None, None).await.unwrap();
        let content = f.library.add_text("news", None, None).await.unwrap();
        f.library
            .schedule(
                &content.id,
                Trigger::Daily(NaiveTime::from_hms_opt(14, 30, 0).unwrap()),
                Target::Subscribers,
            )
            .await
            .unwrap();

        let report = f.poller.sweep(utc("2025-03-10T14:30:00Z")).await;

        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(f.subscribers.active_count().await.unwrap(), 1);
        assert!(!f.subscribers.is_subscriber(2).await.unwrap());
    }

    #[tokio::test]
    async fn recurring_schedule_survives_its_firing() {
        let f = fixture(MockDelivery::default());
        f.chats.observe_chat(-100, Some("Announcements"));
        let content = f.library.add_text("daily digest", None, None).await.unwrap();
        let entry = f
            .library
            .schedule(
                &content.id,
                Trigger::Daily(NaiveTime::from_hms_opt(14, 30, 0).unwrap()),
                Target::Groups,
            )
            .await
            .unwrap();

        let report = f.poller.sweep(utc("2025-03-10T14:30:00Z")).await;
        assert_eq!(report.fired, 1);
        assert_eq!(
            f.delivery.group_sends.lock().unwrap().clone(),
            vec![(-100, "daily digest".to_string())]
        );
        assert!(f.library.get_schedule(&entry.id).await.unwrap().is_some());

        // Off the matching minute: silent.
        let off = f.poller.sweep(utc("2025-03-10T14:31:00Z")).await;
        assert_eq!(off, SweepReport::default());
    }

    #[tokio::test]
    async fn unresolved_explicit_handles_deliver_nothing() {
        let f = fixture(MockDelivery::default());
        f.subscribers
            .subscribe(1, Some("alice".to_string()), None)
            .await
            .unwrap();
        let content = f.library.add_text("invite", None, None).await.unwrap();
        f.library
            .schedule(
                &content.id,
                Trigger::Daily(NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
                Target::explicit(["@ghost"]),
            )
            .await
            .unwrap();

        let report = f.poller.sweep(utc("2025-03-10T09:00:00Z")).await;

        assert_eq!(report.fired, 1);
        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, 0);
        assert!(f.delivery.user_sends.lock().unwrap().is_empty());
    }
}
