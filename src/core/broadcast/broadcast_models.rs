// Broadcast domain models - content items, schedules, subscribers.
//
// Triggers and targets are tagged enums enforced at construction; the
// flat legacy document layout only exists at the store boundary.

use chrono::{DateTime, Datelike, Days, Duration as ChronoDuration, NaiveTime, TimeZone, Timelike,
    Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum BroadcastError {
    /// A schedule referenced a content id that does not exist.
    #[error("unknown content id: {0}")]
    UnknownContent(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

// ============================================================================
// CONTENT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Photo,
    Video,
    Audio,
}

impl ContentKind {
    /// File extension used when the payload is stored as a media blob.
    pub fn media_extension(&self) -> Option<&'static str> {
        match self {
            ContentKind::Text => None,
            ContentKind::Photo => Some("jpg"),
            ContentKind::Video => Some("mp4"),
            ContentKind::Audio => Some("mp3"),
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::Text => write!(f, "text"),
            ContentKind::Photo => write!(f, "photo"),
            ContentKind::Video => write!(f, "video"),
            ContentKind::Audio => write!(f, "audio"),
        }
    }
}

/// Either the text body itself or an opaque reference to a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPayload {
    Inline(String),
    Blob(String),
}

impl ContentPayload {
    pub fn as_ref_str(&self) -> &str {
        match self {
            ContentPayload::Inline(text) => text,
            ContentPayload::Blob(blob_ref) => blob_ref,
        }
    }
}

/// A stored piece of content available for distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    pub id: String,
    pub kind: ContentKind,
    pub payload: ContentPayload,
    pub caption: Option<String>,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// SCHEDULES
// ============================================================================

/// When a schedule fires. Exactly one variant per entry, fixed at creation.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Fire once at an instant, then the entry is removed.
    Once(DateTime<Utc>),
    /// Fire every day at a local time.
    Daily(NaiveTime),
    /// Fire every week on one weekday at a local time.
    Weekly { time: NaiveTime, weekday: Weekday },
}

impl Trigger {
    pub fn is_recurring(&self) -> bool {
        !matches!(self, Trigger::Once(_))
    }

    /// Whether the trigger fires at `now`.
    ///
    /// `Once` fires when `now` has reached the target and less than one tick
    /// has passed since - an entry missed by more than one tick is skipped,
    /// never fired late. `Daily`/`Weekly` fire only when the local
    /// minute-of-day (and weekday) matches exactly, so the tick interval
    /// must stay within one minute.
    pub fn is_due(&self, now: DateTime<Utc>, tick: ChronoDuration, tz: Tz) -> bool {
        match self {
            Trigger::Once(at) => {
                let elapsed = now.signed_duration_since(*at);
                elapsed >= ChronoDuration::zero() && elapsed < tick
            }
            Trigger::Daily(time) => {
                let local = now.with_timezone(&tz).time();
                local.hour() == time.hour() && local.minute() == time.minute()
            }
            Trigger::Weekly { time, weekday } => {
                let local = now.with_timezone(&tz);
                local.weekday() == *weekday
                    && local.hour() == time.hour()
                    && local.minute() == time.minute()
            }
        }
    }

    /// The next instant this trigger fires at or after `now`, if any.
    pub fn next_fire_after(&self, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Once(at) => (*at >= now).then_some(*at),
            Trigger::Daily(time) => next_local_occurrence(now, tz, *time, None),
            Trigger::Weekly { time, weekday } => {
                next_local_occurrence(now, tz, *time, Some(*weekday))
            }
        }
    }
}

/// Earliest local-time occurrence at or after `now`. Scans a few days ahead
/// so weekly targets and DST gaps both resolve.
fn next_local_occurrence(
    now: DateTime<Utc>,
    tz: Tz,
    time: NaiveTime,
    weekday: Option<Weekday>,
) -> Option<DateTime<Utc>> {
    let local_now = now.with_timezone(&tz);
    for day_offset in 0..=8u64 {
        let Some(date) = local_now
            .date_naive()
            .checked_add_days(Days::new(day_offset))
        else {
            continue;
        };
        if let Some(target) = weekday {
            if date.weekday() != target {
                continue;
            }
        }
        let Some(candidate) = tz.from_local_datetime(&date.and_time(time)).earliest() else {
            continue;
        };
        let candidate = candidate.with_timezone(&Utc);
        if candidate >= now {
            return Some(candidate);
        }
    }
    None
}

/// Which audience a schedule addresses.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Active subscribers plus every known group chat.
    All,
    /// Active subscribers only.
    Subscribers,
    /// Known group chats only.
    Groups,
    /// Active subscribers whose handle is on the list. Handles are
    /// normalized at construction.
    Explicit(Vec<String>),
}

impl Target {
    /// Build an explicit-handle target, normalizing and dropping empties.
    pub fn explicit<I, S>(handles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized = handles
            .into_iter()
            .map(|h| crate::core::moderation::normalize_handle(h.as_ref()))
            .filter(|h| !h.is_empty())
            .collect();
        Target::Explicit(normalized)
    }
}

/// A schedule binding a content item to a trigger and an audience.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub id: String,
    pub content_id: String,
    pub trigger: Trigger,
    pub target: Target,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

impl ScheduleEntry {
    pub fn is_due(&self, now: DateTime<Utc>, tick: ChronoDuration, tz: Tz) -> bool {
        self.active && self.trigger.is_due(now, tick, tz)
    }
}

// ============================================================================
// SUBSCRIBERS
// ============================================================================

/// One subscriber record. Unsubscribing or a confirmed unreachable delivery
/// flips `active` off; the record stays for history.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscriber {
    pub user_id: u64,
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub subscribed_at: DateTime<Utc>,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn tick() -> ChronoDuration {
        ChronoDuration::seconds(60)
    }

    #[test]
    fn daily_fires_only_on_the_exact_minute() {
        let trigger = Trigger::Daily(NaiveTime::from_hms_opt(14, 30, 0).unwrap());

        assert!(trigger.is_due(utc("2025-03-10T14:30:00Z"), tick(), chrono_tz::UTC));
        assert!(trigger.is_due(utc("2025-03-10T14:30:59Z"), tick(), chrono_tz::UTC));
        assert!(!trigger.is_due(utc("2025-03-10T14:29:59Z"), tick(), chrono_tz::UTC));
        assert!(!trigger.is_due(utc("2025-03-10T14:31:00Z"), tick(), chrono_tz::UTC));
    }

    #[test]
    fn daily_due_check_respects_the_bot_timezone() {
        let trigger = Trigger::Daily(NaiveTime::from_hms_opt(14, 30, 0).unwrap());
        let tz: Tz = "Asia/Novosibirsk".parse().unwrap(); // UTC+7

        assert!(trigger.is_due(utc("2025-03-10T07:30:00Z"), tick(), tz));
        assert!(!trigger.is_due(utc("2025-03-10T14:30:00Z"), tick(), tz));
    }

    #[test]
    fn weekly_requires_the_matching_weekday() {
        let trigger = Trigger::Weekly {
            time: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            weekday: Weekday::Mon,
        };

        // 2025-03-10 is a Monday.
        assert!(trigger.is_due(utc("2025-03-10T09:15:30Z"), tick(), chrono_tz::UTC));
        assert!(!trigger.is_due(utc("2025-03-11T09:15:30Z"), tick(), chrono_tz::UTC));
    }

    #[test]
    fn once_fires_within_one_tick_and_never_late() {
        let trigger = Trigger::Once(utc("2025-03-10T12:00:00Z"));

        assert!(!trigger.is_due(utc("2025-03-10T11:59:59Z"), tick(), chrono_tz::UTC));
        assert!(trigger.is_due(utc("2025-03-10T12:00:00Z"), tick(), chrono_tz::UTC));
        assert!(trigger.is_due(utc("2025-03-10T12:00:59Z"), tick(), chrono_tz::UTC));
        // Missed by more than one tick - silently skipped, not fired stale.
        assert!(!trigger.is_due(utc("2025-03-10T12:01:00Z"), tick(), chrono_tz::UTC));
    }

    #[test]
    fn next_fire_rolls_daily_to_tomorrow() {
        let trigger = Trigger::Daily(NaiveTime::from_hms_opt(8, 0, 0).unwrap());

        let next = trigger
            .next_fire_after(utc("2025-03-10T09:00:00Z"), chrono_tz::UTC)
            .unwrap();
        assert_eq!(next, utc("2025-03-11T08:00:00Z"));

        let today = trigger
            .next_fire_after(utc("2025-03-10T07:00:00Z"), chrono_tz::UTC)
            .unwrap();
        assert_eq!(today, utc("2025-03-10T08:00:00Z"));
    }

    #[test]
    fn next_fire_finds_the_coming_weekday() {
        let trigger = Trigger::Weekly {
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            weekday: Weekday::Fri,
        };

        // From Monday 2025-03-10, the next Friday is 2025-03-14.
        let next = trigger
            .next_fire_after(utc("2025-03-10T12:00:00Z"), chrono_tz::UTC)
            .unwrap();
        assert_eq!(next, utc("2025-03-14T09:00:00Z"));
    }

    #[test]
    fn expired_once_trigger_has_no_next_fire() {
        let trigger = Trigger::Once(utc("2025-03-10T12:00:00Z"));
        assert_eq!(
            trigger.next_fire_after(utc("2025-03-10T12:30:00Z"), chrono_tz::UTC),
            None
        );
    }

    #[test]
    fn explicit_target_normalizes_handles() {
        let target = Target::explicit(["@Alice", " bob ", "", "@"]);
        assert_eq!(
            target,
            Target::Explicit(vec!["alice".to_string(), "bob".to_string()])
        );
    }

    #[test]
    fn inactive_entries_are_never_due() {
        let entry = ScheduleEntry {
            id: "s1".to_string(),
            content_id: "c1".to_string(),
            trigger: Trigger::Daily(NaiveTime::from_hms_opt(14, 30, 0).unwrap()),
            target: Target::Subscribers,
            created_at: utc("2025-03-01T00:00:00Z"),
            active: false,
        };
        assert!(!entry.is_due(utc("2025-03-10T14:30:00Z"), tick(), chrono_tz::UTC));
    }
}
