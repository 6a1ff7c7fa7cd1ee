// JSON-backed schedule store.
//
// The document keeps the flat legacy field layout (send_time /
// send_datetime / repeat flags / weekday number); the tagged trigger and
// target types only exist in memory. Malformed rows are skipped with a
// warning at load instead of poisoning the whole document.

use crate::core::broadcast::{BroadcastError, ScheduleEntry, ScheduleStore, Target, Trigger};
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc, Weekday};
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
struct ScheduleDoc {
    content_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    send_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    send_datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    repeat_daily: bool,
    #[serde(default)]
    repeat_weekly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    send_weekday: Option<u8>,
    target: String,
    #[serde(default)]
    usernames: Vec<String>,
    created_at: DateTime<Utc>,
    #[serde(default = "default_true")]
    active: bool,
}

impl ScheduleDoc {
    fn from_entry(entry: &ScheduleEntry) -> Self {
        let (send_time, send_datetime, repeat_daily, repeat_weekly, send_weekday) =
            match &entry.trigger {
                Trigger::Once(at) => (None, Some(*at), false, false, None),
                Trigger::Daily(time) => {
                    (Some(time.format("%H:%M").to_string()), None, true, false, None)
                }
                Trigger::Weekly { time, weekday } => (
                    Some(time.format("%H:%M").to_string()),
                    None,
                    false,
                    true,
                    Some(weekday.num_days_from_monday() as u8),
                ),
            };
        let (target, usernames) = match &entry.target {
            Target::All => ("all", Vec::new()),
            Target::Subscribers => ("users", Vec::new()),
            Target::Groups => ("groups", Vec::new()),
            Target::Explicit(handles) => ("specific", handles.clone()),
        };
        Self {
            content_id: entry.content_id.clone(),
            send_time,
            send_datetime,
            repeat_daily,
            repeat_weekly,
            send_weekday,
            target: target.to_string(),
            usernames,
            created_at: entry.created_at,
            active: entry.active,
        }
    }

    fn into_entry(self, id: String) -> Result<ScheduleEntry, BroadcastError> {
        let trigger = if let Some(at) = self.send_datetime {
            Trigger::Once(at)
        } else {
            let time_str = self.send_time.as_deref().ok_or_else(|| {
                BroadcastError::Validation(format!("schedule {} has no trigger time", id))
            })?;
            let time = NaiveTime::parse_from_str(time_str, "%H:%M").map_err(|_| {
                BroadcastError::Validation(format!("schedule {} has bad time '{}'", id, time_str))
            })?;
            if self.repeat_weekly {
                let weekday_num = self.send_weekday.ok_or_else(|| {
                    BroadcastError::Validation(format!("schedule {} is weekly with no weekday", id))
                })?;
                let weekday = Weekday::try_from(weekday_num).map_err(|_| {
                    BroadcastError::Validation(format!(
                        "schedule {} has bad weekday {}",
                        id, weekday_num
                    ))
                })?;
                Trigger::Weekly { time, weekday }
            } else if self.repeat_daily {
                Trigger::Daily(time)
            } else {
                return Err(BroadcastError::Validation(format!(
                    "schedule {} has a time but no repeat flag",
                    id
                )));
            }
        };

        let target = match self.target.as_str() {
            "all" => Target::All,
            "users" => Target::Subscribers,
            "groups" => Target::Groups,
            "specific" => Target::explicit(self.usernames.iter().map(String::as_str)),
            other => {
                return Err(BroadcastError::Validation(format!(
                    "schedule {} has unknown target '{}'",
                    id, other
                )))
            }
        };

        Ok(ScheduleEntry {
            id,
            content_id: self.content_id,
            trigger,
            target,
            created_at: self.created_at,
            active: self.active,
        })
    }
}

pub struct JsonScheduleStore {
    path: PathBuf,
    cache: RwLock<HashMap<String, ScheduleEntry>>,
}

impl JsonScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cache = if path.exists() {
            let file = File::open(&path).expect("Failed to open schedule JSON file");
            let reader = BufReader::new(file);
            let docs: HashMap<String, ScheduleDoc> =
                serde_json::from_reader(reader).unwrap_or_default();
            docs.into_iter()
                .filter_map(|(id, doc)| match doc.into_entry(id.clone()) {
                    Ok(entry) => Some((id, entry)),
                    Err(err) => {
                        tracing::warn!(schedule_id = %id, error = %err, "skipping malformed schedule row");
                        None
                    }
                })
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
        let docs: HashMap<&String, ScheduleDoc> = cache
            .iter()
            .map(|(id, entry)| (id, ScheduleDoc::from_entry(entry)))
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
impl ScheduleStore for JsonScheduleStore {
    async fn upsert(&self, entry: ScheduleEntry) -> Result<(), BroadcastError> {
        let mut cache = self.cache.write().await;
        cache.insert(entry.id.clone(), entry);
        drop(cache);
        self.persist().await
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduleEntry>, BroadcastError> {
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

    async fn remove_for_content(&self, content_id: &str) -> Result<usize, BroadcastError> {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, entry| entry.content_id != content_id);
        let removed = before - cache.len();
        drop(cache);
        if removed > 0 {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn active(&self) -> Result<Vec<ScheduleEntry>, BroadcastError> {
        let cache = self.cache.read().await;
        Ok(cache.values().filter(|e| e.active).cloned().collect())
    }
}
