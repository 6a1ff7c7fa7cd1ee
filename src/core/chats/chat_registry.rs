// Registry of group chats the bot has seen and their per-chat settings.
//
// This is deliberate in-memory state with the lifetime of the service
// object: chat titles, moderation mode, hint mode, and the set of topics
// with an enforced message template. It is injected into the components
// that need it rather than living in module-level globals.

use crate::core::moderation::{ChatMode, HintMode};
use dashmap::{DashMap, DashSet};

#[derive(Default)]
pub struct ChatRegistry {
    known_chats: DashMap<i64, String>,
    modes: DashMap<i64, ChatMode>,
    hint_modes: DashMap<i64, HintMode>,
    template_topics: DashSet<(i64, i64)>,
}

impl ChatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a chat the bot saw a message in. Keeps the latest title.
    pub fn observe_chat(&self, chat_id: i64, title: Option<&str>) {
        let title = title
            .map(|t| t.to_string())
            .unwrap_or_else(|| chat_id.to_string());
        self.known_chats.insert(chat_id, title);
    }

    pub fn title(&self, chat_id: i64) -> Option<String> {
        self.known_chats.get(&chat_id).map(|t| t.clone())
    }

    /// Sorted ids of every known group chat.
    pub fn known_groups(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.known_chats.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn mode(&self, chat_id: i64) -> ChatMode {
        self.modes.get(&chat_id).map(|m| *m).unwrap_or_default()
    }

    pub fn set_mode(&self, chat_id: i64, mode: ChatMode) {
        self.modes.insert(chat_id, mode);
    }

    pub fn hint_mode(&self, chat_id: i64) -> HintMode {
        self.hint_modes.get(&chat_id).map(|m| *m).unwrap_or_default()
    }

    pub fn set_hint_mode(&self, chat_id: i64, mode: HintMode) {
        self.hint_modes.insert(chat_id, mode);
    }

    pub fn enable_template(&self, chat_id: i64, thread_id: i64) {
        self.template_topics.insert((chat_id, thread_id));
    }

    pub fn disable_template(&self, chat_id: i64, thread_id: i64) {
        self.template_topics.remove(&(chat_id, thread_id));
    }

    pub fn template_active(&self, chat_id: i64, thread_id: i64) -> bool {
        self.template_topics.contains(&(chat_id, thread_id))
    }
}
