// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "broadcast/mod.rs"]
pub mod broadcast;

#[path = "chats/chat_registry.rs"]
pub mod chats;

#[path = "moderation/mod.rs"]
pub mod moderation;
