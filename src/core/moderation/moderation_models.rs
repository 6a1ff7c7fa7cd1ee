// Moderation domain models - data structures for the consensus engine.
//
// These are pure domain types with no transport dependencies.
// The transport layer converts these to platform-specific actions.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How a chat deals with classified spam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatMode {
    /// Delete spam immediately and notify reviewers.
    #[default]
    Auto,
    /// Open a crowd vote and act on consensus.
    Vote,
}

impl std::fmt::Display for ChatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatMode::Auto => write!(f, "auto"),
            ChatMode::Vote => write!(f, "vote"),
        }
    }
}

/// Where a template-correction hint is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HintMode {
    /// DM only; a failed DM is dropped silently.
    Private,
    /// Reply in the chat thread.
    Chat,
    /// Try a DM first, fall back to a chat reply if the DM fails.
    #[default]
    DmWithFallback,
}

/// Terminal label of a moderation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpamLabel {
    Spam,
    Ham,
}

impl SpamLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpamLabel::Spam => "spam",
            SpamLabel::Ham => "ham",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spam" => Some(SpamLabel::Spam),
            "ham" => Some(SpamLabel::Ham),
            _ => None,
        }
    }
}

impl std::fmt::Display for SpamLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result returned by the classifier port.
#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub is_spam: bool,
    pub probability: f64,
}

/// One row of the append-only audit log - a terminal moderation decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub text: String,
    pub label: SpamLabel,
    pub user_id: Option<u64>,
}

/// An inbound group message as seen by the engine.
///
/// `text` carries the message text or the media caption; messages without
/// either never reach the engine.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub thread_id: Option<i64>,
    pub chat_title: Option<String>,
    pub author_id: u64,
    pub author_handle: Option<String>,
    pub author_display: String,
    pub text: String,
}

/// Terminal state of one inbound message after the engine has seen it.
#[derive(Debug, Clone, PartialEq)]
pub enum ModerationOutcome {
    /// Author is on the chat's exception list - nothing was checked.
    Exempted,
    /// The thread enforces a message template and the text failed it.
    TemplateRejected,
    /// Classified as not spam.
    Clean { probability: f64 },
    /// Auto mode: message deleted, audit row written, reviewers notified.
    AutoDeleted,
    /// A ballot was opened for the chat to decide.
    /// `fallback` is set when auto-deletion failed and the engine degraded
    /// to a vote instead.
    VoteOpened { fallback: bool },
}

/// Default pattern: a leading hashtag line followed by a coordinator
/// contact line somewhere below it.
pub const DEFAULT_TEMPLATE_PATTERN: &str =
    r"(?s)^#\S+.*?(?:\n|\s)+.*?(?i:coordinator:?)[ ]*[^\n]+$";
pub const DEFAULT_TEMPLATE_EXAMPLE: &str = "#YourService Announcement text\nCoordinator: Name";

/// Compiled message template enforced in opted-in chat topics.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    pattern: Regex,
    example: String,
}

impl MessageTemplate {
    pub fn new(pattern: &str, example: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            example: example.into(),
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text.trim())
    }

    /// Example shown to users whose message was rejected.
    pub fn example(&self) -> &str {
        &self.example
    }
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE_PATTERN, DEFAULT_TEMPLATE_EXAMPLE)
            .expect("default template pattern must compile")
    }
}

/// Strip a leading `@`, trim, and lowercase so handles compare reliably.
pub fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_accepts_well_formed_post() {
        let template = MessageTemplate::default();
        assert!(template.matches("#Plumbing Fixing taps and pipes\nCoordinator: Alice"));
        assert!(template.matches("#Tutoring math lessons\ncoordinator: Bob"));
    }

    #[test]
    fn default_template_rejects_free_text() {
        let template = MessageTemplate::default();
        assert!(!template.matches("hello everyone, anyone selling a bike?"));
        assert!(!template.matches("#TagOnly but no contact line"));
    }

    #[test]
    fn handle_normalization() {
        assert_eq!(normalize_handle("@Alice "), "alice");
        assert_eq!(normalize_handle("bob"), "bob");
    }
}
