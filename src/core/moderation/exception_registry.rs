// Per-chat allow-list of handles exempt from spam checks.

use super::moderation_models::normalize_handle;
use dashmap::DashMap;
use std::collections::HashSet;

/// Handles on a chat's list skip spam classification entirely.
/// Handles are stored normalized (no `@`, lowercase).
#[derive(Default)]
pub struct ExceptionRegistry {
    exceptions: DashMap<i64, HashSet<String>>,
}

impl ExceptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add handles to a chat's list. Returns how many were actually new.
    pub fn add(&self, chat_id: i64, handles: &[String]) -> usize {
        let mut set = self.exceptions.entry(chat_id).or_default();
        handles
            .iter()
            .map(|h| normalize_handle(h))
            .filter(|h| !h.is_empty())
            .filter(|h| set.insert(h.clone()))
            .count()
    }

    /// Remove handles from a chat's list. Returns how many were present.
    pub fn remove(&self, chat_id: i64, handles: &[String]) -> usize {
        let removed = match self.exceptions.get_mut(&chat_id) {
            Some(mut set) => handles
                .iter()
                .map(|h| normalize_handle(h))
                .filter(|h| set.remove(h))
                .count(),
            None => 0,
        };
        // Drop the empty per-chat set entirely.
        self.exceptions
            .remove_if(&chat_id, |_, set| set.is_empty());
        removed
    }

    /// A user with no handle can never be exempted.
    pub fn is_exempt(&self, chat_id: i64, handle: Option<&str>) -> bool {
        let Some(handle) = handle else {
            return false;
        };
        self.exceptions
            .get(&chat_id)
            .map(|set| set.contains(&normalize_handle(handle)))
            .unwrap_or(false)
    }

    /// Sorted snapshot of a chat's list, for operator display.
    pub fn list(&self, chat_id: i64) -> Vec<String> {
        let mut handles: Vec<String> = self
            .exceptions
            .get(&chat_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        handles.sort();
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_normalizes_and_deduplicates() {
        let registry = ExceptionRegistry::new();
        let added = registry.add(
            -100,
            &["@Alice".to_string(), "alice".to_string(), " @bob ".to_string()],
        );
        assert_eq!(added, 2);
        assert_eq!(registry.list(-100), vec!["alice", "bob"]);
    }

    #[test]
    fn exemption_is_per_chat_and_case_insensitive() {
        let registry = ExceptionRegistry::new();
        registry.add(-100, &["@Alice".to_string()]);

        assert!(registry.is_exempt(-100, Some("ALICE")));
        assert!(registry.is_exempt(-100, Some("@alice")));
        assert!(!registry.is_exempt(-200, Some("alice")));
        assert!(!registry.is_exempt(-100, None));
    }

    #[test]
    fn remove_reports_hits_only() {
        let registry = ExceptionRegistry::new();
        registry.add(-100, &["alice".to_string(), "bob".to_string()]);

        let removed = registry.remove(-100, &["@Alice".to_string(), "carol".to_string()]);
        assert_eq!(removed, 1);
        assert_eq!(registry.list(-100), vec!["bob"]);
    }
}
