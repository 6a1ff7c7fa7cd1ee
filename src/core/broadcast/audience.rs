// Audience resolution - maps a schedule target onto concrete recipients.

use super::broadcast_models::{Subscriber, Target};
use crate::core::moderation::normalize_handle;

/// Recipients for one delivery, split by kind so failure handling stays
/// separate for users and group chats.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedAudience {
    pub users: Vec<u64>,
    pub groups: Vec<i64>,
    /// Explicit handles that matched no active subscriber. A handle that
    /// never subscribed has no known user id, so it cannot receive
    /// anything - callers surface these instead of dropping them silently.
    pub unresolved: Vec<String>,
}

impl ResolvedAudience {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty()
    }
}

/// Resolve a target against the live subscriber registry and the known
/// group chats. Only active subscribers resolve.
pub fn resolve_audience(
    target: &Target,
    subscribers: &[Subscriber],
    known_groups: &[i64],
) -> ResolvedAudience {
    let active = || subscribers.iter().filter(|s| s.active);

    match target {
        Target::All => ResolvedAudience {
            users: active().map(|s| s.user_id).collect(),
            groups: known_groups.to_vec(),
            unresolved: Vec::new(),
        },
        Target::Subscribers => ResolvedAudience {
            users: active().map(|s| s.user_id).collect(),
            groups: Vec::new(),
            unresolved: Vec::new(),
        },
        Target::Groups => ResolvedAudience {
            users: Vec::new(),
            groups: known_groups.to_vec(),
            unresolved: Vec::new(),
        },
        Target::Explicit(handles) => {
            let mut users = Vec::new();
            let mut unresolved = Vec::new();
            for handle in handles {
                let wanted = normalize_handle(handle);
                let matched = active().find(|s| {
                    s.handle
                        .as_deref()
                        .map(|h| normalize_handle(h) == wanted)
                        .unwrap_or(false)
                });
                match matched {
                    Some(subscriber) => users.push(subscriber.user_id),
                    None => unresolved.push(handle.clone()),
                }
            }
            ResolvedAudience {
                users,
                groups: Vec::new(),
                unresolved,
            }
        }
    }
}
