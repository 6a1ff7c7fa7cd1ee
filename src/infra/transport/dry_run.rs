// Dry-run messenger - stands in for the real messaging platform.
//
// Every transport and delivery action is logged instead of sent, with
// synthetic message ids, so the whole engine can run locally without
// platform credentials.

use crate::core::broadcast::{ContentItem, DeliveryError, DeliveryPort};
use crate::core::moderation::{ChatTransport, TransportError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};

pub struct DryRunMessenger {
    admins: Vec<u64>,
    next_message_id: AtomicI64,
}

impl DryRunMessenger {
    pub fn new(admins: Vec<u64>) -> Self {
        Self {
            admins,
            next_message_id: AtomicI64::new(1),
        }
    }

    fn next_id(&self) -> i64 {
        self.next_message_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatTransport for DryRunMessenger {
    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), TransportError> {
        tracing::info!(chat_id, message_id, "dry-run: delete message");
        Ok(())
    }

    async fn send_chat_message(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        text: &str,
    ) -> Result<i64, TransportError> {
        let id = self.next_id();
        tracing::info!(chat_id, ?thread_id, message_id = id, text, "dry-run: chat message");
        Ok(id)
    }

    async fn send_direct_message(&self, user_id: u64, text: &str) -> Result<i64, TransportError> {
        let id = self.next_id();
        tracing::info!(user_id, message_id = id, text, "dry-run: direct message");
        Ok(id)
    }

    async fn post_vote_prompt(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<i64, TransportError> {
        let id = self.next_id();
        tracing::info!(chat_id, message_id, prompt_id = id, "dry-run: vote prompt");
        Ok(id)
    }

    async fn is_admin_or_owner(&self, _chat_id: i64, user_id: u64) -> Result<bool, TransportError> {
        Ok(self.admins.contains(&user_id))
    }
}

#[async_trait]
impl DeliveryPort for DryRunMessenger {
    async fn send_to_user(&self, user_id: u64, content: &ContentItem) -> Result<(), DeliveryError> {
        tracing::info!(
            user_id,
            content_id = %content.id,
            kind = %content.kind,
            "dry-run: deliver to user"
        );
        Ok(())
    }

    async fn send_to_group(
        &self,
        chat_id: i64,
        content: &ContentItem,
    ) -> Result<(), DeliveryError> {
        tracing::info!(
            chat_id,
            content_id = %content.id,
            kind = %content.kind,
            "dry-run: deliver to group"
        );
        Ok(())
    }
}
