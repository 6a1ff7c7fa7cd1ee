// Moderation consensus engine - core business logic for classify-and-act.
//
// This service handles:
// - Template enforcement in opted-in chat topics
// - Spam classification via an external classifier port
// - Auto-deletion with vote fallback
// - Crowd votes tracked to a definitive spam/ham consensus
// - The manual /delete override for chat admins
//
// NO transport dependencies here - the messaging platform sits behind
// the `ChatTransport` port.

use super::exception_registry::ExceptionRegistry;
use super::moderation_models::{
    AuditRecord, ChatMode, Classification, HintMode, IncomingMessage, MessageTemplate,
    ModerationOutcome, SpamLabel,
};
use super::vote_ledger::{BallotContext, CastResult, VoteLedger, VotePolarity};
use crate::core::chats::ChatRegistry;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ModerationError {
    /// The classifier port failed. The message is neither deleted nor voted
    /// on - never interpreted as "not spam".
    #[error("classifier unavailable: {0}")]
    ClassificationUnavailable(String),

    #[error("audit log error: {0}")]
    Audit(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("missing permission")]
    PermissionDenied,

    #[error("transport failure: {0}")]
    Failed(String),
}

// ============================================================================
// PORTS
// ============================================================================

/// External spam classifier: text in, label and probability out.
#[async_trait]
pub trait ClassifierPort: Send + Sync {
    async fn classify(&self, text: &str) -> anyhow::Result<Classification>;
}

/// The slice of the messaging platform the engine needs.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), TransportError>;

    /// Send a message into a chat (optionally into a topic thread).
    /// Returns the new message id.
    async fn send_chat_message(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        text: &str,
    ) -> Result<i64, TransportError>;

    /// Send a private message. Returns the new message id.
    async fn send_direct_message(&self, user_id: u64, text: &str) -> Result<i64, TransportError>;

    /// Post the binary spam/ham prompt as a reply to the suspect message.
    /// Returns the prompt's message id.
    async fn post_vote_prompt(&self, chat_id: i64, message_id: i64)
        -> Result<i64, TransportError>;

    async fn is_admin_or_owner(&self, chat_id: i64, user_id: u64) -> Result<bool, TransportError>;
}

/// Append-only store of terminal moderation decisions.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, record: AuditRecord) -> Result<(), ModerationError>;

    /// Most recent records first.
    async fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, ModerationError>;
}

// ============================================================================
// CONFIG
// ============================================================================

/// Tunables for the engine.
#[derive(Clone)]
pub struct ModerationConfig {
    /// Distinct voters needed on one polarity for consensus.
    pub vote_threshold: usize,
    /// Users DMed when a message is auto-deleted.
    pub reviewer_ids: Vec<u64>,
    /// How long a chat-posted template hint stays up.
    pub hint_delete_delay: Duration,
    /// Pattern enforced in template topics.
    pub template: MessageTemplate,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            vote_threshold: 2,
            reviewer_ids: Vec::new(),
            hint_delete_delay: Duration::from_secs(300),
            template: MessageTemplate::default(),
        }
    }
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// Result of one vote cast routed through the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum VoteOutcome {
    Counted {
        spam_votes: usize,
        ham_votes: usize,
        threshold: usize,
    },
    ConsensusSpam,
    ConsensusHam,
}

/// Turns a binary spam classification into an action and tracks crowd votes
/// to a definitive outcome.
pub struct ModerationEngine<A: AuditStore> {
    classifier: Arc<dyn ClassifierPort>,
    transport: Arc<dyn ChatTransport>,
    audit: A,
    exceptions: Arc<ExceptionRegistry>,
    chats: Arc<ChatRegistry>,
    ballots: VoteLedger,
    config: ModerationConfig,
}

impl<A: AuditStore> ModerationEngine<A> {
    pub fn new(
        classifier: Arc<dyn ClassifierPort>,
        transport: Arc<dyn ChatTransport>,
        audit: A,
        exceptions: Arc<ExceptionRegistry>,
        chats: Arc<ChatRegistry>,
        config: ModerationConfig,
    ) -> Self {
        let ballots = VoteLedger::new(config.vote_threshold);
        Self {
            classifier,
            transport,
            audit,
            exceptions,
            chats,
            ballots,
            config,
        }
    }

    pub fn vote_threshold(&self) -> usize {
        self.ballots.threshold()
    }

    pub fn open_ballots(&self) -> usize {
        self.ballots.open_ballots()
    }

    /// Run one inbound group message through the moderation pipeline.
    pub async fn handle_message(
        &self,
        msg: &IncomingMessage,
    ) -> Result<ModerationOutcome, ModerationError> {
        self.chats.observe_chat(msg.chat_id, msg.chat_title.as_deref());

        if self
            .exceptions
            .is_exempt(msg.chat_id, msg.author_handle.as_deref())
        {
            tracing::debug!(
                chat_id = msg.chat_id,
                author_id = msg.author_id,
                "author on exception list, skipping checks"
            );
            return Ok(ModerationOutcome::Exempted);
        }

        // Template topics bypass spam classification entirely.
        if let Some(thread_id) = msg.thread_id {
            if self.chats.template_active(msg.chat_id, thread_id)
                && !self.config.template.matches(&msg.text)
            {
                self.reject_template_violation(msg, thread_id).await;
                return Ok(ModerationOutcome::TemplateRejected);
            }
        }

        let Classification {
            is_spam,
            probability,
        } = self
            .classifier
            .classify(&msg.text)
            .await
            .map_err(|e| ModerationError::ClassificationUnavailable(e.to_string()))?;

        tracing::debug!(
            chat_id = msg.chat_id,
            mode = %self.chats.mode(msg.chat_id),
            probability,
            "message classified"
        );

        if !is_spam {
            return Ok(ModerationOutcome::Clean { probability });
        }

        match self.chats.mode(msg.chat_id) {
            ChatMode::Auto => match self.transport.delete_message(msg.chat_id, msg.message_id).await
            {
                Ok(()) => {
                    self.audit
                        .append(AuditRecord {
                            text: msg.text.clone(),
                            label: SpamLabel::Spam,
                            user_id: Some(msg.author_id),
                        })
                        .await?;
                    self.notify_reviewers(msg).await;
                    Ok(ModerationOutcome::AutoDeleted)
                }
                Err(err) => {
                    tracing::warn!(
                        chat_id = msg.chat_id,
                        message_id = msg.message_id,
                        error = %err,
                        "auto-delete failed, falling back to a vote"
                    );
                    self.open_ballot(msg).await;
                    Ok(ModerationOutcome::VoteOpened { fallback: true })
                }
            },
            ChatMode::Vote => {
                self.open_ballot(msg).await;
                Ok(ModerationOutcome::VoteOpened { fallback: false })
            }
        }
    }

    /// Route one spam/ham button press into the ledger and act on consensus.
    pub async fn cast_vote(
        &self,
        chat_id: i64,
        message_id: i64,
        voter_id: u64,
        polarity: VotePolarity,
    ) -> Result<VoteOutcome, ModerationError> {
        match self.ballots.cast((chat_id, message_id), voter_id, polarity) {
            CastResult::Counted {
                spam_votes,
                ham_votes,
            } => Ok(VoteOutcome::Counted {
                spam_votes,
                ham_votes,
                threshold: self.ballots.threshold(),
            }),
            CastResult::Consensus {
                polarity: VotePolarity::Spam,
                context,
            } => {
                if let Err(err) = self.transport.delete_message(chat_id, message_id).await {
                    tracing::warn!(chat_id, message_id, error = %err, "failed to delete voted-out message");
                }
                match context {
                    Some(ctx) => {
                        self.remove_prompt(chat_id, ctx.prompt_message_id).await;
                        self.audit
                            .append(AuditRecord {
                                text: ctx.text,
                                label: SpamLabel::Spam,
                                user_id: ctx.author_id,
                            })
                            .await?;
                    }
                    None => {
                        tracing::warn!(chat_id, message_id, "spam consensus on a ballot with no context")
                    }
                }
                Ok(VoteOutcome::ConsensusSpam)
            }
            CastResult::Consensus {
                polarity: VotePolarity::Ham,
                context,
            } => {
                // The message stays; only the prompt goes away.
                match context {
                    Some(ctx) => {
                        self.remove_prompt(chat_id, ctx.prompt_message_id).await;
                        self.audit
                            .append(AuditRecord {
                                text: ctx.text,
                                label: SpamLabel::Ham,
                                user_id: ctx.author_id,
                            })
                            .await?;
                    }
                    None => {
                        tracing::warn!(chat_id, message_id, "ham consensus on a ballot with no context")
                    }
                }
                Ok(VoteOutcome::ConsensusHam)
            }
        }
    }

    /// `/delete` replied to a message: unconditional removal by an admin,
    /// bypassing classification and voting. Returns whether it happened.
    pub async fn handle_delete_command(
        &self,
        issuer_id: u64,
        command_message_id: i64,
        target: &IncomingMessage,
    ) -> Result<bool, ModerationError> {
        let allowed = self
            .transport
            .is_admin_or_owner(target.chat_id, issuer_id)
            .await
            .unwrap_or(false);
        if !allowed {
            return Ok(false);
        }

        if let Err(err) = self
            .transport
            .delete_message(target.chat_id, target.message_id)
            .await
        {
            tracing::warn!(
                chat_id = target.chat_id,
                message_id = target.message_id,
                error = %err,
                "manual delete failed"
            );
            return Ok(false);
        }

        self.audit
            .append(AuditRecord {
                text: target.text.clone(),
                label: SpamLabel::Spam,
                user_id: Some(target.author_id),
            })
            .await?;

        // Tidy up the command message itself; failure is cosmetic.
        if let Err(err) = self
            .transport
            .delete_message(target.chat_id, command_message_id)
            .await
        {
            tracing::debug!(error = %err, "could not remove the /delete command message");
        }

        Ok(true)
    }

    async fn open_ballot(&self, msg: &IncomingMessage) {
        match self
            .transport
            .post_vote_prompt(msg.chat_id, msg.message_id)
            .await
        {
            Ok(prompt_id) => self.ballots.open(
                (msg.chat_id, msg.message_id),
                BallotContext {
                    text: msg.text.clone(),
                    author_id: Some(msg.author_id),
                    prompt_message_id: prompt_id,
                },
            ),
            Err(err) => tracing::warn!(
                chat_id = msg.chat_id,
                message_id = msg.message_id,
                error = %err,
                "failed to post vote prompt"
            ),
        }
    }

    async fn remove_prompt(&self, chat_id: i64, prompt_message_id: i64) {
        if let Err(err) = self.transport.delete_message(chat_id, prompt_message_id).await {
            tracing::warn!(chat_id, prompt_message_id, error = %err, "failed to delete vote prompt");
        }
    }

    /// Deliver the correction hint, delete the offending message, and line up
    /// hint removal when the hint landed in the chat.
    async fn reject_template_violation(&self, msg: &IncomingMessage, thread_id: i64) {
        let hint = format!(
            "{}, your message does not match this topic's template.\nPlease re-post it following the example:\n{}",
            msg.author_display,
            self.config.template.example()
        );

        let mut chat_hint_id = None;
        match self.chats.hint_mode(msg.chat_id) {
            HintMode::Private => {
                if let Err(err) = self.transport.send_direct_message(msg.author_id, &hint).await {
                    tracing::debug!(author_id = msg.author_id, error = %err, "template hint DM failed");
                }
            }
            HintMode::Chat => {
                chat_hint_id = self.send_chat_hint(msg, thread_id, &hint).await;
            }
            HintMode::DmWithFallback => {
                if self
                    .transport
                    .send_direct_message(msg.author_id, &hint)
                    .await
                    .is_err()
                {
                    chat_hint_id = self.send_chat_hint(msg, thread_id, &hint).await;
                }
            }
        }

        if let Err(err) = self.transport.delete_message(msg.chat_id, msg.message_id).await {
            tracing::warn!(
                chat_id = msg.chat_id,
                message_id = msg.message_id,
                error = %err,
                "failed to delete off-template message"
            );
        }

        // A hint posted into the chat is removed again after a delay.
        if let Some(hint_id) = chat_hint_id {
            let transport = Arc::clone(&self.transport);
            let chat_id = msg.chat_id;
            let delay = self.config.hint_delete_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(err) = transport.delete_message(chat_id, hint_id).await {
                    tracing::debug!(chat_id, hint_id, error = %err, "failed to expire template hint");
                }
            });
        }
    }

    async fn send_chat_hint(
        &self,
        msg: &IncomingMessage,
        thread_id: i64,
        hint: &str,
    ) -> Option<i64> {
        match self
            .transport
            .send_chat_message(msg.chat_id, Some(thread_id), hint)
            .await
        {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::warn!(chat_id = msg.chat_id, error = %err, "failed to post template hint");
                None
            }
        }
    }

    async fn notify_reviewers(&self, msg: &IncomingMessage) {
        if self.config.reviewer_ids.is_empty() {
            return;
        }
        let author = msg
            .author_handle
            .as_ref()
            .map(|h| format!("@{}", h.trim_start_matches('@')))
            .unwrap_or_else(|| msg.author_display.clone());
        let note = format!(
            "Automatically removed a message from {}:\n\"{}\"",
            author, msg.text
        );
        for reviewer in &self.config.reviewer_ids {
            if let Err(err) = self.transport.send_direct_message(*reviewer, &note).await {
                tracing::debug!(reviewer, error = %err, "reviewer notification failed");
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
