// Core moderation module - the consensus engine and its satellites.
// Pure domain logic; the messaging platform sits behind ports.

pub mod exception_registry;
pub mod moderation_models;
pub mod moderation_service;
pub mod vote_ledger;

pub use exception_registry::*;
pub use moderation_models::*;
pub use moderation_service::*;
pub use vote_ledger::*;
