// Core broadcast module - scheduled content distribution.
// Following the same pattern as the moderation module.

pub mod audience;
pub mod broadcast_models;
pub mod content_library;
pub mod schedule_poller;
pub mod subscriber_service;

pub use audience::*;
pub use broadcast_models::*;
pub use content_library::*;
pub use schedule_poller::*;
pub use subscriber_service::*;
