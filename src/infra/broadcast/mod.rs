// Broadcast store implementations - JSON documents plus filesystem media.

pub mod fs_media_store;
pub mod json_content_store;
pub mod json_schedule_store;
pub mod json_subscriber_store;

pub use fs_media_store::FsMediaStore;
pub use json_content_store::JsonContentStore;
pub use json_schedule_store::JsonScheduleStore;
pub use json_subscriber_store::JsonSubscriberStore;
