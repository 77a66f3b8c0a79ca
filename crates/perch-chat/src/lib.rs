//! Perch Chat Utilities
//!
//! Stateless helpers for laying out a conversation:
//! - Consecutive messages from one sender form a group
//! - A gap of more than ten minutes starts a new group
//! - Only the last message of a group shows its metadata line
//! - Timestamps render relative to now ("Now", "3:07 PM", "Yesterday, ...")

mod grouping;
mod message;
mod timestamp;

pub use grouping::{group_ends, is_from_self, is_last_in_group, should_show_metadata, GROUP_GAP_MS};
pub use message::{ChatItem, DeletedMessage, MessageView};
pub use timestamp::{relative_timestamp, RelativeTimestamp};
