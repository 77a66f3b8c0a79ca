//! Message grouping

use crate::message::{ChatItem, MessageView};

/// Messages further apart than this many milliseconds never share a group.
pub const GROUP_GAP_MS: i64 = 600_000;

pub fn is_from_self(message: &MessageView, self_did: &str) -> bool {
    message.sender_did == self_did
}

/// Whether `item` closes its group, given the item rendered after it.
pub fn is_last_in_group(item: &MessageView, next: Option<&ChatItem>, self_did: &str) -> bool {
    let Some(next) = next.and_then(ChatItem::as_message) else {
        return true;
    };

    if is_from_self(item, self_did) != is_from_self(next, self_did) {
        return true;
    }

    (next.sent_at - item.sent_at).num_milliseconds() > GROUP_GAP_MS
}

/// Metadata (the timestamp line) is rendered only under the last message of
/// a group.
pub fn should_show_metadata(item: &MessageView, next: Option<&ChatItem>, self_did: &str) -> bool {
    is_last_in_group(item, next, self_did)
}

/// `is_last_in_group` for every item of a conversation in display order.
/// Deleted items never close a group.
pub fn group_ends(items: &[ChatItem], self_did: &str) -> Vec<bool> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            ChatItem::Message(message) => is_last_in_group(message, items.get(i + 1), self_did),
            ChatItem::Deleted(_) => false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::DeletedMessage;
    use chrono::{DateTime, TimeZone, Utc};

    const ME: &str = "did:plc:me";
    const THEM: &str = "did:plc:them";

    fn at(minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 14, 15, minute, second).unwrap()
    }

    fn message(id: &str, sender: &str, sent_at: DateTime<Utc>) -> MessageView {
        MessageView {
            id: id.to_string(),
            text: format!("text {}", id),
            sender_did: sender.to_string(),
            sent_at,
        }
    }

    #[test]
    fn test_last_message_ends_group() {
        let item = message("1", ME, at(0, 0));
        assert!(is_last_in_group(&item, None, ME));
        assert!(should_show_metadata(&item, None, ME));
    }

    #[test]
    fn test_deleted_next_ends_group() {
        let item = message("1", THEM, at(0, 0));
        let next = ChatItem::from(DeletedMessage {
            id: "2".to_string(),
            sent_at: at(0, 30),
        });
        assert!(is_last_in_group(&item, Some(&next), ME));
    }

    #[test]
    fn test_sender_change_ends_group() {
        let mine = message("1", ME, at(0, 0));
        let theirs = ChatItem::from(message("2", THEM, at(0, 5)));
        assert!(is_last_in_group(&mine, Some(&theirs), ME));

        let theirs = message("1", THEM, at(0, 0));
        let mine = ChatItem::from(message("2", ME, at(0, 5)));
        assert!(is_last_in_group(&theirs, Some(&mine), ME));
    }

    #[test]
    fn test_same_sender_within_gap_continues() {
        let first = message("1", ME, at(0, 0));
        let second = ChatItem::from(message("2", ME, at(10, 0)));
        // Exactly ten minutes is still the same group
        assert!(!is_last_in_group(&first, Some(&second), ME));

        let third = ChatItem::from(message("3", ME, at(10, 1)));
        assert!(is_last_in_group(&first, Some(&third), ME));
    }

    #[test]
    fn test_other_participants_group_together() {
        // Two non-self senders count as the same side of the conversation
        let first = message("1", THEM, at(0, 0));
        let second = ChatItem::from(message("2", "did:plc:someone", at(1, 0)));
        assert!(!is_last_in_group(&first, Some(&second), ME));
    }

    #[test]
    fn test_group_ends_over_conversation() {
        let items = vec![
            ChatItem::from(message("1", ME, at(0, 0))),
            ChatItem::from(message("2", ME, at(1, 0))),
            ChatItem::from(message("3", THEM, at(2, 0))),
            ChatItem::from(DeletedMessage {
                id: "4".to_string(),
                sent_at: at(3, 0),
            }),
            ChatItem::from(message("5", THEM, at(4, 0))),
            ChatItem::from(message("6", THEM, at(20, 0))),
        ];

        assert_eq!(
            group_ends(&items, ME),
            vec![false, true, true, false, true, true]
        );
    }
}
