//! Conversation items

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub text: String,
    pub sender_did: String,
    pub sent_at: DateTime<Utc>,
}

/// Placeholder left behind by a deleted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedMessage {
    pub id: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChatItem {
    Message(MessageView),
    Deleted(DeletedMessage),
}

impl ChatItem {
    pub fn id(&self) -> &str {
        match self {
            ChatItem::Message(m) => &m.id,
            ChatItem::Deleted(d) => &d.id,
        }
    }

    pub fn sent_at(&self) -> DateTime<Utc> {
        match self {
            ChatItem::Message(m) => m.sent_at,
            ChatItem::Deleted(d) => d.sent_at,
        }
    }

    pub fn as_message(&self) -> Option<&MessageView> {
        match self {
            ChatItem::Message(m) => Some(m),
            ChatItem::Deleted(_) => None,
        }
    }
}

impl From<MessageView> for ChatItem {
    fn from(message: MessageView) -> Self {
        ChatItem::Message(message)
    }
}

impl From<DeletedMessage> for ChatItem {
    fn from(deleted: DeletedMessage) -> Self {
        ChatItem::Deleted(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_item_wire_format() {
        let json = r#"{
            "type": "message",
            "id": "m1",
            "text": "hi",
            "senderDid": "did:plc:alice",
            "sentAt": "2024-06-14T15:07:00Z"
        }"#;
        let item: ChatItem = serde_json::from_str(json).unwrap();
        let message = item.as_message().unwrap();
        assert_eq!(message.sender_did, "did:plc:alice");
        assert_eq!(item.id(), "m1");

        let deleted: ChatItem =
            serde_json::from_str(r#"{"type":"deleted","id":"m2","sentAt":"2024-06-14T15:08:00Z"}"#)
                .unwrap();
        assert!(deleted.as_message().is_none());
        assert_eq!(deleted.sent_at().to_rfc3339(), "2024-06-14T15:08:00+00:00");
    }
}
