use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChatId, ContactId, FeedId, FeedUrl, InviteId, MessageId, RecordId};

/// One incremental change reported by the relay.
///
/// Every variant carries the relay-side id of the row it touches. The store
/// upserts on that id, so replaying a delta never duplicates a row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelayDelta {
    /// A chat was created or updated. `contact_id` is set for one-to-one
    /// conversations and absent for groups and tribes.
    Chat {
        chat_id: ChatId,
        contact_id: Option<ContactId>,
        latest_message_id: Option<MessageId>,
    },

    /// A contact exists. It only shows on the dashboard until a conversation
    /// chat with it appears.
    Contact { contact_id: ContactId },

    /// A pending invite.
    Invite { invite_id: InviteId },

    /// A message in a chat.
    Message(MessageDelta),

    /// A feed attached to a tribe.
    Feed(FeedDelta),

    /// An episode or video of a feed.
    FeedItem(FeedItemDelta),

    /// A dashboard record was removed on the relay.
    Deleted { id: RecordId },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageDelta {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub sender: Option<ContactId>,
    pub content: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedDelta {
    pub feed_id: FeedId,
    pub chat_id: Option<ChatId>,
    pub feed_url: FeedUrl,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedItemDelta {
    pub item_id: FeedId,
    pub feed_id: FeedId,
    pub title: String,
    pub enclosure_url: Option<FeedUrl>,
    pub date_published: Option<DateTime<Utc>>,
}

impl RelayDelta {
    /// The dashboard record this delta changes, if any.
    pub fn record_id(&self) -> Option<RecordId> {
        match self {
            RelayDelta::Chat { chat_id, .. } => Some(RecordId::Chat(*chat_id)),
            RelayDelta::Contact { contact_id } => Some(RecordId::Contact(*contact_id)),
            RelayDelta::Invite { invite_id } => Some(RecordId::Invite(*invite_id)),
            RelayDelta::Message(message) => Some(RecordId::Chat(message.chat_id)),
            RelayDelta::Deleted { id } => Some(*id),
            RelayDelta::Feed(_) | RelayDelta::FeedItem(_) => None,
        }
    }
}

/// Body of a relay pull response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncResponse {
    #[serde(default)]
    pub deltas: Vec<RelayDelta>,
    /// Cursor to send as `since` on the next pull. `None` keeps the current one.
    #[serde(default)]
    pub next_cursor: Option<String>,
    /// The relay holds more deltas past `next_cursor`.
    #[serde(default)]
    pub has_more: bool,
}

impl SyncResponse {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
