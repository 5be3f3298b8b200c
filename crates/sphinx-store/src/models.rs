//! Domain model structs persisted in the local database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sphinx_shared::{ChatId, ContactId, FeedId, FeedUrl, MessageId, RecordId};

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

/// A raw dashboard row. The variant of `id` decides how it is presented.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DashboardRecord {
    pub id: RecordId,
    /// Set only for one-to-one conversation chats.
    pub contact_id: Option<ContactId>,
    /// Newest message in the chat. Drives ordering; `None` sorts last.
    pub latest_message_id: Option<MessageId>,
}

impl DashboardRecord {
    pub fn chat(
        chat_id: ChatId,
        contact_id: Option<ContactId>,
        latest_message_id: Option<MessageId>,
    ) -> Self {
        Self {
            id: RecordId::Chat(chat_id),
            contact_id,
            latest_message_id,
        }
    }

    pub fn contact(contact_id: ContactId) -> Self {
        Self {
            id: RecordId::Contact(contact_id),
            contact_id: None,
            latest_message_id: None,
        }
    }

    pub fn invite(invite_id: sphinx_shared::InviteId) -> Self {
        Self {
            id: RecordId::Invite(invite_id),
            contact_id: None,
            latest_message_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A chat message as last reported by the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    /// `None` for messages sent by this account.
    pub sender: Option<ContactId>,
    pub content: String,
    pub date: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Feeds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feed {
    pub id: FeedId,
    /// Tribe the feed is attached to.
    pub chat_id: Option<ChatId>,
    pub feed_url: FeedUrl,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedItem {
    pub id: FeedId,
    pub feed_id: FeedId,
    pub title: String,
    pub enclosure_url: Option<FeedUrl>,
    pub date_published: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Change notification
// ---------------------------------------------------------------------------

/// Summary of one committed write, handed to change listeners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Dashboard version after the commit.
    pub version: u64,
    /// Dashboard records inserted, updated or deleted. Deduplicated.
    pub touched: Vec<RecordId>,
    /// Feeds whose metadata or items changed.
    pub feeds: Vec<FeedId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.touched.is_empty() && self.feeds.is_empty()
    }

    pub fn touches(&self, id: &RecordId) -> bool {
        self.touched.contains(id)
    }

    pub(crate) fn push_record(&mut self, id: RecordId) {
        if !self.touched.contains(&id) {
            self.touched.push(id);
        }
    }

    pub(crate) fn push_feed(&mut self, id: FeedId) {
        if !self.feeds.contains(&id) {
            self.feeds.push(id);
        }
    }
}
