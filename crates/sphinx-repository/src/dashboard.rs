//! Projection of raw dashboard rows into what the chat list shows.

use serde::Serialize;
use sphinx_shared::{ChatId, ContactId, InviteId, MessageId, RecordId};
use sphinx_store::DashboardRecord;

/// A row of the chat list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "item", rename_all = "camelCase")]
pub enum DashboardItem {
    Active(ActiveItem),
    Inactive(InactiveItem),
}

/// Items backed by an existing chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActiveItem {
    #[serde(rename_all = "camelCase")]
    Conversation {
        chat_id: ChatId,
        contact_id: ContactId,
        latest_message_id: Option<MessageId>,
    },
    #[serde(rename_all = "camelCase")]
    GroupOrTribe {
        chat_id: ChatId,
        latest_message_id: Option<MessageId>,
    },
}

/// Items without a chat yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InactiveItem {
    #[serde(rename_all = "camelCase")]
    Conversation { contact_id: ContactId },
    #[serde(rename_all = "camelCase")]
    PendingInvite { invite_id: InviteId },
}

/// Map a stored row to its dashboard item.
///
/// The match is exhaustive on [`RecordId`]: a new id variant fails to compile
/// here instead of falling into a default branch.
// TODO: rework this mapping when DashboardItem gains display data (chat
//  names, unread counts); rows only carry ids for now.
pub fn project(record: &DashboardRecord) -> DashboardItem {
    match record.id {
        RecordId::Chat(chat_id) => match record.contact_id {
            Some(contact_id) => DashboardItem::Active(ActiveItem::Conversation {
                chat_id,
                contact_id,
                latest_message_id: record.latest_message_id,
            }),
            None => DashboardItem::Active(ActiveItem::GroupOrTribe {
                chat_id,
                latest_message_id: record.latest_message_id,
            }),
        },
        RecordId::Contact(contact_id) => {
            DashboardItem::Inactive(InactiveItem::Conversation { contact_id })
        }
        RecordId::Invite(invite_id) => {
            DashboardItem::Inactive(InactiveItem::PendingInvite { invite_id })
        }
    }
}

impl DashboardItem {
    /// Key of the row this item was projected from.
    pub fn record_id(&self) -> RecordId {
        match self {
            DashboardItem::Active(ActiveItem::Conversation { chat_id, .. })
            | DashboardItem::Active(ActiveItem::GroupOrTribe { chat_id, .. }) => {
                RecordId::Chat(*chat_id)
            }
            DashboardItem::Inactive(InactiveItem::Conversation { contact_id }) => {
                RecordId::Contact(*contact_id)
            }
            DashboardItem::Inactive(InactiveItem::PendingInvite { invite_id }) => {
                RecordId::Invite(*invite_id)
            }
        }
    }

    pub fn latest_message_id(&self) -> Option<MessageId> {
        match self {
            DashboardItem::Active(ActiveItem::Conversation {
                latest_message_id, ..
            })
            | DashboardItem::Active(ActiveItem::GroupOrTribe {
                latest_message_id, ..
            }) => *latest_message_id,
            DashboardItem::Inactive(_) => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, DashboardItem::Active(_))
    }
}
