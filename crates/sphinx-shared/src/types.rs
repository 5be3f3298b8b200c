use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// Numeric identifiers issued by the relay. Chats, contacts and invites live in
// disjoint namespaces: ChatId(1) and ContactId(1) are unrelated records.

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ChatId(pub i64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ContactId(pub i64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct InviteId(pub i64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chat:{}", self.0)
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "contact:{}", self.0)
    }
}

impl fmt::Display for InviteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invite:{}", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "message:{}", self.0)
    }
}

/// Key of a dashboard row. The variant decides how the row is presented.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum RecordId {
    Chat(ChatId),
    Contact(ContactId),
    Invite(InviteId),
}

/// Discriminant stored in the `kind` column. The numeric order doubles as the
/// tie-break order of the dashboard query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum RecordKind {
    Chat = 0,
    Contact = 1,
    Invite = 2,
}

impl RecordKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Chat),
            1 => Some(Self::Contact),
            2 => Some(Self::Invite),
            _ => None,
        }
    }
}

impl RecordId {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordId::Chat(_) => RecordKind::Chat,
            RecordId::Contact(_) => RecordKind::Contact,
            RecordId::Invite(_) => RecordKind::Invite,
        }
    }

    pub fn raw(&self) -> i64 {
        match self {
            RecordId::Chat(id) => id.0,
            RecordId::Contact(id) => id.0,
            RecordId::Invite(id) => id.0,
        }
    }

    /// Rebuild an id from its stored `(kind, id)` pair.
    pub fn from_parts(kind: u8, raw: i64) -> Option<Self> {
        RecordKind::from_byte(kind).map(|kind| match kind {
            RecordKind::Chat => RecordId::Chat(ChatId(raw)),
            RecordKind::Contact => RecordId::Contact(ContactId(raw)),
            RecordKind::Invite => RecordId::Invite(InviteId(raw)),
        })
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Chat(id) => id.fmt(f),
            RecordId::Contact(id) => id.fmt(f),
            RecordId::Invite(id) => id.fmt(f),
        }
    }
}

impl From<ChatId> for RecordId {
    fn from(id: ChatId) -> Self {
        RecordId::Chat(id)
    }
}

impl From<ContactId> for RecordId {
    fn from(id: ContactId) -> Self {
        RecordId::Contact(id)
    }
}

impl From<InviteId> for RecordId {
    fn from(id: InviteId) -> Self {
        RecordId::Invite(id)
    }
}

/// Declares a string identifier that rejects the empty string at construction
/// and is immutable afterwards.
macro_rules! non_empty_string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
                let value = value.into();
                if value.is_empty() {
                    return Err(ValidationError::Empty {
                        kind: stringify!($name),
                    });
                }
                Ok(Self(value))
            }

            pub fn value(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

non_empty_string_id!(
    /// Identifier of a podcast/video feed or one of its items.
    FeedId
);

non_empty_string_id!(
    /// Location of a feed or an enclosure. Only emptiness is checked; feeds
    /// in the wild carry all sorts of schemes.
    FeedUrl
);

non_empty_string_id!(
    /// Generic opaque key for collaborator subsystems.
    ResourceId
);
