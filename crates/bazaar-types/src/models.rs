use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Returned when a stored or client-supplied tag does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Defines a lowercase string-tagged enum shared by the wire format and the
/// SQLite columns.
macro_rules! tagged_enum {
    ($(#[$meta:meta])* $name:ident, $label:literal { $($variant:ident => $tag:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $tag),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($tag => Ok(Self::$variant),)+
                    other => Err(UnknownVariant { kind: $label, value: other.to_string() }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

tagged_enum!(
    /// FRIEND rooms are symmetric; TRADE rooms hang off a listing and its owner.
    RoomKind, "room kind" {
        Friend => "friend",
        Trade => "trade",
    }
);

tagged_enum!(
    MessageKind, "message kind" {
        Text => "text",
        File => "file",
        System => "system",
    }
);

tagged_enum!(
    /// Everything except `Pending` is terminal.
    RequestStatus, "request status" {
        Pending => "pending",
        Accepted => "accepted",
        Rejected => "rejected",
        Canceled => "canceled",
    }
);

tagged_enum!(
    /// Which side of a friend-request box to list.
    BoxDirection, "box direction" {
        Incoming => "incoming",
        Outgoing => "outgoing",
    }
);

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl Default for BoxDirection {
    fn default() -> Self {
        Self::Incoming
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_match_serde_names() {
        assert_eq!(serde_json::to_string(&RoomKind::Trade).unwrap(), "\"trade\"");
        assert_eq!(RoomKind::Trade.as_str(), "trade");
        assert_eq!("canceled".parse::<RequestStatus>().unwrap(), RequestStatus::Canceled);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = "archived".parse::<RequestStatus>().unwrap_err();
        assert_eq!(err.kind, "request status");
        assert_eq!(err.value, "archived");
    }

    #[test]
    fn only_pending_is_open() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Accepted.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(RequestStatus::Canceled.is_terminal());
    }
}
