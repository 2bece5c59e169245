//! Events surfaced by the messaging backend.
//!
//! The backend decodes protocol frames into these shapes; the lifecycle
//! driver consumes connection updates and forwards the rest to the
//! command dispatcher and the snapshot cache.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reason a connection was closed, decoded from the close status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Device link explicitly revoked (status 401).
    LoggedOut,
    /// Server rejected the session (status 403).
    Forbidden,
    /// Network drop or timeout (status 408).
    ConnectionLost,
    /// Multi-device state mismatch (status 411).
    MultideviceMismatch,
    /// Server closed the stream (status 428).
    ConnectionClosed,
    /// Another device took over the session (status 440).
    ConnectionReplaced,
    /// Session state is unusable (status 500).
    BadSession,
    /// Backend temporarily unavailable (status 503).
    UnavailableService,
    /// Server asked for a stream restart (status 515).
    RestartRequired,
    /// Anything else, including a missing status code.
    Unknown(Option<u16>),
}

impl DisconnectReason {
    /// Decode a close status code.
    pub fn from_status(status: Option<u16>) -> Self {
        match status {
            Some(401) => Self::LoggedOut,
            Some(403) => Self::Forbidden,
            Some(408) => Self::ConnectionLost,
            Some(411) => Self::MultideviceMismatch,
            Some(428) => Self::ConnectionClosed,
            Some(440) => Self::ConnectionReplaced,
            Some(500) => Self::BadSession,
            Some(503) => Self::UnavailableService,
            Some(515) => Self::RestartRequired,
            other => Self::Unknown(other),
        }
    }

    /// Whether the stored credentials must be purged so the next start
    /// forces a fresh first-run auth flow.
    pub fn requires_relink(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoggedOut => write!(f, "logged out"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::ConnectionLost => write!(f, "connection lost"),
            Self::MultideviceMismatch => write!(f, "multi-device mismatch"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::ConnectionReplaced => write!(f, "connection replaced"),
            Self::BadSession => write!(f, "bad session"),
            Self::UnavailableService => write!(f, "service unavailable"),
            Self::RestartRequired => write!(f, "restart required"),
            Self::Unknown(Some(code)) => write!(f, "unknown (code {code})"),
            Self::Unknown(None) => write!(f, "unknown"),
        }
    }
}

/// Connection-state transition reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionUpdate {
    /// A fresh QR payload to display during first-run auth.
    Qr(String),
    /// The connection is open and usable.
    Open,
    /// The connection closed; the status code explains why.
    Close { status: Option<u16> },
}

/// A decoded inbound chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// Unique message ID.
    pub id: String,
    /// Chat JID (sender JID for 1:1, group JID for groups).
    pub chat: String,
    /// Sender JID.
    pub sender: String,
    /// Push name of the sender, if advertised.
    pub push_name: Option<String>,
    /// Text content, if the message carries any.
    pub text: Option<String>,
    /// Unix timestamp of the message.
    pub timestamp: i64,
}

/// A group membership or subject change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupUpdateEvent {
    /// Group JID.
    pub group: String,
    /// Participants affected by the change.
    pub participants: Vec<String>,
    /// What happened: "add", "remove", "promote", "demote", "subject".
    pub action: String,
}

/// A status (story) posted by a contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdateEvent {
    /// JID of the contact that posted the status.
    pub sender: String,
    /// ID of the status message.
    pub status_id: String,
}

/// Inbound events routed to the command dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum BotEvent {
    Message(MessageEvent),
    GroupUpdate(GroupUpdateEvent),
    StatusUpdate(StatusUpdateEvent),
}

/// Everything a connection handle can emit.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connection(ConnectionUpdate),
    Bot(BotEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_decoding() {
        assert_eq!(
            DisconnectReason::from_status(Some(401)),
            DisconnectReason::LoggedOut
        );
        assert_eq!(
            DisconnectReason::from_status(Some(428)),
            DisconnectReason::ConnectionClosed
        );
        assert_eq!(
            DisconnectReason::from_status(Some(999)),
            DisconnectReason::Unknown(Some(999))
        );
        assert_eq!(
            DisconnectReason::from_status(None),
            DisconnectReason::Unknown(None)
        );
    }

    #[test]
    fn only_logout_forces_relink() {
        assert!(DisconnectReason::from_status(Some(401)).requires_relink());
        assert!(!DisconnectReason::from_status(Some(440)).requires_relink());
        assert!(!DisconnectReason::from_status(None).requires_relink());
    }
}
