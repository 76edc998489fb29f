// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use serde::Serialize;

/// Classification of a deck bridge failure.
///
/// Only `Open` and `Transport` affect the connection state and the
/// reconnect schedule; `Command` and `NotConnected` are local to a single
/// dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeckErrorKind {
    /// The transport could not be opened.
    Open,
    /// An already-open transport reported a close or error.
    Transport,
    /// A single command was rejected (NAK or send failure).
    Command,
    /// A command was dispatched while the bridge was not connected.
    NotConnected,
}

/// Error type returned by deck requests.
#[derive(Debug, Clone, Serialize)]
pub struct DeckError {
    pub kind: DeckErrorKind,
    pub message: String,
}

pub type DeckResult<T> = Result<T, DeckError>;

impl DeckError {
    pub fn open_failure(message: impl Into<String>) -> Self {
        Self {
            kind: DeckErrorKind::Open,
            message: message.into(),
        }
    }

    pub fn transport_fault(message: impl Into<String>) -> Self {
        Self {
            kind: DeckErrorKind::Transport,
            message: message.into(),
        }
    }

    pub fn command(message: impl Into<String>) -> Self {
        Self {
            kind: DeckErrorKind::Command,
            message: message.into(),
        }
    }

    pub fn not_connected() -> Self {
        Self {
            kind: DeckErrorKind::NotConnected,
            message: "deck not connected".to_string(),
        }
    }

    /// True for the error kinds that move the connection state and feed
    /// the reconnection policy.
    pub fn is_connection_fault(&self) -> bool {
        matches!(self.kind, DeckErrorKind::Open | DeckErrorKind::Transport)
    }
}

impl fmt::Display for DeckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DeckErrorKind::Open => write!(f, "open failed: {}", self.message),
            DeckErrorKind::Transport => write!(f, "transport fault: {}", self.message),
            DeckErrorKind::Command => write!(f, "command failed: {}", self.message),
            DeckErrorKind::NotConnected => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for DeckError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_fault_classification() {
        assert!(DeckError::open_failure("no such device").is_connection_fault());
        assert!(DeckError::transport_fault("port gone").is_connection_fault());
        assert!(!DeckError::command("NAK").is_connection_fault());
        assert!(!DeckError::not_connected().is_connection_fault());
    }

    #[test]
    fn test_display_includes_context() {
        let err = DeckError::open_failure("permission denied");
        assert_eq!(err.to_string(), "open failed: permission denied");
        assert_eq!(DeckError::not_connected().to_string(), "deck not connected");
    }
}
