// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Cached deck state and its serializable snapshot.
//!
//! Every mutation of the cache goes through one of the `apply_*` handlers
//! below; nothing else writes these fields.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::timecode::Timecode;

/// The bridge's view of the serial link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Ok,
    Error,
}

impl ConnectionState {
    /// True only in the state where commands may be dispatched and the
    /// poll loops may fire.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Ok => write!(f, "ok"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Latest decoded status flags.
///
/// Replaced wholesale on each status event; tokens are uppercased and
/// deduplicated, order is irrelevant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    flags: BTreeSet<String>,
}

impl StatusSnapshot {
    /// Replace the cached flag set verbatim.
    pub fn replace<I, S>(&mut self, flags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.flags = flags
            .into_iter()
            .map(|f| f.as_ref().to_ascii_uppercase())
            .collect();
    }

    /// Whether the named flag is currently asserted (case-insensitive).
    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.contains(&name.to_ascii_uppercase())
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.flags.iter().cloned().collect()
    }

    /// Comma-separated rendering for logs and display variables.
    pub fn joined(&self) -> String {
        self.flags.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Cached deck state held by the deck task and published over the watch
/// channel.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeckState {
    pub connection: ConnectionState,
    pub status: StatusSnapshot,
    pub timecode: Option<Timecode>,
    pub device_type: Option<u16>,
    pub last_error: Option<String>,
}

impl DeckState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached flag set from a status event.
    pub fn apply_status<I, S>(&mut self, flags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.status.replace(flags);
    }

    /// Replace the cached timecode fields from a timecode event.
    pub fn apply_timecode(&mut self, timecode: Timecode) {
        self.timecode = Some(timecode);
    }

    /// Record the last-seen device-type code.
    pub fn apply_device_type(&mut self, code: u16) {
        self.device_type = Some(code);
    }

    /// Move the connection state; owned by the lifecycle manager.
    pub fn set_connection(&mut self, connection: ConnectionState) {
        self.connection = connection;
    }

    /// Record a non-fatal failure so it stays observable after the log
    /// line scrolls away.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    /// Answer a flag query from the cached set only; never touches the
    /// device.
    pub fn flag(&self, name: &str) -> bool {
        self.status.has_flag(name)
    }

    /// Build the wire-friendly view sent to control surfaces.
    pub fn snapshot(&self) -> DeckSnapshot {
        DeckSnapshot {
            connection: self.connection,
            flags: self.status.to_vec(),
            timecode: self.timecode.map(|tc| tc.to_string()),
            timecode_fields: self.timecode,
            device_type: self.device_type.map(|code| format!("0x{:x}", code)),
            last_error: self.last_error.clone(),
        }
    }
}

/// Wire-friendly view of the cached state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckSnapshot {
    pub connection: ConnectionState,
    pub flags: Vec<String>,
    /// Formatted `HH:MM:SS:FF`, when a timecode has been seen.
    pub timecode: Option<String>,
    pub timecode_fields: Option<Timecode>,
    /// Hexadecimal device-type string, e.g. `0x2025`.
    pub device_type: Option<String>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_query_reflects_latest_status_event() {
        let mut state = DeckState::new();
        state.apply_status(["Play", "Local"]);
        assert!(state.flag("PLAY"));
        assert!(state.flag("play"));
        assert!(!state.flag("RECORD"));

        state.apply_status(["Stop"]);
        assert!(!state.flag("PLAY"));
        assert!(state.flag("STOP"));
    }

    #[test]
    fn test_status_replacement_collapses_duplicates() {
        let mut snapshot = StatusSnapshot::default();
        snapshot.replace(["play", "PLAY", "Servo_Lock"]);
        assert_eq!(snapshot.to_vec(), vec!["PLAY", "SERVO_LOCK"]);
        assert_eq!(snapshot.joined(), "PLAY, SERVO_LOCK");
    }

    #[test]
    fn test_snapshot_formats_timecode_and_device_type() {
        let mut state = DeckState::new();
        state.set_connection(ConnectionState::Ok);
        state.apply_timecode(Timecode::new(1, 2, 3, 4));
        state.apply_device_type(0x2025);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.connection, ConnectionState::Ok);
        assert_eq!(snapshot.timecode.as_deref(), Some("01:02:03:04"));
        assert_eq!(snapshot.device_type.as_deref(), Some("0x2025"));
    }

    #[test]
    fn test_snapshot_serializes_connection_state_lowercase() {
        let state = DeckState::new();
        let json = serde_json::to_string(&state.snapshot()).unwrap();
        assert!(json.contains("\"connection\":\"disconnected\""));
    }

    #[test]
    fn test_record_error_is_kept_until_overwritten() {
        let mut state = DeckState::new();
        state.record_error("NAK: cassette out");
        assert_eq!(state.last_error.as_deref(), Some("NAK: cassette out"));
        state.record_error("send failed");
        assert_eq!(state.last_error.as_deref(), Some("send failed"));
    }
}
