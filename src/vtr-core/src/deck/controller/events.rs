// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Change-notification system for the deck bridge.
//!
//! Connection-state transitions and cache updates each emit a discrete
//! notification that observers subscribe to, instead of observers
//! wrapping or patching the update path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::deck::state::{ConnectionState, StatusSnapshot};
use crate::timecode::Timecode;

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Trait for components that want to observe bridge changes.
///
/// All methods have default no-op implementations, so listeners can
/// selectively override only the events they care about.
pub trait BridgeListener: Send + Sync {
    /// Called on every connection-state transition.
    fn on_connection_change(&self, _old: ConnectionState, _new: ConnectionState) {}

    /// Called when the cached flag set was replaced.
    fn on_status_change(&self, _status: &StatusSnapshot) {}

    /// Called when the cached timecode was replaced.
    fn on_timecode_change(&self, _timecode: Timecode) {}

    /// Called when a device-type reply was seen.
    fn on_device_type(&self, _code: u16) {}
}

/// Manages registered listeners and dispatches notifications.
pub struct BridgeEventEmitter {
    listeners: Vec<(ListenerId, Arc<dyn BridgeListener>)>,
}

impl Default for BridgeEventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeEventEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Register a listener. Returns an ID usable with `unregister`.
    pub fn register(&mut self, listener: Arc<dyn BridgeListener>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.push((id, listener));
        id
    }

    pub fn unregister(&mut self, id: ListenerId) {
        self.listeners.retain(|(lid, _)| *lid != id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn notify_connection_change(&self, old: ConnectionState, new: ConnectionState) {
        for (_, listener) in &self.listeners {
            listener.on_connection_change(old, new);
        }
    }

    pub fn notify_status_change(&self, status: &StatusSnapshot) {
        for (_, listener) in &self.listeners {
            listener.on_status_change(status);
        }
    }

    pub fn notify_timecode_change(&self, timecode: Timecode) {
        for (_, listener) in &self.listeners {
            listener.on_timecode_change(timecode);
        }
    }

    pub fn notify_device_type(&self, code: u16) {
        for (_, listener) in &self.listeners {
            listener.on_device_type(code);
        }
    }
}
