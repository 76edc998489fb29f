// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Connection controller components: the lifecycle state machine, the
//! reconnect and polling policies, and the change-notification emitter.

pub mod events;
pub mod machine;
pub mod policies;

pub use events::{BridgeEventEmitter, BridgeListener, ListenerId};
pub use machine::{LinkEvent, LinkStateMachine};
pub use policies::{PollConfig, ReconnectBackoff, ReconnectConfig};
