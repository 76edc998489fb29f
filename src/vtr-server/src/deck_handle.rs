// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Thin handle giving the listener access to the deck task and state.

use tokio::sync::{mpsc, watch};

use vtr_core::{DeckRequest, DeckState};

/// A handle to the running deck bridge.
///
/// Created in `main.rs` and handed to the listener; commands go through
/// `deck_tx`, feedback queries are answered from `state_rx` without
/// touching the deck.
pub struct DeckHandle {
    /// Send commands to the deck task.
    pub deck_tx: mpsc::Sender<DeckRequest>,
    /// Watch the latest cached deck state.
    pub state_rx: watch::Receiver<DeckState>,
}
