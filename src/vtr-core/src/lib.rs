// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod deck;
pub mod timecode;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use deck::command::{DeckCommand, TimecodeSource};
pub use deck::event::DeckEvent;
pub use deck::request::DeckRequest;
pub use deck::response::{DeckError, DeckResult};
pub use deck::state::{ConnectionState, DeckSnapshot, DeckState};
pub use deck::DeckTransport;
pub use timecode::Timecode;
