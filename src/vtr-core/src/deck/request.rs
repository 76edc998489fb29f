// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tokio::sync::oneshot;

use crate::{DeckCommand, DeckResult};

/// Request sent to the deck task.
#[derive(Debug)]
pub struct DeckRequest {
    pub cmd: DeckCommand,
    pub respond_to: oneshot::Sender<DeckResult<()>>,
}
