// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use crate::timecode::Timecode;

/// Asynchronous event pushed by a deck transport.
#[derive(Debug, Clone)]
pub enum DeckEvent {
    /// Decoded status page; a full replacement set of flag tokens.
    Status { flags: Vec<String> },
    /// Decoded current-time reply.
    Timecode(Timecode),
    /// Device-type reply (opaque code).
    DeviceType(u16),
    /// Positive acknowledgement of the last request.
    Ack,
    /// Negative acknowledgement with decoded reason bits.
    Nak { reasons: Vec<String> },
    /// The underlying port closed.
    PortClosed,
    /// The underlying port reported an error.
    PortError { message: String },
}
