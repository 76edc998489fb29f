// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::DynResult;

pub mod command;
pub mod controller;
pub mod event;
pub mod request;
pub mod response;
pub mod state;

use command::DeckCommand;
use event::DeckEvent;

/// Alias to reduce type complexity in DeckTransport.
pub type DeckOpFuture<'a> = Pin<Box<dyn Future<Output = DynResult<()>> + Send + 'a>>;

/// Number of data bits on the 9-pin remote port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Seven,
    Eight,
}

impl TryFrom<u8> for DataBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(format!("data_bits must be 7 or 8, got {}", other)),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(value: DataBits) -> Self {
        match value {
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

/// Parity setting on the 9-pin remote port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Number of stop bits on the 9-pin remote port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    One,
    Two,
}

impl TryFrom<u8> for StopBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(format!("stop_bits must be 1 or 2, got {}", other)),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(value: StopBits) -> Self {
        match value {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

/// Serial line parameters for the 9-pin remote port.
///
/// The 9-pin standard is 38400 baud, 8 data bits, odd parity, 1 stop bit;
/// some decks and adapters deviate, so all of it is configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialSettings {
    pub path: String,
    pub baud: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            path: "/dev/ttyUSB0".to_string(),
            baud: 38400,
            data_bits: DataBits::Eight,
            parity: Parity::Odd,
            stop_bits: StopBits::One,
        }
    }
}

/// Common interface for 9-pin deck transports.
///
/// A transport owns the physical link and the wire protocol. Every remote
/// operation is a fire-and-forget request: `send` resolves once the request
/// is on the wire, and any reply (status page, timecode, device type,
/// ACK/NAK) arrives on the event stream. No operation carries a hard
/// timeout; a hung link is only observed through `PortError`/`PortClosed`
/// events from the transport itself.
pub trait DeckTransport: Send {
    /// Open the link. Must not be called while a prior open or close is
    /// still outstanding.
    fn open<'a>(&'a mut self) -> DeckOpFuture<'a>;

    /// Close the link. Safe to call when already closed.
    fn close<'a>(&'a mut self) -> DeckOpFuture<'a>;

    fn is_open(&self) -> bool;

    /// Issue a remote command.
    fn send<'a>(&'a mut self, cmd: DeckCommand) -> DeckOpFuture<'a>;

    /// Subscribe to events pushed by the deck.
    fn subscribe_events(&self) -> broadcast::Receiver<DeckEvent>;
}
