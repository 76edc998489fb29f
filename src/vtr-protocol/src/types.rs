// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Transport DTOs for the JSON line protocol.

use serde::{Deserialize, Serialize};

use vtr_core::DeckSnapshot;

/// Command received from control surfaces (JSON).
///
/// `get_state` and `query_flag` are feedback queries answered from the
/// cached state; everything else maps 1:1 onto a deck command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum SurfaceCommand {
    GetState,
    QueryFlag { flag: String },
    Play,
    Stop,
    FastForward,
    Rewind,
    Record,
    Eject,
    StandbyOn,
    StandbyOff,
    Preview,
    Review,
    SyncPlay,
    FrameStepForward,
    FrameStepReverse,
    Jog { delta: i8 },
    VarSpeed { speed: i8 },
    Shuttle { speed: i8 },
    CueUp { hours: u8, minutes: u8, seconds: u8, frames: u8 },
    InEntry,
    OutEntry,
    InDataPreset { hours: u8, minutes: u8, seconds: u8, frames: u8 },
    OutDataPreset { hours: u8, minutes: u8, seconds: u8, frames: u8 },
    PrerollPreset { hours: u8, minutes: u8, seconds: u8, frames: u8 },
    AutoModeOn,
    AutoModeOff,
    InputCheck,
    TcGenSense,
    InDataSense,
    OutDataSense,
    DeviceTypeSense,
    StatusSense { start: u8, size: u8 },
    TimecodeSense { source: String },
}

/// Envelope for surface commands with optional authentication token.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientEnvelope {
    pub token: Option<String>,
    #[serde(flatten)]
    pub cmd: SurfaceCommand,
}

/// Response sent to control surfaces over TCP.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<DeckSnapshot>,
    /// Answer to a `query_flag` request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClientResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            state: None,
            flag: None,
            error: None,
        }
    }

    pub fn with_state(state: DeckSnapshot) -> Self {
        Self {
            success: true,
            state: Some(state),
            flag: None,
            error: None,
        }
    }

    pub fn with_flag(asserted: bool) -> Self {
        Self {
            success: true,
            state: None,
            flag: Some(asserted),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            state: None,
            flag: None,
            error: Some(error.into()),
        }
    }
}
