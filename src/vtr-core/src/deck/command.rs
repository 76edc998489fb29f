// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use crate::timecode::Timecode;

/// Remote command understood by a deck transport.
///
/// Jog, variable and shuttle speeds are signed device units
/// (-127..=127, negative = reverse).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeckCommand {
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
    CueUp(Timecode),
    InEntry,
    OutEntry,
    InDataPreset(Timecode),
    OutDataPreset(Timecode),
    PrerollPreset(Timecode),
    AutoModeOn,
    AutoModeOff,
    InputCheck,
    TcGenSense,
    InDataSense,
    OutDataSense,
    DeviceTypeSense,
    StatusSense { start: u8, size: u8 },
    CurrentTimeSense(TimecodeSource),
}

/// Which timecode track a current-time-sense request should read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimecodeSource {
    #[default]
    Auto,
    Ltc,
    Vitc,
}
