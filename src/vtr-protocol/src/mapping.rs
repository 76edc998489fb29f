// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Mapping from surface commands to deck commands.

use vtr_core::{DeckCommand, Timecode};

use crate::codec::parse_timecode_source;
use crate::types::SurfaceCommand;

/// Convert a SurfaceCommand to a DeckCommand.
///
/// Returns None for the feedback queries (`get_state`, `query_flag`),
/// which are answered from the cached state and never reach the deck.
pub fn surface_command_to_deck(cmd: SurfaceCommand) -> Option<DeckCommand> {
    let mapped = match cmd {
        SurfaceCommand::GetState | SurfaceCommand::QueryFlag { .. } => return None,
        SurfaceCommand::Play => DeckCommand::Play,
        SurfaceCommand::Stop => DeckCommand::Stop,
        SurfaceCommand::FastForward => DeckCommand::FastForward,
        SurfaceCommand::Rewind => DeckCommand::Rewind,
        SurfaceCommand::Record => DeckCommand::Record,
        SurfaceCommand::Eject => DeckCommand::Eject,
        SurfaceCommand::StandbyOn => DeckCommand::StandbyOn,
        SurfaceCommand::StandbyOff => DeckCommand::StandbyOff,
        SurfaceCommand::Preview => DeckCommand::Preview,
        SurfaceCommand::Review => DeckCommand::Review,
        SurfaceCommand::SyncPlay => DeckCommand::SyncPlay,
        SurfaceCommand::FrameStepForward => DeckCommand::FrameStepForward,
        SurfaceCommand::FrameStepReverse => DeckCommand::FrameStepReverse,
        SurfaceCommand::Jog { delta } => DeckCommand::Jog { delta },
        SurfaceCommand::VarSpeed { speed } => DeckCommand::VarSpeed { speed },
        SurfaceCommand::Shuttle { speed } => DeckCommand::Shuttle { speed },
        SurfaceCommand::CueUp {
            hours,
            minutes,
            seconds,
            frames,
        } => DeckCommand::CueUp(Timecode::new(hours, minutes, seconds, frames)),
        SurfaceCommand::InEntry => DeckCommand::InEntry,
        SurfaceCommand::OutEntry => DeckCommand::OutEntry,
        SurfaceCommand::InDataPreset {
            hours,
            minutes,
            seconds,
            frames,
        } => DeckCommand::InDataPreset(Timecode::new(hours, minutes, seconds, frames)),
        SurfaceCommand::OutDataPreset {
            hours,
            minutes,
            seconds,
            frames,
        } => DeckCommand::OutDataPreset(Timecode::new(hours, minutes, seconds, frames)),
        SurfaceCommand::PrerollPreset {
            hours,
            minutes,
            seconds,
            frames,
        } => DeckCommand::PrerollPreset(Timecode::new(hours, minutes, seconds, frames)),
        SurfaceCommand::AutoModeOn => DeckCommand::AutoModeOn,
        SurfaceCommand::AutoModeOff => DeckCommand::AutoModeOff,
        SurfaceCommand::InputCheck => DeckCommand::InputCheck,
        SurfaceCommand::TcGenSense => DeckCommand::TcGenSense,
        SurfaceCommand::InDataSense => DeckCommand::InDataSense,
        SurfaceCommand::OutDataSense => DeckCommand::OutDataSense,
        SurfaceCommand::DeviceTypeSense => DeckCommand::DeviceTypeSense,
        SurfaceCommand::StatusSense { start, size } => DeckCommand::StatusSense { start, size },
        SurfaceCommand::TimecodeSense { source } => {
            DeckCommand::CurrentTimeSense(parse_timecode_source(&source))
        }
    };
    Some(mapped)
}
