// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Codec utilities for parsing envelopes and timecode-source strings.

use serde_json;

use crate::types::{ClientEnvelope, SurfaceCommand};
use vtr_core::TimecodeSource;

/// Parse a timecode-source string into a TimecodeSource.
///
/// Handles AUTO, LTC, VITC case-insensitively; anything else falls back
/// to AUTO, matching deck behavior for unknown sense modes.
pub fn parse_timecode_source(s: &str) -> TimecodeSource {
    match s.to_ascii_uppercase().as_str() {
        "LTC" => TimecodeSource::Ltc,
        "VITC" => TimecodeSource::Vitc,
        _ => TimecodeSource::Auto,
    }
}

/// Parse a JSON string into a ClientEnvelope.
///
/// First tries to parse as a full ClientEnvelope.
/// If that fails, tries to parse as a bare SurfaceCommand and wraps it
/// with token: None.
pub fn parse_envelope(input: &str) -> Result<ClientEnvelope, serde_json::Error> {
    match serde_json::from_str::<ClientEnvelope>(input) {
        Ok(envelope) => Ok(envelope),
        Err(_) => {
            let cmd = serde_json::from_str::<SurfaceCommand>(input)?;
            Ok(ClientEnvelope { token: None, cmd })
        }
    }
}
