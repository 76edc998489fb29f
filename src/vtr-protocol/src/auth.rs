// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Authorization and token handling for control-surface connections.

use std::collections::HashSet;

/// Strip the "Bearer " prefix from a token string (case-insensitive).
///
/// If the string starts with "Bearer " (ignoring case), returns the
/// remainder. Otherwise returns the original trimmed string.
pub fn strip_bearer(value: &str) -> &str {
    let trimmed = value.trim();
    let prefix = "bearer ";
    if trimmed.len() >= prefix.len() && trimmed[..prefix.len()].eq_ignore_ascii_case(prefix) {
        &trimmed[prefix.len()..]
    } else {
        trimmed
    }
}

/// Trait for validating authorization tokens.
pub trait TokenValidator {
    /// Validate a token. Returns Ok(()) if valid, Err(String) with error
    /// message if invalid.
    fn validate(&self, token: &Option<String>) -> Result<(), String>;
}

/// Simple token validator using a HashSet of valid tokens.
///
/// An empty token set means no authentication is required.
pub struct SimpleTokenValidator {
    tokens: HashSet<String>,
}

impl SimpleTokenValidator {
    pub fn new(tokens: HashSet<String>) -> Self {
        SimpleTokenValidator { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenValidator for SimpleTokenValidator {
    fn validate(&self, token: &Option<String>) -> Result<(), String> {
        if self.tokens.is_empty() {
            return Ok(());
        }

        let Some(token) = token.as_ref() else {
            return Err("missing authorization token".into());
        };

        let candidate = strip_bearer(token);
        if self.tokens.contains(candidate) {
            return Ok(());
        }

        Err("invalid authorization token".into())
    }
}
