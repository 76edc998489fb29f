// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::HashMap;
use std::sync::Arc;

use vtr_core::deck::{DeckTransport, SerialSettings};
use vtr_core::DynResult;

mod loopback;

pub use loopback::LoopbackDeck;

/// Connection details for instantiating a deck transport.
///
/// 9-pin decks hang off a serial port; external backends decide what the
/// settings mean for their hardware.
#[derive(Debug, Clone)]
pub enum DeckAccess {
    Serial(SerialSettings),
}

/// Factory producing a fresh transport for each connection attempt.
pub type TransportFactory = Arc<dyn Fn(DeckAccess) -> DynResult<Box<dyn DeckTransport>> + Send + Sync>;

/// Context for registering and instantiating deck transport backends.
#[derive(Clone)]
pub struct RegistrationContext {
    factories: HashMap<String, TransportFactory>,
}

impl RegistrationContext {
    /// Create a new empty registration context.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory under a stable name (e.g. "loopback").
    pub fn register_backend<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(DeckAccess) -> DynResult<Box<dyn DeckTransport>> + Send + Sync + 'static,
    {
        let key = normalize_name(name);
        self.factories.insert(key, Arc::new(factory));
    }

    /// Check whether a backend name is registered.
    pub fn is_backend_registered(&self, name: &str) -> bool {
        let key = normalize_name(name);
        self.factories.contains_key(&key)
    }

    /// List registered backend names.
    pub fn registered_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiate a deck transport based on the selected name and access
    /// method.
    pub fn build_transport(&self, name: &str, access: DeckAccess) -> DynResult<Box<dyn DeckTransport>> {
        let key = normalize_name(name);
        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| format!("Unknown deck backend: {}", name))?;
        factory(access)
    }

    /// Merge another registration context into this one.
    pub fn extend_from(&mut self, other: &RegistrationContext) {
        for (name, factory) in &other.factories {
            self.factories.insert(name.clone(), Arc::clone(factory));
        }
    }
}

impl Default for RegistrationContext {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Register all built-in backends on a context.
pub fn register_builtin_backends_on(context: &mut RegistrationContext) {
    context.register_backend("loopback", loopback_factory);
}

fn loopback_factory(_access: DeckAccess) -> DynResult<Box<dyn DeckTransport>> {
    Ok(Box::new(loopback::LoopbackDeck::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registration() {
        let mut ctx = RegistrationContext::new();
        register_builtin_backends_on(&mut ctx);

        assert!(ctx.is_backend_registered("loopback"));
        assert!(ctx.is_backend_registered("Loop-Back"));
        assert!(!ctx.is_backend_registered("bvw75"));
        assert_eq!(ctx.registered_backends(), vec!["loopback"]);
    }

    #[test]
    fn test_build_unknown_backend_fails() {
        let ctx = RegistrationContext::new();
        let access = DeckAccess::Serial(SerialSettings::default());
        assert!(ctx.build_transport("bvw75", access).is_err());
    }

    #[test]
    fn test_extend_from_merges_factories() {
        let mut builtin = RegistrationContext::new();
        register_builtin_backends_on(&mut builtin);

        let mut ctx = RegistrationContext::new();
        ctx.extend_from(&builtin);
        assert!(ctx.is_backend_registered("loopback"));
    }
}
