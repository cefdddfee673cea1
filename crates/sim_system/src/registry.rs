//! System registry: maps system names to factories.
//!
//! A runner never owns a system type directly; it asks a registry (through
//! the [`SystemLoader`](crate::SystemLoader)) to build a fresh instance for
//! every attachment.

use std::collections::HashMap;
use std::sync::Arc;

use crate::builtin;
use crate::system::System;

/// Builds a new, unconfigured system instance.
pub type SystemFactory = Arc<dyn Fn() -> Box<dyn System> + Send + Sync>;

/// Anything that can produce systems by name.
pub trait SystemSource: Send + Sync {
    fn instantiate(&self, name: &str) -> Option<Box<dyn System>>;
}

/// Name-keyed system factories.
#[derive(Clone, Default)]
pub struct SystemRegistry {
    factories: HashMap<String, SystemFactory>,
}

impl SystemRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in system.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Register a factory under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn System> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Build a new instance of the system registered as `name`.
    #[must_use]
    pub fn create(&self, name: &str) -> Option<Box<dyn System>> {
        self.factories.get(name).map(|factory| factory())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl SystemSource for SystemRegistry {
    fn instantiate(&self, name: &str) -> Option<Box<dyn System>> {
        self.create(name)
    }
}

impl std::fmt::Debug for SystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemRegistry")
            .field("systems", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{LOG_RECORD, MODEL_STATE, VELOCITY_INTEGRATOR};

    struct Nop;

    impl System for Nop {
        fn name(&self) -> &str {
            "nop"
        }
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = SystemRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec![LOG_RECORD, MODEL_STATE, VELOCITY_INTEGRATOR]
        );
    }

    #[test]
    fn test_register_and_create() {
        let mut registry = SystemRegistry::new();
        assert!(registry.create("nop").is_none());
        registry.register("nop", || Box::new(Nop));
        assert!(registry.contains("nop"));
        let system = registry.create("nop").unwrap();
        assert_eq!(system.name(), "nop");
    }

    #[test]
    fn test_each_create_is_a_new_instance() {
        let registry = SystemRegistry::with_builtins();
        let a = registry.instantiate(VELOCITY_INTEGRATOR);
        let b = registry.instantiate(VELOCITY_INTEGRATOR);
        assert!(a.is_some() && b.is_some());
    }
}
