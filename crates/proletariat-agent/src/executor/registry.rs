//! Handler registry: maps job kinds to their [`JobHandler`]s.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::JobHandler;

/// Central index of the handlers this agent can run.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    fallback: Option<String>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl HandlerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `echo` and `sleep` handlers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::builtin::EchoHandler));
        registry.register(Arc::new(super::builtin::SleepHandler));
        registry
    }

    /// Register a handler. Overwrites any handler of the same kind.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        debug!(kind = handler.kind(), "job handler registered");
        let _ = self.handlers.insert(handler.kind().to_owned(), handler);
    }

    /// Run jobs of unknown or missing kind with the handler registered as `kind`.
    ///
    /// Returns `false` (and changes nothing) if `kind` is not registered.
    pub fn set_fallback(&mut self, kind: &str) -> bool {
        if !self.handlers.contains_key(kind) {
            return false;
        }
        self.fallback = Some(kind.to_owned());
        true
    }

    /// Look up a handler by kind.
    pub fn get(&self, kind: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(kind).cloned()
    }

    /// Handler for a job's declared kind, falling back when configured.
    pub fn resolve(&self, kind: Option<&str>) -> Option<Arc<dyn JobHandler>> {
        kind.and_then(|k| self.get(k)).or_else(|| {
            self.fallback
                .as_deref()
                .and_then(|fallback| self.get(fallback))
        })
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Kind used for unknown jobs, if any.
    pub fn fallback(&self) -> Option<&str> {
        self.fallback.as_deref()
    }
}
