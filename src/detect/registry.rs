use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::adapter::{share, DetectionAdapter, SharedBackend};
use super::backend::InferenceBackend;

/// Named inference backends, each behind a shared handle.
///
/// One handle may serve image runs and stream runs alike; the mutex inside
/// `SharedBackend` serializes callers.
pub struct BackendRegistry {
    backends: HashMap<String, SharedBackend>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend under its own name. The first registered backend becomes the default.
    pub fn register<B: InferenceBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        self.register_shared(name, share(backend));
    }

    /// Register an already-shared handle under an explicit name.
    pub fn register_shared(&mut self, name: impl Into<String>, backend: SharedBackend) {
        let name = name.into();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, backend);
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.backends.get(name).cloned()
    }

    /// Get default backend.
    pub fn default_backend(&self) -> Option<SharedBackend> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Adapter over the named backend, or over the default when `name` is `None`.
    pub fn adapter(&self, name: Option<&str>) -> Result<DetectionAdapter> {
        let backend = match name {
            Some(name) => self
                .get(name)
                .ok_or_else(|| anyhow!("backend '{}' not registered", name))?,
            None => self
                .default_backend()
                .ok_or_else(|| anyhow!("no backend registered"))?,
        };
        Ok(DetectionAdapter::new(backend))
    }

    /// List registered backends, sorted by name.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
