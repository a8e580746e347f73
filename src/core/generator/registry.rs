use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::Generator;
use crate::core::error::{GeneratorError, Result};

struct Entry {
    generator: Arc<Generator>,
    /// Held across `load()` so concurrent first callers wait for one load.
    loaded: Mutex<bool>,
}

/// Named generators with lazy, load-once semantics.
pub struct GeneratorRegistry {
    entries: RwLock<HashMap<String, Arc<Entry>>>,
    default_name: Option<String>,
}

impl std::fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("default_name", &self.default_name)
            .finish_non_exhaustive()
    }
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_name: None,
        }
    }

    pub fn with_default(name: impl Into<String>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_name: Some(name.into()),
        }
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// Inserts or replaces `name`. A replaced entry's load state is discarded.
    pub fn register(&self, name: impl Into<String>, generator: Generator) {
        let name = name.into();
        tracing::debug!(name = %name, checkpoint = generator.checkpoint(), "registering generator");
        self.entries.write().insert(
            name,
            Arc::new(Entry {
                generator: Arc::new(generator),
                loaded: Mutex::new(false),
            }),
        );
    }

    fn entry(&self, name: &str) -> Result<Arc<Entry>> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| GeneratorError::UnknownGenerator(name.to_string()))
    }

    /// Returns the generator for `name` as registered, without loading it.
    pub fn peek(&self, name: &str) -> Result<Arc<Generator>> {
        Ok(self.entry(name)?.generator.clone())
    }

    /// Returns the loaded generator for `name`, loading it on first use.
    pub fn get(&self, name: &str) -> Result<Arc<Generator>> {
        let entry = self.entry(name)?;

        let mut loaded = entry.loaded.lock();
        if !*loaded {
            tracing::info!(name, checkpoint = entry.generator.checkpoint(), "loading generator");
            entry.generator.load()?;
            *loaded = true;
        }

        Ok(entry.generator.clone())
    }

    pub fn get_default(&self) -> Result<Arc<Generator>> {
        match &self.default_name {
            Some(name) => self.get(name),
            None => Err(GeneratorError::UnknownGenerator("<default>".to_string())),
        }
    }

    /// Loads each name eagerly. Failures are logged and returned rather than
    /// aborting the remaining loads.
    pub fn load_models<'a, I>(&self, names: I) -> Vec<(String, GeneratorError)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut failures = Vec::new();
        for name in names {
            if let Err(err) = self.get(name) {
                tracing::error!(name, error = %err, "failed to load generator");
                failures.push((name.to_string(), err));
            }
        }
        failures
    }

    pub fn list_names(&self) -> BTreeSet<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// `None` when `name` is not registered.
    pub fn is_loaded(&self, name: &str) -> Option<bool> {
        let entry = self.entries.read().get(name).cloned()?;
        let loaded = *entry.loaded.lock();
        Some(loaded)
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
