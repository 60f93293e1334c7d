use crate::error::Result;
use crate::models::catalog::{Catalog, ModelInfo};
use crate::models::handle::{ModelHandle, SpeechModel};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds model instances for the registry
pub trait ModelFactory: Send + Sync {
    /// Instantiate the model described by `info`. May be slow.
    fn create(&self, info: &ModelInfo) -> Result<Box<dyn SpeechModel>>;
}

impl<F> ModelFactory for F
where
    F: Fn(&ModelInfo) -> Result<Box<dyn SpeechModel>> + Send + Sync,
{
    fn create(&self, info: &ModelInfo) -> Result<Box<dyn SpeechModel>> {
        self(info)
    }
}

type Slot = Arc<OnceCell<ModelHandle>>;

/// In-memory cache of instantiated models, keyed by identifier
///
/// Each identifier owns a construct-once cell. The map lock is only held to find
/// or insert that cell, so constructing one model never blocks lookups or loads
/// of another.
pub struct ModelRegistry {
    catalog: Catalog,
    factory: Box<dyn ModelFactory>,
    slots: RwLock<HashMap<String, Slot>>,
}

impl ModelRegistry {
    pub fn new(catalog: Catalog, factory: impl ModelFactory + 'static) -> Self {
        Self {
            catalog,
            factory: Box::new(factory),
            slots: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Return the handle for `id`, instantiating it on first use
    ///
    /// Concurrent callers for the same unseen `id` share one construction.
    /// If construction fails nothing is published and the next call retries.
    pub fn load(&self, id: &str) -> Result<ModelHandle> {
        let info = self.catalog.require(id)?;

        let slot = self.slot_for(id);
        let handle = slot.get_or_try_init(|| {
            tracing::info!("Instantiating model {id}");
            let model = self.factory.create(info)?;
            tracing::info!("Model {id} loaded");
            Ok::<_, crate::error::VoiceError>(ModelHandle::new(id, model))
        })?;

        Ok(handle.clone())
    }

    /// Fast path under the shared lock, re-check under the exclusive lock
    fn slot_for(&self, id: &str) -> Slot {
        if let Some(slot) = self.slots.read().get(id) {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write();
        Arc::clone(slots.entry(id.to_string()).or_default())
    }

    /// Drop the handle for `id`. Returns whether a loaded handle was removed.
    ///
    /// A handle still under construction counts as not loaded and is left in
    /// place, so its builder and any waiting loaders end up sharing it.
    /// Operations already holding a clone of the handle run to completion.
    pub fn unload(&self, id: &str) -> bool {
        if !self.slots.read().contains_key(id) {
            return false;
        }

        let mut slots = self.slots.write();
        match slots.get(id).map(|slot| slot.get().is_some()) {
            Some(true) => {
                slots.remove(id);
                tracing::info!("Model {id} unloaded");
                true
            }
            Some(false) => {
                tracing::debug!("Model {id} is still being built, leaving it in place");
                false
            }
            None => false,
        }
    }

    /// Handle for `id` if it is loaded, without instantiating it
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ModelHandle> {
        self.slots.read().get(id).and_then(|slot| slot.get().cloned())
    }

    #[must_use]
    pub fn is_loaded(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Snapshot of identifiers with a fully constructed handle
    #[must_use]
    pub fn list_loaded(&self) -> Vec<String> {
        self.slots
            .read()
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("catalog", &self.catalog)
            .field("loaded", &self.list_loaded())
            .finish_non_exhaustive()
    }
}
