use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use wcpos_api::ApiError;

use super::Collection;
use crate::locks::{read, write};

/// Collections by name, owned by the composition root.
#[derive(Default)]
pub struct Collections {
    inner: RwLock<HashMap<String, Arc<dyn Collection>>>,
}

impl Collections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, collection: Arc<dyn Collection>) -> Self {
        self.insert(collection);
        self
    }

    /// Register a collection under its own name, returning the one it replaced.
    pub fn insert(&self, collection: Arc<dyn Collection>) -> Option<Arc<dyn Collection>> {
        write(&self.inner).insert(collection.name().to_string(), collection)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Collection>, ApiError> {
        read(&self.inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::collection_unavailable(name))
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn Collection>> {
        write(&self.inner).remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.inner).keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for Collections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collections")
            .field("names", &self.names())
            .finish()
    }
}
