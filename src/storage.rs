use crate::{error::Error, id::NodeId};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

/// Mutex guarded key/value map. Last write wins, nothing expires.
///
/// The lock is only held for the map access itself.
pub(crate) struct LocalStorage<V> {
    entries: Mutex<HashMap<NodeId, V>>,
}

impl<V: Clone> LocalStorage<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn put(&self, key: NodeId, value: V) -> Result<(), Error> {
        self.lock()?.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &NodeId) -> Result<Option<V>, Error> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<NodeId, V>>, Error> {
        self.entries
            .lock()
            .map_err(|_| Error::Storage("local storage lock poisoned".to_owned()))
    }
}

impl<V: Clone> Default for LocalStorage<V> {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------//
