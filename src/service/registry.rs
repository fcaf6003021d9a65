//! Handle table
//!
//! Maps the handles handed across the boundary to the live objects they
//! name. The codec never touches this; it only copies handle values.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::protocol::RemoteHandle;

/// Thread-safe registry of objects reachable through handles
#[derive(Debug)]
pub struct ObjectRegistry<T> {
    next_id: AtomicU64,
    objects: RwLock<HashMap<u64, Arc<T>>>,
}

impl<T> Default for ObjectRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ObjectRegistry<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Store an object and mint a fresh non-null handle for it
    pub fn register(&self, object: T) -> RemoteHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(object));
        RemoteHandle::new(id)
    }

    /// Live object behind `handle`; `None` for null or released handles
    pub fn get(&self, handle: RemoteHandle) -> Option<Arc<T>> {
        let id = handle.id()?;
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Drop the registry's reference; returns whether anything was removed
    pub fn release(&self, handle: RemoteHandle) -> bool {
        let Some(id) = handle.id() else {
            return false;
        };
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All live entries, ordered by handle id
    pub fn snapshot(&self) -> Vec<(RemoteHandle, Arc<T>)> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<_> = objects
            .iter()
            .map(|(id, object)| (RemoteHandle::new(*id), object.clone()))
            .collect();
        entries.sort_by_key(|(handle, _)| handle.id());
        entries
    }
}
