//! Subject Store — storage seam for data-subject records.
//!
//! The engine talks to storage through `SubjectStore` only, so the
//! in-memory default can be swapped for a persistent backend without
//! touching policy code. Implementations must serialize updates per
//! subject: two concurrent mutations of the same record may interleave in
//! either order, but never corrupt it.

use crate::types::DataSubject;
use custodia_core::error::{CustodiaError, CustodiaResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

pub trait SubjectStore: Send + Sync {
    /// Insert a new record. Fails if the id is already taken.
    fn insert(&self, subject: DataSubject) -> CustodiaResult<()>;

    /// Snapshot of one record.
    fn read(&self, id: &str) -> CustodiaResult<DataSubject>;

    /// Apply `mutate` to one record under that record's lock.
    fn update(&self, id: &str, mutate: &mut dyn FnMut(&mut DataSubject)) -> CustodiaResult<()>;

    /// Remove and return one record.
    fn remove(&self, id: &str) -> CustodiaResult<DataSubject>;

    fn exists(&self, id: &str) -> bool;

    fn ids(&self) -> Vec<String>;

    fn len(&self) -> usize;
}

/// Map of per-subject locks. The outer map lock is held only to look up
/// or insert the slot; mutations happen under the slot's own mutex.
pub struct InMemorySubjectStore {
    subjects: RwLock<HashMap<String, Arc<Mutex<DataSubject>>>>,
}

impl InMemorySubjectStore {
    pub fn new() -> Self {
        Self { subjects: RwLock::new(HashMap::new()) }
    }

    fn slot(&self, id: &str) -> CustodiaResult<Arc<Mutex<DataSubject>>> {
        self.subjects
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| CustodiaError::NotFound(id.to_string()))
    }
}

impl Default for InMemorySubjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SubjectStore for InMemorySubjectStore {
    fn insert(&self, subject: DataSubject) -> CustodiaResult<()> {
        let mut subjects = self.subjects.write();
        if subjects.contains_key(&subject.id) {
            return Err(CustodiaError::StorageUnavailable(format!(
                "subject {} already exists",
                subject.id
            )));
        }
        subjects.insert(subject.id.clone(), Arc::new(Mutex::new(subject)));
        Ok(())
    }

    fn read(&self, id: &str) -> CustodiaResult<DataSubject> {
        Ok(self.slot(id)?.lock().clone())
    }

    fn update(&self, id: &str, mutate: &mut dyn FnMut(&mut DataSubject)) -> CustodiaResult<()> {
        let slot = self.slot(id)?;
        let mut subject = slot.lock();
        mutate(&mut subject);
        Ok(())
    }

    fn remove(&self, id: &str) -> CustodiaResult<DataSubject> {
        let slot = self
            .subjects
            .write()
            .remove(id)
            .ok_or_else(|| CustodiaError::NotFound(id.to_string()))?;
        let subject = slot.lock().clone();
        Ok(subject)
    }

    fn exists(&self, id: &str) -> bool {
        self.subjects.read().contains_key(id)
    }

    fn ids(&self) -> Vec<String> {
        self.subjects.read().keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.subjects.read().len()
    }
}
