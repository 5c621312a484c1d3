//! Shared in-memory record set.
//!
//! Readers take the read lock; writers hold the write lock only for short,
//! in-memory mutations. Persistence is serialized separately so that
//! snapshots reach the store in the order they were taken.

use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::records::{Category, RecordStore};

#[derive(Default)]
pub struct Library {
    categories: RwLock<Vec<Category>>,
    persist: Mutex<()>,
}

impl Library {
    pub fn new(categories: Vec<Category>) -> Self {
        Self {
            categories: RwLock::new(categories),
            persist: Mutex::new(()),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<Category>> {
        // readers never observe a half-applied write: every mutation swaps
        // whole values under the guard
        self.categories
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<Category>> {
        self.categories
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Vec<Category> {
        self.read().clone()
    }

    /// Apply `f` under the write lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut Vec<Category>) -> R) -> R {
        let mut categories = self.write();
        f(&mut categories)
    }

    /// Write the current state through `store`.
    pub fn persist(&self, store: &dyn RecordStore) -> anyhow::Result<()> {
        let _order = self
            .persist
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let snapshot = self.snapshot();
        store.save_all(&snapshot)
    }

    pub fn record_count(&self) -> usize {
        self.read().iter().map(|c| c.items.len()).sum()
    }

    pub fn embedded_count(&self) -> usize {
        self.read()
            .iter()
            .flat_map(|c| c.items.iter())
            .filter(|r| r.embedding.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ItemKind, Record};
    use crate::semantic::Embedding;

    #[test]
    fn test_counts() {
        let mut category = Category::new("Dev");
        let mut embedded = Record::new("GitHub", "https://github.com/", ItemKind::Link);
        embedded.embedding = Some(Embedding::zeroed());
        category.items.push(embedded);
        category
            .items
            .push(Record::new("Dev.to", "https://dev.to/", ItemKind::Link));

        let library = Library::new(vec![category, Category::new("Empty")]);
        assert_eq!(library.record_count(), 2);
        assert_eq!(library.embedded_count(), 1);
    }

    #[test]
    fn test_update_is_visible_to_readers() {
        let library = Library::new(vec![]);
        library.update(|categories| categories.push(Category::new("New")));
        assert_eq!(library.read().len(), 1);
        assert_eq!(library.snapshot()[0].name, "New");
    }
}
