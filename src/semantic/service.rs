//! Semantic search service for the link library.
//!
//! Owns the shared library, the record store and the encoder, and exposes
//! search, indexing and the editing operations that keep the store in sync.

use std::sync::Arc;

use serde::Serialize;

use crate::config::SemanticSearchConfig;
use crate::eid::Eid;
use crate::library::Library;
use crate::records::{Category, ItemKind, Record, RecordStore, RecordUpdate};

use super::encoder::TextEncoder;
use super::indexer::{CancelToken, IndexError, Indexer, IndexingPass, PassReport, Progress};
use super::ranker::{RankedCategory, Ranker};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("Category already exists: {0}")]
    CategoryExists(String),

    #[error("Record not found: {0}")]
    RecordNotFound(Eid),

    #[error("Storage error: {0}")]
    Storage(anyhow::Error),

    #[error("Indexing error: {0}")]
    Index(#[from] IndexError),
}

/// A ranked record, detached from the library lock.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: Eid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub content: String,
    pub kind: ItemKind,
    pub score: f32,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryHits {
    pub id: Eid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub hits: Vec<SearchHit>,
}

impl From<RankedCategory<'_>> for CategoryHits {
    fn from(ranked: RankedCategory<'_>) -> Self {
        Self {
            id: ranked.category.id.clone(),
            name: ranked.category.name.clone(),
            icon: ranked.category.icon.clone(),
            hits: ranked
                .records
                .into_iter()
                .map(|hit| SearchHit {
                    id: hit.record.id.clone(),
                    title: hit.record.title.clone(),
                    description: hit.record.description.clone(),
                    content: hit.record.content.clone(),
                    kind: hit.record.kind,
                    label: hit.label(),
                    score: hit.score,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    pub model_loaded: bool,
    pub records: usize,
    pub embedded: usize,
}

pub struct SemanticSearchService {
    library: Arc<Library>,
    store: Arc<dyn RecordStore>,
    encoder: Arc<dyn TextEncoder>,
    indexer: Indexer,
    ranker: Ranker,
}

impl SemanticSearchService {
    pub fn new(
        library: Arc<Library>,
        store: Arc<dyn RecordStore>,
        encoder: Arc<dyn TextEncoder>,
        config: &SemanticSearchConfig,
    ) -> Self {
        let indexer = Indexer::new(library.clone(), store.clone(), encoder.clone())
            .with_encode_timeout(config.encode_timeout());
        let ranker = Ranker::new(encoder.clone()).with_threshold(config.relevance_threshold);

        Self {
            library,
            store,
            encoder,
            indexer,
            ranker,
        }
    }

    /// Load the library from `store` and build the service around it.
    pub fn load(
        store: Arc<dyn RecordStore>,
        encoder: Arc<dyn TextEncoder>,
        config: &SemanticSearchConfig,
    ) -> anyhow::Result<Self> {
        let categories = store.load_all()?;
        log::debug!("loaded {} categories", categories.len());
        let library = Arc::new(Library::new(categories));
        Ok(Self::new(library, store, encoder, config))
    }

    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    pub fn is_model_loaded(&self) -> bool {
        self.encoder.is_loaded()
    }

    pub fn status(&self) -> IndexStatus {
        IndexStatus {
            model_loaded: self.encoder.is_loaded(),
            records: self.library.record_count(),
            embedded: self.library.embedded_count(),
        }
    }

    pub fn find_record(&self, id: &Eid) -> Option<Record> {
        self.library
            .read()
            .iter()
            .flat_map(|category| category.items.iter())
            .find(|record| &record.id == id)
            .cloned()
    }

    /// Category names with their record counts, in storage order.
    pub fn category_sizes(&self) -> Vec<(String, usize)> {
        self.library
            .read()
            .iter()
            .map(|category| (category.name.clone(), category.items.len()))
            .collect()
    }

    /// Rank the library and return the visible categories.
    pub fn search(&self, query: &str, semantic: bool) -> Vec<CategoryHits> {
        // embed before taking the read lock so indexer merges are not held up
        let prepared = self.ranker.prepare(query, semantic);
        let categories = self.library.read();
        self.ranker
            .rank_prepared(&categories, &prepared)
            .into_iter()
            .map(CategoryHits::from)
            .collect()
    }

    /// Start an indexing pass in the background.
    pub fn start_indexing(&self) -> Result<IndexingPass, IndexError> {
        self.indexer.start()
    }

    /// Run an indexing pass on the calling thread.
    pub fn index(
        &self,
        cancel: &CancelToken,
        on_progress: impl FnMut(Progress),
    ) -> Result<PassReport, IndexError> {
        self.indexer.run(cancel, on_progress)
    }

    /// Add `record` to the category called `category`, creating it when absent.
    pub fn add_record(&self, category: &str, record: Record) -> Result<Eid, ServiceError> {
        let id = record.id.clone();
        self.library.update(|categories| {
            match categories.iter_mut().find(|c| c.name == category) {
                Some(existing) => existing.items.push(record),
                None => {
                    let mut created = Category::new(category);
                    created.items.push(record);
                    categories.push(created);
                }
            }
        });

        self.persist()?;
        Ok(id)
    }

    pub fn delete_record(&self, id: &Eid) -> Result<Record, ServiceError> {
        let removed = self.library.update(|categories| {
            categories.iter_mut().find_map(|category| {
                let idx = category.items.iter().position(|r| &r.id == id)?;
                Some(category.items.remove(idx))
            })
        });

        let removed = removed.ok_or_else(|| ServiceError::RecordNotFound(id.clone()))?;
        self.persist()?;
        Ok(removed)
    }

    /// Edit a record in place, moving it when `update.category` names
    /// another category. The stored vector is kept even when the text
    /// changes; it is not recomputed by later passes.
    pub fn update_record(&self, id: &Eid, update: &RecordUpdate) -> Result<Record, ServiceError> {
        let updated = self.library.update(|categories| -> Result<Record, ServiceError> {
            let target = match &update.category {
                Some(name) => Some(
                    categories
                        .iter()
                        .position(|c| &c.name == name)
                        .ok_or_else(|| ServiceError::CategoryNotFound(name.clone()))?,
                ),
                None => None,
            };

            let (cat_idx, item_idx) = categories
                .iter()
                .enumerate()
                .find_map(|(ci, c)| c.items.iter().position(|r| &r.id == id).map(|ri| (ci, ri)))
                .ok_or_else(|| ServiceError::RecordNotFound(id.clone()))?;

            let record = &mut categories[cat_idx].items[item_idx];
            update.apply(record);
            let updated = record.clone();

            if let Some(target) = target.filter(|&t| t != cat_idx) {
                let moved = categories[cat_idx].items.remove(item_idx);
                categories[target].items.push(moved);
            }
            Ok(updated)
        })?;

        self.persist()?;
        Ok(updated)
    }

    pub fn add_category(&self, name: &str) -> Result<Eid, ServiceError> {
        let id = self.library.update(|categories| {
            if categories.iter().any(|c| c.name == name) {
                return Err(ServiceError::CategoryExists(name.to_string()));
            }
            let category = Category::new(name);
            let id = category.id.clone();
            categories.push(category);
            Ok(id)
        })?;

        self.persist()?;
        Ok(id)
    }

    /// Remove a category; its records move to the first remaining one.
    /// Deleting the last category drops its records.
    pub fn delete_category(&self, name: &str) -> Result<Category, ServiceError> {
        let removed = self.library.update(|categories| {
            let idx = categories.iter().position(|c| c.name == name)?;
            let mut removed = categories.remove(idx);
            if let Some(first) = categories.first_mut() {
                first.items.append(&mut removed.items);
            } else if !removed.items.is_empty() {
                log::warn!(
                    "dropping {} records with the last category",
                    removed.items.len()
                );
            }
            Some(removed)
        });

        let removed = removed.ok_or_else(|| ServiceError::CategoryNotFound(name.to_string()))?;
        self.persist()?;
        Ok(removed)
    }

    /// Merge imported categories by name, appending their records.
    /// Returns the number of records added.
    pub fn import(&self, imported: Vec<Category>) -> Result<usize, ServiceError> {
        let added = self.library.update(|categories| {
            let mut added = 0;
            for mut incoming in imported {
                added += incoming.items.len();
                match categories.iter_mut().find(|c| c.name == incoming.name) {
                    Some(existing) => existing.items.append(&mut incoming.items),
                    None => categories.push(incoming),
                }
            }
            added
        });

        self.persist()?;
        Ok(added)
    }

    fn persist(&self) -> Result<(), ServiceError> {
        self.library
            .persist(self.store.as_ref())
            .map_err(ServiceError::Storage)
    }
}
