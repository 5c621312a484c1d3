use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    eid::Eid,
    semantic::{preprocess, Embedding},
    storage::StorageManager,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Link,
    Note,
    Snippet,
    /// Content is an opaque, encrypted payload.
    Password,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Record {
    pub id: Eid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// URL for links, text for everything else.
    pub content: String,
    #[serde(default)]
    pub kind: ItemKind,

    /// Computed from `(title, description)` when the record was indexed.
    /// Not refreshed when the text is edited later.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
}

impl Record {
    pub fn new(title: &str, content: &str, kind: ItemKind) -> Self {
        Self {
            id: Eid::new(),
            title: title.to_string(),
            description: None,
            content: content.to_string(),
            kind,
            embedding: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// The text the indexer embeds for this record.
    pub fn descriptor(&self) -> String {
        preprocess::descriptor(&self.title, self.description.as_deref())
    }

    /// Case-insensitive substring match against title or content.
    pub fn matches_text(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.title.to_lowercase().contains(&query) || self.content.to_lowercase().contains(&query)
    }
}

/// Field changes for an existing record. `None` leaves a field as is; an
/// empty description clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub kind: Option<ItemKind>,
    /// Move the record to this category.
    pub category: Option<String>,
}

impl RecordUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.content.is_none()
            && self.kind.is_none()
            && self.category.is_none()
    }

    /// Apply the field changes. The embedding is left untouched.
    pub fn apply(&self, record: &mut Record) {
        if let Some(title) = &self.title {
            record.title = title.clone();
        }
        if let Some(description) = &self.description {
            record.description = Some(description.clone()).filter(|d| !d.is_empty());
        }
        if let Some(content) = &self.content {
            record.content = content.clone();
        }
        if let Some(kind) = self.kind {
            record.kind = kind;
        }
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Category {
    pub id: Eid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub items: Vec<Record>,
}

impl Category {
    pub fn new(name: &str) -> Self {
        Self {
            id: Eid::new(),
            name: name.to_string(),
            icon: None,
            items: vec![],
        }
    }
}

/// Persistent home of the category list.
///
/// `save_all` replaces the whole collection: records no longer present are
/// removed, everything else is upserted by id.
pub trait RecordStore: Send + Sync {
    fn load_all(&self) -> anyhow::Result<Vec<Category>>;
    fn save_all(&self, categories: &[Category]) -> anyhow::Result<()>;
}

/// JSON document store, one file holding every category.
#[derive(Clone)]
pub struct BackendJson {
    storage: Arc<dyn StorageManager>,
    file_name: String,
}

impl BackendJson {
    pub fn new(storage: Arc<dyn StorageManager>, file_name: &str) -> Self {
        Self {
            storage,
            file_name: file_name.to_string(),
        }
    }
}

impl RecordStore for BackendJson {
    fn load_all(&self) -> anyhow::Result<Vec<Category>> {
        if !self.storage.exists(&self.file_name) {
            log::info!("no {} yet, starting empty", self.file_name);
            return Ok(vec![]);
        }

        let data = self.storage.read(&self.file_name)?;
        let categories: Vec<Category> = serde_json::from_slice(&data)?;
        Ok(categories)
    }

    fn save_all(&self, categories: &[Category]) -> anyhow::Result<()> {
        let data = serde_json::to_vec_pretty(categories)?;
        self.storage.write(&self.file_name, &data)?;
        log::debug!("saved {} categories to {}", categories.len(), self.file_name);
        Ok(())
    }
}
