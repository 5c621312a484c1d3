//! Cross-module tests and the in-process doubles they share.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::records::{Category, ItemKind, Record, RecordStore};
use crate::semantic::{EncodeError, Embedding, TextEncoder, EMBEDDING_DIM};

mod service;

/// Unit vector with the given weighted components.
pub fn vector(components: &[(usize, f32)]) -> Embedding {
    let mut values = vec![0.0; EMBEDDING_DIM];
    for &(idx, weight) in components {
        values[idx] += weight;
    }
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter_mut().for_each(|v| *v /= norm);
    }
    Embedding::try_from(values).unwrap()
}

/// Bag-of-words vector: every lowercase word lands in a hashed bucket.
pub fn bag_of_words(text: &str) -> Embedding {
    let components: Vec<(usize, f32)> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            ((hasher.finish() % EMBEDDING_DIM as u64) as usize, 1.0)
        })
        .collect();
    vector(&components)
}

type EncodeHook = Box<dyn Fn(&str) + Send + Sync>;

/// Deterministic encoder built on [`bag_of_words`].
///
/// Texts containing a configured marker fail, return the fallback vector,
/// or report a dimension mismatch.
#[derive(Default)]
pub struct HashEncoder {
    unavailable: bool,
    calls: AtomicUsize,
    fail_on: Option<String>,
    fatal_on: Option<String>,
    fallback_on: Option<String>,
    delay: Option<Duration>,
    hook: Option<EncodeHook>,
}

impl HashEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_on = Some(marker.to_string());
        self
    }

    pub fn fatal_on(mut self, marker: &str) -> Self {
        self.fatal_on = Some(marker.to_string());
        self
    }

    pub fn fallback_on(mut self, marker: &str) -> Self {
        self.fallback_on = Some(marker.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Run `hook` at the start of every encode call.
    pub fn with_hook(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn contains(marker: &Option<String>, text: &str) -> bool {
    marker.as_deref().is_some_and(|marker| text.contains(marker))
}

impl TextEncoder for HashEncoder {
    fn is_loaded(&self) -> bool {
        !self.unavailable
    }

    fn encode(&self, text: &str) -> Result<Embedding, EncodeError> {
        if self.unavailable || text.trim().is_empty() {
            return Ok(Embedding::zeroed());
        }

        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.hook {
            hook(text);
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        if contains(&self.fail_on, text) {
            return Err(EncodeError::Inference("synthetic failure".to_string()));
        }
        if contains(&self.fatal_on, text) {
            return Err(EncodeError::DimensionMismatch {
                expected: EMBEDDING_DIM,
                got: 768,
            });
        }
        if contains(&self.fallback_on, text) {
            return Ok(Embedding::zeroed());
        }

        Ok(bag_of_words(text))
    }
}

/// Encoder answering from a fixed table; unknown texts get the fallback.
#[derive(Default)]
pub struct FixedEncoder {
    table: HashMap<String, Embedding>,
    calls: AtomicUsize,
}

impl FixedEncoder {
    pub fn new(entries: impl IntoIterator<Item = (&'static str, Embedding)>) -> Self {
        Self {
            table: entries
                .into_iter()
                .map(|(text, embedding)| (text.to_string(), embedding))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextEncoder for FixedEncoder {
    fn is_loaded(&self) -> bool {
        true
    }

    fn encode(&self, text: &str) -> Result<Embedding, EncodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .table
            .get(text)
            .cloned()
            .unwrap_or_else(Embedding::zeroed))
    }
}

/// In-memory store that counts writes.
#[derive(Default)]
pub struct MemoryStore {
    categories: Mutex<Vec<Category>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn with(categories: Vec<Category>) -> Self {
        Self {
            categories: Mutex::new(categories),
            ..Self::default()
        }
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn stored(&self) -> Vec<Category> {
        self.categories.lock().unwrap().clone()
    }
}

impl RecordStore for MemoryStore {
    fn load_all(&self) -> anyhow::Result<Vec<Category>> {
        Ok(self.stored())
    }

    fn save_all(&self, categories: &[Category]) -> anyhow::Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.categories.lock().unwrap() = categories.to_vec();
        Ok(())
    }
}

pub fn link(title: &str, description: &str, url: &str) -> Record {
    Record::new(title, url, ItemKind::Link).with_description(description)
}

/// A record that already carries the vector its descriptor encodes to.
pub fn embedded(mut record: Record) -> Record {
    record.embedding = Some(bag_of_words(&record.descriptor()));
    record
}

pub fn category(name: &str, items: Vec<Record>) -> Category {
    let mut category = Category::new(name);
    category.items = items;
    category
}

/// Every record in storage order.
pub fn flatten(categories: &[Category]) -> Vec<Record> {
    categories
        .iter()
        .flat_map(|category| category.items.iter().cloned())
        .collect()
}
