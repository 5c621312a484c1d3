//! Hybrid ranking: cosine similarity where a vector exists, substring
//! matching where it does not.

use std::fmt::Display;
use std::sync::Arc;

use rayon::prelude::*;

use crate::records::{Category, Record};

use super::encoder::TextEncoder;
use super::{Embedding, DEFAULT_RELEVANCE_THRESHOLD};

/// Display annotation attached to a ranked record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Relevance {
    /// Text mode, no ranking happened.
    None,
    /// Semantic mode with an empty query.
    Active,
    /// Cosine similarity against the record's vector.
    Similarity(f32),
    /// The record had no usable vector and matched literally.
    TextMatch,
}

impl Display for Relevance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Relevance::None => Ok(()),
            Relevance::Active => write!(f, "AI Active"),
            Relevance::Similarity(score) => write!(f, "{}% Match", (score * 100.0).round() as i64),
            Relevance::TextMatch => write!(f, "Text Match"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ranked<'a> {
    pub record: &'a Record,
    pub score: f32,
    pub relevance: Relevance,
}

impl Ranked<'_> {
    pub fn label(&self) -> String {
        self.relevance.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct RankedCategory<'a> {
    pub category: &'a Category,
    pub records: Vec<Ranked<'a>>,
}

/// The query's vector, computed once per ranking call.
enum QueryVector {
    Browse,
    Vector(Embedding),
    Unavailable,
}

/// A query with its vector already computed, so ranking itself never waits
/// on the model.
pub struct PreparedQuery {
    text: String,
    vector: Option<QueryVector>,
}

pub struct Ranker {
    encoder: Arc<dyn TextEncoder>,
    threshold: f32,
}

impl Ranker {
    pub fn new(encoder: Arc<dyn TextEncoder>) -> Self {
        Self {
            encoder,
            threshold: DEFAULT_RELEVANCE_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Rank `records` in a single category-free list.
    pub fn rank<'a>(&self, records: &'a [Record], query: &str, semantic: bool) -> Vec<Ranked<'a>> {
        if !semantic {
            return text_filter(records.iter(), query);
        }

        let query_vector = self.query_vector(query);
        self.rank_semantic(records, query, &query_vector)
    }

    /// Rank every category and keep the ones with at least one surviving
    /// record, in storage order.
    pub fn rank_categories<'a>(
        &self,
        categories: &'a [Category],
        query: &str,
        semantic: bool,
    ) -> Vec<RankedCategory<'a>> {
        self.rank_prepared(categories, &self.prepare(query, semantic))
    }

    /// Embed the query (semantic mode only) ahead of ranking.
    pub fn prepare(&self, query: &str, semantic: bool) -> PreparedQuery {
        PreparedQuery {
            text: query.to_string(),
            vector: semantic.then(|| self.query_vector(query)),
        }
    }

    pub fn rank_prepared<'a>(
        &self,
        categories: &'a [Category],
        query: &PreparedQuery,
    ) -> Vec<RankedCategory<'a>> {
        categories
            .iter()
            .filter_map(|category| {
                let records = match &query.vector {
                    Some(vector) => self.rank_semantic(&category.items, &query.text, vector),
                    None => text_filter(category.items.iter(), &query.text),
                };
                (!records.is_empty()).then_some(RankedCategory { category, records })
            })
            .collect()
    }

    fn query_vector(&self, query: &str) -> QueryVector {
        if query.trim().is_empty() {
            return QueryVector::Browse;
        }

        match self.encoder.encode_query(query) {
            Ok(embedding) if !embedding.is_fallback() => QueryVector::Vector(embedding),
            Ok(_) => QueryVector::Unavailable,
            Err(err) => {
                log::warn!("failed to embed query, using text matching: {err}");
                QueryVector::Unavailable
            }
        }
    }

    fn rank_semantic<'a>(
        &self,
        records: &'a [Record],
        query: &str,
        query_vector: &QueryVector,
    ) -> Vec<Ranked<'a>> {
        let mut ranked: Vec<Ranked<'a>> = match query_vector {
            QueryVector::Browse => {
                return records
                    .iter()
                    .map(|record| Ranked {
                        record,
                        score: 1.0,
                        relevance: Relevance::Active,
                    })
                    .collect();
            }
            QueryVector::Vector(vector) => records
                .par_iter()
                .map(|record| score_record(record, query, Some(vector)))
                .collect(),
            QueryVector::Unavailable => records
                .iter()
                .map(|record| score_record(record, query, None))
                .collect(),
        };

        ranked.retain(|hit| hit.score > self.threshold);
        // stable: ties keep storage order
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }
}

fn score_record<'a>(record: &'a Record, query: &str, query_vector: Option<&Embedding>) -> Ranked<'a> {
    match (query_vector, &record.embedding) {
        (Some(query_vector), Some(embedding)) if !embedding.is_fallback() => {
            let score = query_vector.cosine(embedding);
            Ranked {
                record,
                score,
                relevance: Relevance::Similarity(score),
            }
        }
        _ => Ranked {
            record,
            score: if record.matches_text(query) { 1.0 } else { 0.0 },
            relevance: Relevance::TextMatch,
        },
    }
}

fn text_filter<'a>(records: impl Iterator<Item = &'a Record>, query: &str) -> Vec<Ranked<'a>> {
    records
        .filter(|record| query.is_empty() || record.matches_text(query))
        .map(|record| Ranked {
            record,
            score: 0.0,
            relevance: Relevance::None,
        })
        .collect()
}
