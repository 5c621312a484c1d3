//! Local semantic indexing and hybrid search.
//!
//! # Architecture
//!
//! - `encoder`: WordPiece tokenizer + ONNX session, text to vector
//! - `pooling`: mean pooling and L2 normalization of the model output
//! - `indexer`: fills in missing record vectors off the interactive path
//! - `ranker`: cosine ranking with substring fallback
//! - `model_files`: model artifacts on disk and their download
//! - `service`: facade tying the above to the shared library and store

mod embedding;
pub mod encoder;
pub mod indexer;
mod model_files;
mod pooling;
pub mod preprocess;
pub mod ranker;
mod service;

pub use embedding::Embedding;
pub use encoder::{EncodeError, OnnxEncoder, TextEncoder};
pub use indexer::{CancelToken, IndexError, Indexer, PassReport, Progress};
pub use model_files::{DownloadError, ModelFiles};
pub use ranker::{Ranked, Ranker, Relevance};
pub use service::{CategoryHits, IndexStatus, SearchHit, SemanticSearchService, ServiceError};

/// Width of every embedding produced by the model.
pub const EMBEDDING_DIM: usize = 384;

/// Subword token budget per encoded text, markers included.
pub const MAX_TOKENS: usize = 256;

/// Default similarity a record must exceed to be shown
pub const DEFAULT_RELEVANCE_THRESHOLD: f32 = 0.3;
