//! Text encoder: WordPiece tokenization plus ONNX Runtime inference.
//!
//! `OnnxEncoder` loads a sentence-transformer export (e.g. all-MiniLM-L6-v2)
//! and its `vocab.txt`. Loading is lazy and never fails construction: with
//! artifacts missing the encoder stays unavailable and every call returns
//! the zero fallback vector. Once the files appear on disk the next probe
//! loads them. The ONNX Runtime library is opened at the same point, so a
//! host without it degrades to unavailable as well.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use ndarray::{Array2, ArrayView2};
use ort::session::Session;
use ort::value::TensorRef;
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::processors::bert::BertProcessing;
use tokenizers::{Model, Tokenizer, TruncationParams};

use super::model_files::ModelFiles;
use super::pooling::{pool_and_normalize, PoolingError};
use super::{Embedding, EMBEDDING_DIM};

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Model output has hidden size {got}, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Unexpected model output shape: {0:?}")]
    OutputShape(Vec<i64>),

    #[error("Pooling failed: {0}")]
    Pooling(#[from] PoolingError),

    #[error("Encoding timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("ONNX Runtime unavailable: {0}")]
    Runtime(String),

    #[error("Model busy for more than {0:?}")]
    Busy(Duration),
}

impl EncodeError {
    /// Errors that mean the model itself is unusable, as opposed to a
    /// single input failing.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EncodeError::DimensionMismatch { .. }
                | EncodeError::OutputShape(_)
                | EncodeError::Timeout(_)
        )
    }
}

/// Turns text into a fixed-length embedding.
pub trait TextEncoder: Send + Sync {
    /// Whether real embeddings can be produced right now.
    fn is_loaded(&self) -> bool;

    /// Encode `text`. Empty or whitespace-only input, or an unavailable
    /// encoder, yields [`Embedding::zeroed`] without touching the model.
    fn encode(&self, text: &str) -> Result<Embedding, EncodeError>;

    /// Encode a search query. Implementations that serialize model access
    /// may give up with [`EncodeError::Busy`] instead of queueing behind a
    /// long-running call.
    fn encode_query(&self, text: &str) -> Result<Embedding, EncodeError> {
        self.encode(text)
    }
}

/// Model inputs for a single sequence (batch size 1).
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizedInput {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
}

impl TokenizedInput {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }
}

/// BERT-style WordPiece tokenizer built from a `vocab.txt` table.
pub struct WordPieceTokenizer {
    inner: Tokenizer,
}

impl WordPieceTokenizer {
    /// Build from a vocabulary file, truncating to `max_tokens` including
    /// the `[CLS]`/`[SEP]` markers.
    pub fn from_vocab(vocab_path: &Path, max_tokens: usize) -> Result<Self, EncodeError> {
        let vocab_path = vocab_path
            .to_str()
            .ok_or_else(|| EncodeError::Tokenization("vocab path is not valid UTF-8".into()))?;

        let wordpiece = WordPiece::from_file(vocab_path)
            .unk_token("[UNK]".to_string())
            .build()
            .map_err(|e| EncodeError::Tokenization(format!("load vocab: {e}")))?;

        let special = |token: &str| {
            wordpiece
                .token_to_id(token)
                .ok_or_else(|| EncodeError::Tokenization(format!("vocab has no {token} token")))
        };
        let cls_id = special("[CLS]")?;
        let sep_id = special("[SEP]")?;

        let mut inner = Tokenizer::new(wordpiece);
        inner
            .with_normalizer(Some(BertNormalizer::default()))
            .with_pre_tokenizer(Some(BertPreTokenizer))
            .with_post_processor(Some(BertProcessing::new(
                ("[SEP]".to_string(), sep_id),
                ("[CLS]".to_string(), cls_id),
            )));
        inner
            .with_truncation(Some(TruncationParams {
                max_length: max_tokens,
                ..Default::default()
            }))
            .map_err(|e| EncodeError::Tokenization(format!("truncation: {e}")))?;

        Ok(Self { inner })
    }

    /// Tokenize into ids, an all-ones attention mask and all-zero segment
    /// ids. No padding is ever added.
    pub fn tokenize(&self, text: &str) -> Result<TokenizedInput, EncodeError> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| EncodeError::Tokenization(e.to_string()))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let len = input_ids.len();

        Ok(TokenizedInput {
            input_ids,
            attention_mask: vec![1; len],
            token_type_ids: vec![0; len],
        })
    }
}

struct LoadedModel {
    session: Session,
    tokenizer: WordPieceTokenizer,
}

enum LoadState {
    /// Artifacts not on disk yet; retried on the next probe.
    Missing,
    /// Artifacts present but unusable; not retried.
    Failed,
    Ready(Box<LoadedModel>),
}

/// How long a query waits for the model before falling back.
const DEFAULT_QUERY_WAIT: Duration = Duration::from_secs(2);

const RUNTIME_PATH_ENV: &str = "ORT_DYLIB_PATH";

#[cfg(target_os = "windows")]
const DEFAULT_RUNTIME: &str = "onnxruntime.dll";
#[cfg(target_os = "macos")]
const DEFAULT_RUNTIME: &str = "libonnxruntime.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const DEFAULT_RUNTIME: &str = "libonnxruntime.so";

/// ONNX Runtime-backed encoder.
pub struct OnnxEncoder {
    files: ModelFiles,
    max_tokens: usize,
    runtime: Option<PathBuf>,
    query_wait: Duration,
    state: Mutex<LoadState>,
}

impl std::fmt::Debug for OnnxEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEncoder")
            .field("model_dir", &self.files.dir())
            .field("max_tokens", &self.max_tokens)
            .field("runtime", &self.runtime)
            .finish()
    }
}

impl OnnxEncoder {
    /// Nothing is read from disk until the first `is_loaded` or `encode`.
    pub fn new(files: ModelFiles, max_tokens: usize) -> Self {
        Self {
            files,
            max_tokens,
            runtime: None,
            query_wait: DEFAULT_QUERY_WAIT,
            state: Mutex::new(LoadState::Missing),
        }
    }

    pub fn with_query_wait(mut self, wait: Duration) -> Self {
        self.query_wait = wait;
        self
    }

    /// Use the ONNX Runtime library at `path` instead of `$ORT_DYLIB_PATH`
    /// or the platform default name.
    pub fn with_runtime(mut self, path: Option<PathBuf>) -> Self {
        self.runtime = path;
        self
    }

    fn runtime_path(&self) -> PathBuf {
        if let Some(path) = &self.runtime {
            return path.clone();
        }
        match std::env::var(RUNTIME_PATH_ENV) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from(DEFAULT_RUNTIME),
        }
    }

    /// Open the runtime library through the fallible entry point. Left to
    /// itself ort opens it on first use and panics when it is missing.
    fn init_runtime(&self) -> Result<(), EncodeError> {
        let path = self.runtime_path();
        let builder = ort::init_from(&path)
            .map_err(|e| EncodeError::Runtime(format!("{}: {e}", path.display())))?;
        if !builder.with_name("linkdeck").commit() {
            log::debug!("ONNX Runtime environment already configured");
        }
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, LoadState> {
        // a panic mid-inference leaves the model itself intact
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Poll for the model lock for at most `wait`.
    fn lock_state_within(&self, wait: Duration) -> Option<MutexGuard<'_, LoadState>> {
        let deadline = Instant::now() + wait;
        loop {
            match self.state.try_lock() {
                Ok(guard) => return Some(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) if Instant::now() >= deadline => return None,
                Err(TryLockError::WouldBlock) => std::thread::sleep(Duration::from_millis(5)),
            }
        }
    }

    fn encode_locked(&self, state: &mut LoadState, text: &str) -> Result<Embedding, EncodeError> {
        if !self.ensure_loaded(state) {
            return Ok(Embedding::zeroed());
        }
        let LoadState::Ready(model) = state else {
            return Ok(Embedding::zeroed());
        };

        let tokens = model.tokenizer.tokenize(text)?;
        run_model(&mut model.session, &tokens).inspect_err(|err| {
            if err.is_fatal() {
                log::error!("embedding model produced unusable output: {err}");
            }
        })
    }

    fn load(&self) -> Result<LoadedModel, EncodeError> {
        let tokenizer = WordPieceTokenizer::from_vocab(&self.files.vocab_path(), self.max_tokens)?;
        self.init_runtime()?;

        let session = Session::builder()
            .map_err(|e| EncodeError::Inference(format!("ONNX session builder: {e}")))?
            .with_intra_threads(1)
            .map_err(|e| EncodeError::Inference(format!("ONNX set threads: {e}")))?
            .commit_from_file(self.files.model_path())
            .map_err(|e| EncodeError::Inference(format!("ONNX load model: {e}")))?;

        log::info!(
            "loaded embedding model from {}",
            self.files.model_path().display()
        );

        Ok(LoadedModel { session, tokenizer })
    }

    fn ensure_loaded(&self, state: &mut LoadState) -> bool {
        match state {
            LoadState::Ready(_) => true,
            LoadState::Failed => false,
            LoadState::Missing => {
                if !self.files.is_downloaded() {
                    log::debug!(
                        "embedding model not found in {}",
                        self.files.dir().display()
                    );
                    return false;
                }
                let loaded = catch_unwind(AssertUnwindSafe(|| self.load())).unwrap_or_else(|_| {
                    Err(EncodeError::Runtime("panicked while loading".to_string()))
                });
                match loaded {
                    Ok(model) => {
                        *state = LoadState::Ready(Box::new(model));
                        true
                    }
                    Err(err) => {
                        log::error!("failed to load embedding model: {err}");
                        *state = LoadState::Failed;
                        false
                    }
                }
            }
        }
    }
}

impl TextEncoder for OnnxEncoder {
    fn is_loaded(&self) -> bool {
        let mut state = self.lock_state();
        self.ensure_loaded(&mut state)
    }

    fn encode(&self, text: &str) -> Result<Embedding, EncodeError> {
        if text.trim().is_empty() {
            return Ok(Embedding::zeroed());
        }

        let mut state = self.lock_state();
        self.encode_locked(&mut state, text)
    }

    fn encode_query(&self, text: &str) -> Result<Embedding, EncodeError> {
        if text.trim().is_empty() {
            return Ok(Embedding::zeroed());
        }

        let mut state = self
            .lock_state_within(self.query_wait)
            .ok_or(EncodeError::Busy(self.query_wait))?;
        self.encode_locked(&mut state, text)
    }
}

fn run_model(session: &mut Session, tokens: &TokenizedInput) -> Result<Embedding, EncodeError> {
    let seq_len = tokens.len();
    let as_matrix = |values: &[i64]| {
        Array2::from_shape_vec((1, seq_len), values.to_vec())
            .map_err(|e| EncodeError::Inference(format!("input array: {e}")))
    };
    let ids_array = as_matrix(&tokens.input_ids)?;
    let mask_array = as_matrix(&tokens.attention_mask)?;
    let type_array = as_matrix(&tokens.token_type_ids)?;

    fn tensor(array: &Array2<i64>) -> Result<TensorRef<'_, i64>, EncodeError> {
        TensorRef::from_array_view(array)
            .map_err(|e| EncodeError::Inference(format!("input tensor: {e}")))
    }

    let outputs = session
        .run(ort::inputs![
            "input_ids" => tensor(&ids_array)?,
            "attention_mask" => tensor(&mask_array)?,
            "token_type_ids" => tensor(&type_array)?
        ])
        .map_err(|e| EncodeError::Inference(format!("ONNX inference failed: {e}")))?;

    // [1, seq_len, hidden]
    let (shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| EncodeError::Inference(format!("extract output: {e}")))?;
    let dims: Vec<i64> = shape.iter().copied().collect();

    let [batch, rows, hidden] = dims[..] else {
        return Err(EncodeError::OutputShape(dims));
    };
    if hidden as usize != EMBEDDING_DIM {
        return Err(EncodeError::DimensionMismatch {
            expected: EMBEDDING_DIM,
            got: hidden.max(0) as usize,
        });
    }
    if batch != 1 || rows as usize != seq_len {
        return Err(EncodeError::OutputShape(dims));
    }

    let token_vectors = ArrayView2::from_shape((seq_len, EMBEDDING_DIM), data)
        .map_err(|_| EncodeError::OutputShape(dims.clone()))?;

    Ok(pool_and_normalize(token_vectors)?)
}
