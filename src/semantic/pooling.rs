//! Mean pooling and L2 normalization of raw token-level model output.

use ndarray::{ArrayView2, Axis};

use super::{Embedding, EMBEDDING_DIM};

#[derive(Debug, thiserror::Error)]
pub enum PoolingError {
    #[error("Cannot pool an empty token sequence")]
    EmptySequence,

    #[error("Token vectors must be {expected} wide, got {got}")]
    Width { expected: usize, got: usize },
}

/// Average the per-token vectors (rows) into one vector and L2-normalize it.
///
/// A pooled vector with norm exactly 0 is returned unmodified.
pub fn pool_and_normalize(token_vectors: ArrayView2<'_, f32>) -> Result<Embedding, PoolingError> {
    let width = token_vectors.ncols();
    if width != EMBEDDING_DIM {
        return Err(PoolingError::Width {
            expected: EMBEDDING_DIM,
            got: width,
        });
    }

    let mut pooled = token_vectors
        .mean_axis(Axis(0))
        .ok_or(PoolingError::EmptySequence)?
        .to_vec();

    l2_normalize(&mut pooled);

    Embedding::try_from(pooled).map_err(|_| PoolingError::Width {
        expected: EMBEDDING_DIM,
        got: width,
    })
}

/// Divide every component by the Euclidean norm, unless the norm is 0.
pub fn l2_normalize(values: &mut [f32]) {
    let norm = super::embedding::l2_norm(values);
    if norm > 0.0 {
        for val in values.iter_mut() {
            *val /= norm;
        }
    }
}
