//! Fixed-length embedding vectors and the similarity math over them.

use serde::{Deserialize, Serialize};

use super::EMBEDDING_DIM;

/// A 384-wide embedding.
///
/// Either L2-normalized (norm ≈ 1.0) or the all-zero fallback returned when
/// encoding is impossible. The fallback has no direction and is never
/// scored as a similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding(Box<[f32]>);

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding must have {expected} components, got {got}")]
    Length { expected: usize, got: usize },
}

impl Embedding {
    /// The all-zero fallback vector.
    pub fn zeroed() -> Self {
        Self(vec![0.0; EMBEDDING_DIM].into_boxed_slice())
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn norm(&self) -> f32 {
        l2_norm(&self.0)
    }

    /// True for the zero-norm fallback.
    pub fn is_fallback(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    pub fn cosine(&self, other: &Embedding) -> f32 {
        cosine_similarity(&self.0, &other.0)
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = EmbeddingError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        if values.len() != EMBEDDING_DIM {
            return Err(EmbeddingError::Length {
                expected: EMBEDDING_DIM,
                got: values.len(),
            });
        }
        Ok(Self(values.into_boxed_slice()))
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.0.into_vec()
    }
}

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity in [-1, 1].
///
/// Returns 0.0 when the lengths differ or either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}
