use ndarray::Array2;

/// Face template vector, L2-normalized, shape `[1, N]`
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Array2<f32>,
}

impl Embedding {
    /// Build an embedding from raw values, normalizing to unit length.
    ///
    /// Returns `None` when the vector has no energy (all zeros), which can't be compared.
    pub fn from_raw(values: Vec<f32>) -> Option<Self> {
        let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm <= f32::EPSILON {
            return None;
        }
        let len = values.len();
        let normalized = values.into_iter().map(|x| x / norm).collect();
        let vector = Array2::from_shape_vec((1, len), normalized).ok()?;
        Some(Self { vector })
    }

    /// Rebuild from a stored template. Stored templates are already normalized.
    pub fn from_stored(values: &[f32]) -> Self {
        let vector = Array2::from_shape_vec((1, values.len()), values.to_vec())
            .unwrap_or_else(|_| Array2::zeros((1, 0)));
        Self { vector }
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.vector.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }
}

/// Compute cosine similarity between two embeddings
pub fn match_embedding(a: &Embedding, b: &Embedding) -> f32 {
    // Embeddings are L2-normalized, so dot product = cosine similarity
    let dot: f32 = a
        .vector
        .iter()
        .zip(b.vector.iter())
        .map(|(x, y)| x * y)
        .sum();

    dot.clamp(-1.0, 1.0)
}

/// Cosine similarity mapped onto the 0-100 confidence scale used by search floors.
///
/// Anti-correlated faces score 0, never negative.
pub fn similarity_percent(a: &Embedding, b: &Embedding) -> f32 {
    match_embedding(a, b).max(0.0) * 100.0
}
