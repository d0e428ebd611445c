//! Vector encoding and similarity.
//!
//! - [`vec_to_blob`] / [`blob_to_vec`]: little-endian `f32` per component,
//!   no header. The blob length (`4 × dims`) is the only integrity check.
//! - [`cosine_similarity`]: dot product over norms, `0.0` when either norm
//!   is zero.
//! - [`SUPPORTED_DIMS`]: the dimensionalities that have a storage partition.

use crate::error::StoreError;

/// Embedding sizes with a storage partition. Any other length is rejected.
pub const SUPPORTED_DIMS: &[usize] = &[384, 768, 1024, 1536, 2048, 3072, 4096, 5120];

pub fn is_supported_dims(dims: usize) -> bool {
    SUPPORTED_DIMS.contains(&dims)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use chat_rag::vector::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob).unwrap(), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Inverse of [`vec_to_blob`]. Fails when the byte length is not a multiple of 4.
pub fn blob_to_vec(blob: &[u8]) -> Result<Vec<f32>, StoreError> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::CorruptVector(format!(
            "blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Cosine of the angle between two embeddings.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, and zero-norm vectors.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, na, nb), (x, y)| {
            (d + x * y, na + x * x, nb + y * y)
        });

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    if sim.is_finite() {
        sim
    } else {
        0.0
    }
}

/// `1 - cosine_similarity`: 0 for identical direction, 2 for opposite.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}
