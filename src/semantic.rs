//! Local embeddings for clause retrieval: hashed word and bigram features projected into a
//! fixed number of signed buckets, then L2-normalized.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_MODEL_ID: &str = "hash-bow-384-v1";
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

const NORMALIZATION: &str = "l2";
const BACKEND: &str = "local-feature-hash";
const MIN_DIMENSIONS: usize = 8;
const WORD_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;

/// Identifies the embedding space rows were written in; queries only compare rows of the same
/// model id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticModelConfig {
    pub model_id: String,
    pub dimensions: usize,
    pub normalization: String,
    pub backend: String,
}

pub fn resolve_model_config(model_id: &str) -> SemanticModelConfig {
    let model_id = Some(model_id.trim())
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_MODEL_ID);

    SemanticModelConfig {
        model_id: model_id.to_string(),
        dimensions: DEFAULT_EMBEDDING_DIM,
        normalization: NORMALIZATION.to_string(),
        backend: BACKEND.to_string(),
    }
}

pub fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Hex sha256 of the embedded payload, stored next to the vector.
pub fn payload_fingerprint(payload: &str) -> String {
    format!("{:x}", Sha256::digest(payload.as_bytes()))
}

/// Same text (modulo case and punctuation) always maps to the same vector.
pub fn embed_text_local(payload: &str, dimensions: usize) -> Vec<f32> {
    let dims = dimensions.max(MIN_DIMENSIONS);
    let mut vector = vec![0_f32; dims];

    for (feature, weight) in weighted_features(payload) {
        let digest = Sha256::digest(feature.as_bytes());
        let bucket = u64::from_le_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ]);
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[(bucket % dims as u64) as usize] += sign * weight;
    }

    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|value| *value /= norm);
    }
    vector
}

/// Lowercased alphanumeric words, plus adjacent-word bigrams at a lower weight.
fn weighted_features(payload: &str) -> Vec<(String, f32)> {
    let words = payload
        .split_whitespace()
        .map(|raw| {
            raw.chars()
                .filter(|character| character.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<String>>();

    let bigrams = words
        .windows(2)
        .map(|pair| (format!("{} {}", pair[0], pair[1]), BIGRAM_WEIGHT));

    words
        .iter()
        .map(|word| (word.clone(), WORD_WEIGHT))
        .chain(bigrams)
        .collect()
}

/// Cosine similarity; 0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() {
        return 0.0;
    }

    let (dot, left_sq, right_sq) = left.iter().zip(right).fold(
        (0_f64, 0_f64, 0_f64),
        |(dot, left_sq, right_sq), (l, r)| {
            let (l, r) = (f64::from(*l), f64::from(*r));
            (dot + l * r, left_sq + l * l, right_sq + r * r)
        },
    );
    if left_sq == 0.0 || right_sq == 0.0 {
        return 0.0;
    }

    dot / (left_sq.sqrt() * right_sq.sqrt())
}

/// `1 - cosine`, in `[0, 2]`; lower is closer.
pub fn cosine_distance(left: &[f32], right: &[f32]) -> f64 {
    1.0 - cosine_similarity(left, right)
}

pub fn encode_embedding_blob(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|value| value.to_le_bytes()).collect()
}

/// `None` when the blob does not hold exactly `expected_dim` little-endian f32 values.
pub fn decode_embedding_blob(blob: &[u8], expected_dim: usize) -> Option<Vec<f32>> {
    if expected_dim == 0 || blob.len() != expected_dim.checked_mul(4)? {
        return None;
    }

    blob.chunks_exact(4)
        .map(|chunk| <[u8; 4]>::try_from(chunk).ok().map(f32::from_le_bytes))
        .collect()
}
