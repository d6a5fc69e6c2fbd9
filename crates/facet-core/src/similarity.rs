//! Descriptor similarity — cosine, distance-derived metrics, and the
//! per-variant dispatch used by the match resolver.

use crate::types::Descriptor;

// Weights of the legacy combined score.
const COSINE_WEIGHT: f32 = 0.5;
const EUCLIDEAN_WEIGHT: f32 = 0.3;
const MANHATTAN_WEIGHT: f32 = 0.2;

/// Cosine similarity in [-1, 1]. Returns 0 when either norm is zero or the
/// lengths differ.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

/// Similarity derived from Euclidean distance: 1 / (1 + ‖a − b‖₂).
pub fn euclidean_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let distance = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt();
    1.0 / (1.0 + distance)
}

/// Similarity derived from Manhattan distance: 1 / (1 + ‖a − b‖₁).
pub fn manhattan_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let distance = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum::<f32>();
    1.0 / (1.0 + distance)
}

/// Weighted combination used for legacy descriptors:
/// 0.5·cosine + 0.3·euclidean + 0.2·manhattan.
pub fn combined(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    COSINE_WEIGHT * cosine(a, b)
        + EUCLIDEAN_WEIGHT * euclidean_similarity(a, b)
        + MANHATTAN_WEIGHT * manhattan_similarity(a, b)
}

/// Similarity between two descriptors, dispatched on variant.
///
/// Legacy pairs use the weighted combination; embedding pairs use cosine
/// alone (pre-normalized, so the dot product already is the cosine).
/// Mismatched variants score 0 — never an error, which keeps the gallery
/// scan loop branch-free.
pub fn score(a: &Descriptor, b: &Descriptor) -> f32 {
    match (a, b) {
        (Descriptor::Legacy(x), Descriptor::Legacy(y)) => combined(x, y),
        (Descriptor::Embedding(x), Descriptor::Embedding(y)) => cosine(x, y),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EMBEDDING_DIM, LEGACY_DIM};

    fn embedding_axis(axis: usize) -> Descriptor {
        let mut values = vec![0.0f32; EMBEDDING_DIM];
        values[axis] = 1.0;
        Descriptor::Embedding(values)
    }

    #[test]
    fn test_cosine_identical() {
        let v = [1.0, 2.0, 3.0];
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        assert!((cosine(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_norm() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_euclidean_similarity_identical_is_one() {
        let v = [1.0, -2.0, 0.5];
        assert!((euclidean_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_similarity_known_distance() {
        // Distance 5 → similarity 1/6.
        let sim = euclidean_similarity(&[0.0, 0.0], &[3.0, 4.0]);
        assert!((sim - 1.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_manhattan_similarity_known_distance() {
        // L1 distance 7 → similarity 1/8.
        let sim = manhattan_similarity(&[0.0, 0.0], &[3.0, 4.0]);
        assert!((sim - 1.0 / 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_combined_self_similarity_is_maximal() {
        let v: Vec<f32> = (0..LEGACY_DIM).map(|i| (i as f32 * 0.37).sin()).collect();
        let sim = combined(&v, &v);
        // cosine 1, euclidean 1, manhattan 1 → 0.5 + 0.3 + 0.2.
        assert!((sim - 1.0).abs() < 1e-5, "self combined = {sim}");
    }

    #[test]
    fn test_combined_symmetry() {
        let a: Vec<f32> = (0..LEGACY_DIM).map(|i| (i as f32 * 0.11).cos()).collect();
        let b: Vec<f32> = (0..LEGACY_DIM).map(|i| (i as f32 * 0.29).sin()).collect();
        assert!((combined(&a, &b) - combined(&b, &a)).abs() < 1e-6);
    }

    #[test]
    fn test_mismatched_lengths_score_zero() {
        assert_eq!(cosine(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(euclidean_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(manhattan_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(combined(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_score_mismatched_variants_is_zero() {
        let legacy = Descriptor::Legacy(vec![1.0; LEGACY_DIM]);
        let embedding = embedding_axis(0);
        assert_eq!(score(&legacy, &embedding), 0.0);
        assert_eq!(score(&embedding, &legacy), 0.0);
    }

    #[test]
    fn test_score_embedding_is_cosine() {
        let a = embedding_axis(0);
        let b = embedding_axis(1);
        assert_eq!(score(&a, &b), 0.0);
        assert!((score(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_score_symmetry_across_variants() {
        let a = Descriptor::Legacy((0..LEGACY_DIM).map(|i| i as f32 * 0.01).collect());
        let b = Descriptor::Legacy((0..LEGACY_DIM).map(|i| (i as f32 * 0.01).sqrt()).collect());
        assert!((score(&a, &b) - score(&b, &a)).abs() < 1e-6);
    }
}
