//! Descriptor quality gate.
//!
//! Rejects degenerate descriptors before they reach the gallery or the
//! matcher: non-finite values for both variants, near-zero variance for
//! legacy descriptors, and out-of-band norms for embeddings.

use crate::types::Descriptor;
use thiserror::Error;

/// Why a descriptor was rejected. Surfaced to callers as a "low quality"
/// signal, distinct from "no match".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QualityDefect {
    #[error("descriptor contains NaN or infinite values")]
    NonFinite,
    #[error("descriptor variance {variance} below floor {floor}")]
    DegenerateVariance { variance: f32, floor: f32 },
    #[error("embedding norm {norm} outside [{min}, {max}]")]
    NormOutOfBand { norm: f32, min: f32, max: f32 },
}

/// Quality gate thresholds. All knobs are configuration, never hardcoded at
/// call sites.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityPolicy {
    /// Legacy descriptors with population variance at or below this floor
    /// are considered flat/degenerate.
    pub min_legacy_variance: f32,
    /// Acceptance band for the L2 norm of an embedding; detects bad
    /// normalization or corrupted inference output.
    pub embedding_norm_min: f32,
    pub embedding_norm_max: f32,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            min_legacy_variance: 0.001,
            embedding_norm_min: 0.9,
            embedding_norm_max: 1.1,
        }
    }
}

impl QualityPolicy {
    /// Check a descriptor, reporting the defect on rejection. No side
    /// effects.
    pub fn assess(&self, descriptor: &Descriptor) -> Result<(), QualityDefect> {
        let values = descriptor.values();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(QualityDefect::NonFinite);
        }

        match descriptor {
            Descriptor::Legacy(values) => {
                let variance = population_variance(values);
                if variance <= self.min_legacy_variance {
                    return Err(QualityDefect::DegenerateVariance {
                        variance,
                        floor: self.min_legacy_variance,
                    });
                }
            }
            Descriptor::Embedding(values) => {
                let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
                if norm < self.embedding_norm_min || norm > self.embedding_norm_max {
                    return Err(QualityDefect::NormOutOfBand {
                        norm,
                        min: self.embedding_norm_min,
                        max: self.embedding_norm_max,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn accepts(&self, descriptor: &Descriptor) -> bool {
        self.assess(descriptor).is_ok()
    }
}

fn population_variance(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EMBEDDING_DIM, LEGACY_DIM};

    fn varied_legacy() -> Descriptor {
        Descriptor::Legacy((0..LEGACY_DIM).map(|i| (i as f32 * 0.13).sin()).collect())
    }

    fn unit_embedding() -> Descriptor {
        let mut values = vec![0.0f32; EMBEDDING_DIM];
        values[7] = 1.0;
        Descriptor::Embedding(values)
    }

    #[test]
    fn test_accepts_varied_legacy() {
        assert!(QualityPolicy::default().accepts(&varied_legacy()));
    }

    #[test]
    fn test_accepts_unit_embedding() {
        assert!(QualityPolicy::default().accepts(&unit_embedding()));
    }

    #[test]
    fn test_rejects_nan_both_variants() {
        let policy = QualityPolicy::default();

        let mut legacy = vec![0.5f32; LEGACY_DIM];
        legacy[3] = f32::NAN;
        assert_eq!(
            policy.assess(&Descriptor::Legacy(legacy)),
            Err(QualityDefect::NonFinite)
        );

        let mut embedding = vec![0.0f32; EMBEDDING_DIM];
        embedding[0] = f32::INFINITY;
        assert_eq!(
            policy.assess(&Descriptor::Embedding(embedding)),
            Err(QualityDefect::NonFinite)
        );
    }

    #[test]
    fn test_rejects_flat_legacy() {
        let flat = Descriptor::Legacy(vec![0.25; LEGACY_DIM]);
        assert!(matches!(
            QualityPolicy::default().assess(&flat),
            Err(QualityDefect::DegenerateVariance { .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_band_norm() {
        let policy = QualityPolicy::default();

        let small = Descriptor::Embedding(vec![0.001; EMBEDDING_DIM]);
        assert!(matches!(
            policy.assess(&small),
            Err(QualityDefect::NormOutOfBand { .. })
        ));

        let large: Vec<f32> = vec![1.0; EMBEDDING_DIM];
        assert!(matches!(
            policy.assess(&Descriptor::Embedding(large)),
            Err(QualityDefect::NormOutOfBand { .. })
        ));
    }

    #[test]
    fn test_wider_band_is_configurable() {
        // Some integrations accept [0.8, 1.2]; the band is a knob, not a fork.
        let policy = QualityPolicy {
            embedding_norm_min: 0.8,
            embedding_norm_max: 1.2,
            ..QualityPolicy::default()
        };
        let mut values = vec![0.0f32; EMBEDDING_DIM];
        values[0] = 0.85;
        assert!(policy.accepts(&Descriptor::Embedding(values.clone())));
        assert!(!QualityPolicy::default().accepts(&Descriptor::Embedding(values)));
    }

    #[test]
    fn test_variance_floor_is_configurable() {
        let strict = QualityPolicy {
            min_legacy_variance: 10.0,
            ..QualityPolicy::default()
        };
        assert!(!strict.accepts(&varied_legacy()));
    }
}
