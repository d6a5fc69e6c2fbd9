use facet_core::{MatchPolicy, QualityPolicy, VariantPolicy};
use std::path::PathBuf;

/// Pipeline configuration, loaded from environment variables.
///
/// Every tuning knob of the recognition pipeline is exposed here — none of
/// the thresholds or adjustment magnitudes are hardcoded at call sites.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite gallery database.
    pub db_path: PathBuf,
    /// Path to the embedding ONNX model. `None` disables the embedding path
    /// and the pipeline runs on the legacy descriptor codec alone.
    pub embed_model_path: Option<PathBuf>,
    /// Recognition threshold for legacy descriptors.
    pub legacy_threshold: f32,
    /// Recognition threshold for deep embeddings.
    pub embedding_threshold: f32,
    /// Same-angle boost / cross-angle penalty, legacy path.
    pub legacy_same_angle_boost: f32,
    pub legacy_cross_angle_penalty: f32,
    /// Same-angle boost / cross-angle penalty, embedding path.
    pub embedding_same_angle_boost: f32,
    pub embedding_cross_angle_penalty: f32,
    /// Minimum population variance for a legacy descriptor to pass quality.
    pub min_legacy_variance: f32,
    /// Embedding L2-norm acceptance band.
    pub embedding_norm_min: f32,
    pub embedding_norm_max: f32,
}

impl Config {
    /// Load configuration from `FACET_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facet");

        let db_path = std::env::var("FACET_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("gallery.db"));

        let defaults = MatchPolicy::default();
        let quality = QualityPolicy::default();

        Self {
            db_path,
            embed_model_path: std::env::var("FACET_EMBED_MODEL").ok().map(PathBuf::from),
            legacy_threshold: env_f32("FACET_LEGACY_THRESHOLD", defaults.legacy.threshold),
            embedding_threshold: env_f32("FACET_EMBEDDING_THRESHOLD", defaults.embedding.threshold),
            legacy_same_angle_boost: env_f32(
                "FACET_LEGACY_SAME_ANGLE_BOOST",
                defaults.legacy.same_angle_boost,
            ),
            legacy_cross_angle_penalty: env_f32(
                "FACET_LEGACY_CROSS_ANGLE_PENALTY",
                defaults.legacy.cross_angle_penalty,
            ),
            embedding_same_angle_boost: env_f32(
                "FACET_EMBEDDING_SAME_ANGLE_BOOST",
                defaults.embedding.same_angle_boost,
            ),
            embedding_cross_angle_penalty: env_f32(
                "FACET_EMBEDDING_CROSS_ANGLE_PENALTY",
                defaults.embedding.cross_angle_penalty,
            ),
            min_legacy_variance: env_f32("FACET_MIN_LEGACY_VARIANCE", quality.min_legacy_variance),
            embedding_norm_min: env_f32("FACET_EMBEDDING_NORM_MIN", quality.embedding_norm_min),
            embedding_norm_max: env_f32("FACET_EMBEDDING_NORM_MAX", quality.embedding_norm_max),
        }
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            legacy: VariantPolicy {
                threshold: self.legacy_threshold,
                same_angle_boost: self.legacy_same_angle_boost,
                cross_angle_penalty: self.legacy_cross_angle_penalty,
            },
            embedding: VariantPolicy {
                threshold: self.embedding_threshold,
                same_angle_boost: self.embedding_same_angle_boost,
                cross_angle_penalty: self.embedding_cross_angle_penalty,
            },
        }
    }

    pub fn quality_policy(&self) -> QualityPolicy {
        QualityPolicy {
            min_legacy_variance: self.min_legacy_variance,
            embedding_norm_min: self.embedding_norm_min,
            embedding_norm_max: self.embedding_norm_max,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policies_reflect_fields() {
        let mut config = Config::from_env();
        config.legacy_threshold = 0.5;
        config.embedding_norm_min = 0.8;
        config.embedding_norm_max = 1.2;

        assert_eq!(config.match_policy().legacy.threshold, 0.5);
        let quality = config.quality_policy();
        assert_eq!(quality.embedding_norm_min, 0.8);
        assert_eq!(quality.embedding_norm_max, 1.2);
    }

    #[test]
    fn test_defaults_match_core_policies() {
        let config = Config::from_env();
        // Env-free defaults must agree with the core policy constants.
        assert_eq!(config.match_policy(), MatchPolicy::default());
        assert_eq!(config.quality_policy(), QualityPolicy::default());
    }
}
