//! Match resolver — linear gallery scan with angle-aware score adjustment.
//!
//! Recognition accuracy is angle-sensitive: descriptors encode
//! pose-dependent appearance, so same-angle comparisons are inherently more
//! reliable. The resolver biases scores accordingly before the threshold
//! gate.

use crate::similarity;
use crate::types::{AngleClass, Descriptor, DescriptorVariant, GalleryRecord, RecognitionResult};
use chrono::Utc;

/// Threshold and angle-adjustment constants for one descriptor family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariantPolicy {
    /// Minimum adjusted score for a positive match (exclusive).
    pub threshold: f32,
    /// Added when the gallery record's angle class equals the query's.
    pub same_angle_boost: f32,
    /// Subtracted when the angle classes differ.
    pub cross_angle_penalty: f32,
}

/// Per-variant match policy. Embedding thresholds are higher because deep
/// embeddings are assumed higher-fidelity than the hand-engineered
/// descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    pub legacy: VariantPolicy,
    pub embedding: VariantPolicy,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            legacy: VariantPolicy {
                threshold: 0.65,
                same_angle_boost: 0.15,
                cross_angle_penalty: 0.10,
            },
            embedding: VariantPolicy {
                threshold: 0.75,
                same_angle_boost: 0.05,
                cross_angle_penalty: 0.02,
            },
        }
    }
}

impl MatchPolicy {
    pub fn for_variant(&self, variant: DescriptorVariant) -> &VariantPolicy {
        match variant {
            DescriptorVariant::Legacy => &self.legacy,
            DescriptorVariant::Embedding => &self.embedding,
        }
    }
}

/// One identity's slice of a gallery snapshot.
#[derive(Debug, Clone)]
pub struct GalleryIdentity {
    pub id: String,
    pub display_name: String,
    pub records: Vec<GalleryRecord>,
}

/// A consistent read of the whole gallery. The store guarantees insertion
/// order, which makes the scan below deterministic.
#[derive(Debug, Clone, Default)]
pub struct GallerySnapshot {
    pub identities: Vec<GalleryIdentity>,
}

impl GallerySnapshot {
    pub fn is_empty(&self) -> bool {
        self.identities.iter().all(|i| i.records.is_empty())
    }
}

/// Scan the gallery for the best adjusted match to a query descriptor.
///
/// Every record is scored via the variant-appropriate similarity, adjusted
/// by the angle boost/penalty, and the single best candidate is tracked
/// across the whole scan. Equal adjusted scores keep the first record seen
/// (strictly-greater comparison over the snapshot's insertion order) — a
/// deliberate, documented tie-break rather than an accident.
///
/// Returns `None` for an empty gallery or a best score at or below the
/// threshold; never an error. Confidence is clamped to [0, 1] before being
/// surfaced.
pub fn resolve(
    query: &Descriptor,
    query_angle: AngleClass,
    gallery: &GallerySnapshot,
    policy: &MatchPolicy,
) -> Option<RecognitionResult> {
    let variant_policy = policy.for_variant(query.variant());

    let mut best_score = f32::NEG_INFINITY;
    let mut best: Option<(&GalleryIdentity, AngleClass)> = None;

    for identity in &gallery.identities {
        for record in &identity.records {
            let raw = similarity::score(query, &record.descriptor);
            let adjusted = if record.angle_class == query_angle {
                raw + variant_policy.same_angle_boost
            } else {
                raw - variant_policy.cross_angle_penalty
            };

            if adjusted > best_score {
                best_score = adjusted;
                best = Some((identity, record.angle_class));
            }
        }
    }

    let (identity, matched_angle) = best?;
    if best_score <= variant_policy.threshold {
        tracing::debug!(
            best_score,
            threshold = variant_policy.threshold,
            candidate = %identity.id,
            "best candidate below recognition threshold"
        );
        return None;
    }

    Some(RecognitionResult {
        identity_id: identity.id.clone(),
        display_name: identity.display_name.clone(),
        confidence: best_score.clamp(0.0, 1.0),
        matched_angle,
        timestamp: Utc::now(),
    })
}
