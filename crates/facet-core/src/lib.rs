//! facet-core — face descriptor extraction and angle-aware matching.
//!
//! Converts detected face regions into fixed-length descriptors — a legacy
//! LBP/HOG/geometric codec or a deep-embedding path — and matches them
//! against a gallery of enrolled captures with per-variant thresholds and
//! angle-aware score adjustment.

pub mod descriptor;
pub mod embedder;
pub mod enrollment;
pub mod matcher;
pub mod quality;
pub mod similarity;
pub mod types;

pub use embedder::{EmbedderError, FaceEmbedder};
pub use matcher::{GalleryIdentity, GallerySnapshot, MatchPolicy, VariantPolicy};
pub use quality::{QualityDefect, QualityPolicy};
pub use types::{
    AngleClass, BoundingBox, Descriptor, DescriptorVariant, DetectError, DetectedFace, FaceAngle,
    FaceDetector, GalleryRecord, Identity, Landmarks, Point, RecognitionResult, EMBEDDING_DIM,
    LEGACY_DIM,
};
