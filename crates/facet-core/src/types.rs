use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Legacy descriptor length: 256 LBP bins + 144 HOG features + 20 geometric ratios.
pub const LEGACY_DIM: usize = 420;
/// Deep-embedding descriptor length (L2-normalized).
pub const EMBEDDING_DIM: usize = 512;

/// Head pose in degrees, as reported by the external detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceAngle {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl FaceAngle {
    pub fn new(yaw: f32, pitch: f32, roll: f32) -> Self {
        Self { yaw, pitch, roll }
    }

    /// Discretize into an [`AngleClass`] bucket.
    ///
    /// Yaw wins over pitch when both exceed the frontal band, matching the
    /// enrollment capture order (profiles before up/down).
    pub fn class(&self) -> AngleClass {
        if self.yaw.abs() < 15.0 && self.pitch.abs() < 15.0 {
            AngleClass::Frontal
        } else if self.yaw > 15.0 {
            AngleClass::RightProfile
        } else if self.yaw < -15.0 {
            AngleClass::LeftProfile
        } else if self.pitch > 15.0 {
            AngleClass::UpAngle
        } else if self.pitch < -15.0 {
            AngleClass::DownAngle
        } else {
            AngleClass::MixedAngle
        }
    }

    /// Poses beyond these bounds are too extreme for reliable extraction.
    pub fn is_valid(&self) -> bool {
        self.yaw.abs() < 60.0 && self.pitch.abs() < 45.0
    }
}

/// Discretized head-pose bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleClass {
    Frontal,
    LeftProfile,
    RightProfile,
    UpAngle,
    DownAngle,
    MixedAngle,
}

impl AngleClass {
    /// Stable string form used by the gallery store.
    pub fn as_str(&self) -> &'static str {
        match self {
            AngleClass::Frontal => "frontal",
            AngleClass::LeftProfile => "left_profile",
            AngleClass::RightProfile => "right_profile",
            AngleClass::UpAngle => "up_angle",
            AngleClass::DownAngle => "down_angle",
            AngleClass::MixedAngle => "mixed_angle",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "frontal" => Some(AngleClass::Frontal),
            "left_profile" => Some(AngleClass::LeftProfile),
            "right_profile" => Some(AngleClass::RightProfile),
            "up_angle" => Some(AngleClass::UpAngle),
            "down_angle" => Some(AngleClass::DownAngle),
            "mixed_angle" => Some(AngleClass::MixedAngle),
            _ => None,
        }
    }
}

impl std::fmt::Display for AngleClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 2D landmark point in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Face bounding box in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

// Landmark indices. The geometric feature code depends on this fixed ordering;
// detectors that report fewer points must still respect it for the points they
// do report.
pub const LM_LEFT_EYE: usize = 0;
pub const LM_RIGHT_EYE: usize = 1;
pub const LM_NOSE: usize = 2;
pub const LM_MOUTH_LEFT: usize = 3;
pub const LM_MOUTH_RIGHT: usize = 4;
pub const LM_MOUTH_BOTTOM: usize = 5;
pub const LM_LEFT_CHEEK: usize = 6;
pub const LM_RIGHT_CHEEK: usize = 7;

/// Maximum number of named landmark points.
pub const LM_COUNT: usize = 8;

/// Ordered landmark points with their bounding box and detector confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Landmarks {
    /// Up to [`LM_COUNT`] points in the fixed `LM_*` ordering.
    pub points: Vec<Point>,
    pub bounding_box: BoundingBox,
    pub confidence: f32,
}

impl Landmarks {
    /// Landmarks with no points — geometric features degrade to zeros.
    pub fn empty(bounding_box: BoundingBox) -> Self {
        Self {
            points: Vec::new(),
            bounding_box,
            confidence: 0.0,
        }
    }

    pub fn point(&self, index: usize) -> Option<Point> {
        self.points.get(index).copied()
    }
}

/// Which descriptor family a vector belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorVariant {
    /// Hand-engineered LBP + HOG + geometric, 420 values.
    Legacy,
    /// Deep embedding, 512 values, L2-normalized.
    Embedding,
}

/// A fixed-length face descriptor.
///
/// The two variants are disjoint by dimensionality and are never compared
/// against each other; carrying the variant in the type centralizes the
/// per-family threshold and adjustment constants instead of branching on raw
/// lengths at every call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Descriptor {
    Legacy(Vec<f32>),
    Embedding(Vec<f32>),
}

impl Descriptor {
    /// Classify a raw float vector by its length.
    ///
    /// Returns `None` for lengths that are neither of the two known sizes —
    /// such vectors must not enter the gallery.
    pub fn from_values(values: Vec<f32>) -> Option<Self> {
        match values.len() {
            LEGACY_DIM => Some(Descriptor::Legacy(values)),
            EMBEDDING_DIM => Some(Descriptor::Embedding(values)),
            _ => None,
        }
    }

    pub fn variant(&self) -> DescriptorVariant {
        match self {
            Descriptor::Legacy(_) => DescriptorVariant::Legacy,
            Descriptor::Embedding(_) => DescriptorVariant::Embedding,
        }
    }

    pub fn values(&self) -> &[f32] {
        match self {
            Descriptor::Legacy(v) | Descriptor::Embedding(v) => v,
        }
    }

    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }
}

/// One enrolled capture: an identity's descriptor at a specific pose.
///
/// Records are immutable once written and removed only when their identity
/// is deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryRecord {
    pub identity_id: String,
    pub angle_class: AngleClass,
    pub descriptor: Descriptor,
    /// Detector confidence of the enrolled capture.
    pub confidence: f32,
    pub captured_at: DateTime<Utc>,
}

/// An enrolled person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    /// Canonical angle classes with at least one capture.
    pub captured_angles: std::collections::BTreeSet<AngleClass>,
    /// True iff all five canonical angles have been captured.
    pub is_complete: bool,
}

/// A positive recognition. Ephemeral — produced per frame, never persisted
/// by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub identity_id: String,
    pub display_name: String,
    /// Clamped to [0, 1].
    pub confidence: f32,
    /// Angle class of the gallery record that produced the best score.
    pub matched_angle: AngleClass,
    pub timestamp: DateTime<Utc>,
}

/// A face as delivered by the external detector: crop plus metadata.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bounding_box: BoundingBox,
    pub landmarks: Landmarks,
    pub angle: FaceAngle,
    pub confidence: f32,
    /// Cropped face region (RGB).
    pub crop: RgbImage,
}

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("detector failed: {0}")]
    Failed(String),
}

/// External face detection seam.
///
/// Detection and landmark localization are provided by a collaborator
/// (platform ML stack, ONNX model, test stub); the pipeline only depends on
/// this contract.
pub trait FaceDetector: Send {
    /// Detect faces in a full frame, best face first.
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, DetectError>;
}
