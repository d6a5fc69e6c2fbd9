//! Enrollment completeness tracking over the five canonical head angles.
//!
//! Completion is defined purely by set coverage: capture order and repeated
//! captures of the same angle do not matter.

use crate::types::AngleClass;
use std::collections::BTreeSet;

/// Canonical capture angles in fixed enumeration order. The next-required
/// angle is always the first of these not yet captured.
pub const CANONICAL_ANGLES: [AngleClass; 5] = [
    AngleClass::Frontal,
    AngleClass::LeftProfile,
    AngleClass::RightProfile,
    AngleClass::UpAngle,
    AngleClass::DownAngle,
];

/// First canonical angle not yet captured, or `None` when all five are.
pub fn next_required_angle(captured: &BTreeSet<AngleClass>) -> Option<AngleClass> {
    CANONICAL_ANGLES.iter().copied().find(|a| !captured.contains(a))
}

/// Fraction of canonical angles captured, in [0, 1].
pub fn progress(captured: &BTreeSet<AngleClass>) -> f32 {
    let covered = CANONICAL_ANGLES.iter().filter(|a| captured.contains(a)).count();
    covered as f32 / CANONICAL_ANGLES.len() as f32
}

pub fn is_complete(captured: &BTreeSet<AngleClass>) -> bool {
    CANONICAL_ANGLES.iter().all(|a| captured.contains(a))
}

/// Human-readable capture instruction for a target angle.
pub fn instruction(angle: AngleClass) -> &'static str {
    match angle {
        AngleClass::Frontal => "Look straight at the camera",
        AngleClass::LeftProfile => "Turn your head to the left",
        AngleClass::RightProfile => "Turn your head to the right",
        AngleClass::UpAngle => "Tilt your head up",
        AngleClass::DownAngle => "Tilt your head down",
        AngleClass::MixedAngle => "Hold your head steady",
    }
}
