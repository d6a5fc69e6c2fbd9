//! Caller-facing enrollment and recognition sessions.
//!
//! Thin stateful wrappers over [`EngineHandle`] that track what a UI needs
//! between frames: the current target angle and instruction, the captured
//! set and progress for enrollment, and the last outcome and error for
//! recognition.

use crate::engine::{
    CaptureProgress, EngineError, EngineHandle, EnrollOutcome, FrameOutcome, RecognizeOutcome,
};
use facet_core::types::Identity;
use facet_core::{enrollment, AngleClass};
use image::RgbImage;
use std::collections::BTreeSet;

/// Snapshot of an enrollment session for the caller.
#[derive(Debug, Clone)]
pub struct EnrollmentStatus {
    pub identity_id: String,
    pub display_name: String,
    /// First canonical angle still missing, `None` once complete.
    pub target_angle: Option<AngleClass>,
    pub instruction: Option<&'static str>,
    pub captured: BTreeSet<AngleClass>,
    pub progress: f32,
    pub is_complete: bool,
    /// Human-readable reason the last frame was rejected, if it was.
    pub last_error: Option<String>,
}

/// Guides a person through capturing all five canonical angles.
pub struct EnrollmentSession {
    handle: EngineHandle,
    identity: Identity,
    captured: BTreeSet<AngleClass>,
    is_complete: bool,
    last_error: Option<String>,
}

impl EnrollmentSession {
    /// Create the identity and start an enrollment session for it.
    pub async fn begin(handle: EngineHandle, display_name: &str) -> Result<Self, EngineError> {
        let identity = handle.create_identity(display_name.to_string()).await?;
        Ok(Self {
            handle,
            identity,
            captured: BTreeSet::new(),
            is_complete: false,
            last_error: None,
        })
    }

    /// Submit one camera frame. Frames arriving while another is in flight
    /// are dropped, not queued.
    pub async fn submit_frame(
        &mut self,
        frame: RgbImage,
    ) -> Result<FrameOutcome<EnrollOutcome>, EngineError> {
        let outcome = self
            .handle
            .enroll_capture(self.identity.id.clone(), frame)
            .await?;

        if let FrameOutcome::Processed(processed) = &outcome {
            match processed {
                EnrollOutcome::Captured(progress) => self.apply_progress(progress),
                EnrollOutcome::Rejected(rejection) => {
                    self.last_error = Some(rejection.to_string());
                }
            }
        }
        Ok(outcome)
    }

    fn apply_progress(&mut self, progress: &CaptureProgress) {
        self.captured = progress.captured.clone();
        self.is_complete = progress.is_complete;
        self.last_error = None;
    }

    pub fn status(&self) -> EnrollmentStatus {
        let target_angle = enrollment::next_required_angle(&self.captured);
        EnrollmentStatus {
            identity_id: self.identity.id.clone(),
            display_name: self.identity.display_name.clone(),
            target_angle,
            instruction: target_angle.map(enrollment::instruction),
            captured: self.captured.clone(),
            progress: enrollment::progress(&self.captured),
            is_complete: self.is_complete,
            last_error: self.last_error.clone(),
        }
    }

    /// Stop the session: the engine refuses further frames immediately and
    /// an in-flight capture is discarded unpersisted.
    pub fn stop(&self) {
        self.handle.stop();
    }
}

/// Snapshot of a recognition session for the caller.
#[derive(Debug, Clone)]
pub struct RecognitionStatus {
    pub last_outcome: Option<RecognizeOutcome>,
    pub last_error: Option<String>,
}

/// Tracks per-frame recognition outcomes for a caller.
pub struct RecognitionSession {
    handle: EngineHandle,
    last_outcome: Option<RecognizeOutcome>,
    last_error: Option<String>,
}

impl RecognitionSession {
    pub fn new(handle: EngineHandle) -> Self {
        Self {
            handle,
            last_outcome: None,
            last_error: None,
        }
    }

    pub async fn submit_frame(
        &mut self,
        frame: RgbImage,
    ) -> Result<FrameOutcome<RecognizeOutcome>, EngineError> {
        let outcome = self.handle.recognize(frame).await?;

        if let FrameOutcome::Processed(processed) = &outcome {
            self.last_error = match processed {
                RecognizeOutcome::Rejected(rejection) => Some(rejection.to_string()),
                _ => None,
            };
            self.last_outcome = Some(processed.clone());
        }
        Ok(outcome)
    }

    pub fn status(&self) -> RecognitionStatus {
        RecognitionStatus {
            last_outcome: self.last_outcome.clone(),
            last_error: self.last_error.clone(),
        }
    }

    pub fn stop(&self) {
        self.handle.stop();
    }
}
