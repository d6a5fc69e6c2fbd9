//! The recognition/enrollment engine thread.
//!
//! One dedicated OS thread owns the detector, the optional embedder, and the
//! gallery store, and processes frames strictly sequentially: a 1-permit
//! gate refuses new frames while one is in flight (dropped, not queued), and
//! a stop flag makes the gate refuse everything once a session ends.

use crate::store::{GalleryStore, StoreError};
use chrono::Utc;
use facet_core::types::{DetectedFace, FaceDetector, Identity, RecognitionResult};
use facet_core::{
    descriptor, enrollment, matcher, AngleClass, Descriptor, FaceEmbedder, MatchPolicy,
    QualityDefect, QualityPolicy,
};
use image::RgbImage;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("gallery store: {0}")]
    Store(#[from] StoreError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Why a frame produced no descriptor or capture.
///
/// Input defects (`NoFace`, pose problems) and quality defects are distinct
/// signals: the former mean "nothing usable in this frame", the latter mean
/// "extraction produced degenerate output".
#[derive(Debug, Clone, PartialEq)]
pub enum FrameRejection {
    NoFace,
    InvalidPose { yaw: f32, pitch: f32 },
    NonCanonicalPose,
    LowQuality(QualityDefect),
}

impl std::fmt::Display for FrameRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameRejection::NoFace => write!(f, "no face detected"),
            FrameRejection::InvalidPose { yaw, pitch } => {
                write!(f, "head pose too extreme (yaw {yaw:.0}°, pitch {pitch:.0}°)")
            }
            FrameRejection::NonCanonicalPose => write!(f, "hold a steady canonical pose"),
            FrameRejection::LowQuality(defect) => write!(f, "low quality capture: {defect}"),
        }
    }
}

/// Progress after a successful enrollment capture.
#[derive(Debug, Clone)]
pub struct CaptureProgress {
    /// Angle class that was just captured.
    pub angle: AngleClass,
    pub captured: BTreeSet<AngleClass>,
    pub next_required: Option<AngleClass>,
    /// Instruction for the next required angle, if any.
    pub instruction: Option<&'static str>,
    pub progress: f32,
    pub is_complete: bool,
}

#[derive(Debug, Clone)]
pub enum EnrollOutcome {
    Captured(CaptureProgress),
    Rejected(FrameRejection),
}

#[derive(Debug, Clone)]
pub enum RecognizeOutcome {
    Match(RecognitionResult),
    /// Scanned the gallery without an above-threshold candidate. Not an
    /// error — also returned for an empty gallery.
    NoMatch,
    Rejected(FrameRejection),
}

/// What happened to a submitted frame.
#[derive(Debug)]
pub enum FrameOutcome<T> {
    Processed(T),
    /// Dropped by the in-flight guard; the frame was never queued.
    Skipped,
    /// Refused (or discarded mid-flight) because the session was stopped.
    Stopped,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStatus {
    pub embedder_available: bool,
    pub identity_count: usize,
    pub record_count: usize,
}

enum EngineRequest {
    EnrollCapture {
        identity_id: String,
        frame: RgbImage,
        // Held for the whole processing of this frame; dropping it reopens
        // the gate.
        _permit: OwnedSemaphorePermit,
        reply: oneshot::Sender<Result<FrameOutcome<EnrollOutcome>, EngineError>>,
    },
    Recognize {
        frame: RgbImage,
        _permit: OwnedSemaphorePermit,
        reply: oneshot::Sender<Result<FrameOutcome<RecognizeOutcome>, EngineError>>,
    },
    CreateIdentity {
        display_name: String,
        reply: oneshot::Sender<Result<Identity, EngineError>>,
    },
    ListIdentities {
        reply: oneshot::Sender<Result<Vec<Identity>, EngineError>>,
    },
    DeleteIdentity {
        id: String,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    Status {
        reply: oneshot::Sender<Result<EngineStatus, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    frame_gate: Arc<Semaphore>,
    stopped: Arc<AtomicBool>,
}

impl EngineHandle {
    /// Submit a frame for enrollment capture on the given identity.
    ///
    /// Refused immediately (`Skipped`) while a previous frame is still
    /// processing, and (`Stopped`) once [`stop`](Self::stop) has been called.
    pub async fn enroll_capture(
        &self,
        identity_id: String,
        frame: RgbImage,
    ) -> Result<FrameOutcome<EnrollOutcome>, EngineError> {
        let Some(permit) = self.acquire_frame_slot() else {
            return Ok(FrameOutcome::Skipped);
        };
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(FrameOutcome::Stopped);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::EnrollCapture {
                identity_id,
                frame,
                _permit: permit,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Submit a frame for recognition against the whole gallery.
    pub async fn recognize(
        &self,
        frame: RgbImage,
    ) -> Result<FrameOutcome<RecognizeOutcome>, EngineError> {
        let Some(permit) = self.acquire_frame_slot() else {
            return Ok(FrameOutcome::Skipped);
        };
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(FrameOutcome::Stopped);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Recognize {
                frame,
                _permit: permit,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn create_identity(&self, display_name: String) -> Result<Identity, EngineError> {
        self.request(|reply| EngineRequest::CreateIdentity { display_name, reply })
            .await
    }

    pub async fn list_identities(&self) -> Result<Vec<Identity>, EngineError> {
        self.request(|reply| EngineRequest::ListIdentities { reply }).await
    }

    pub async fn delete_identity(&self, id: String) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::DeleteIdentity { id, reply }).await
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.request(|reply| EngineRequest::Status { reply }).await
    }

    /// Stop accepting frames. The in-flight frame, if any, completes or is
    /// discarded; a discarded enrollment capture persists nothing.
    /// Management requests (list/delete/status) are unaffected.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        tracing::info!("engine stopped: refusing further frames");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn acquire_frame_slot(&self) -> Option<OwnedSemaphorePermit> {
        match self.frame_gate.clone().try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::trace!("frame dropped: pipeline busy");
                None
            }
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Load the embedding model, degrading to the legacy-only pipeline when it
/// is missing or unloadable. The decision is permanent for the session:
/// per-frame calls never retry loading.
pub fn load_optional_embedder(model_path: Option<&std::path::Path>) -> Option<FaceEmbedder> {
    let path = model_path?;
    match FaceEmbedder::load(&path.to_string_lossy()) {
        Ok(embedder) => Some(embedder),
        Err(err) => {
            tracing::warn!(
                error = %err,
                path = %path.display(),
                "embedding model unavailable; using legacy descriptor codec"
            );
            None
        }
    }
}

struct EngineState {
    detector: Box<dyn FaceDetector>,
    embedder: Option<FaceEmbedder>,
    store: Arc<dyn GalleryStore>,
    match_policy: MatchPolicy,
    quality_policy: QualityPolicy,
    stopped: Arc<AtomicBool>,
}

/// Spawn the engine on a dedicated OS thread and return a handle to it.
pub fn spawn_engine(
    detector: Box<dyn FaceDetector>,
    embedder: Option<FaceEmbedder>,
    store: Arc<dyn GalleryStore>,
    match_policy: MatchPolicy,
    quality_policy: QualityPolicy,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let stopped = Arc::new(AtomicBool::new(false));

    let mut state = EngineState {
        detector,
        embedder,
        store,
        match_policy,
        quality_policy,
        stopped: stopped.clone(),
    };

    std::thread::Builder::new()
        .name("facet-engine".into())
        .spawn(move || {
            tracing::info!(
                embedder = state.embedder.is_some(),
                "engine thread started"
            );
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::EnrollCapture {
                        identity_id,
                        frame,
                        _permit,
                        reply,
                    } => {
                        let _ = reply.send(run_enroll(&mut state, &identity_id, &frame));
                    }
                    EngineRequest::Recognize { frame, _permit, reply } => {
                        let _ = reply.send(run_recognize(&mut state, &frame));
                    }
                    EngineRequest::CreateIdentity { display_name, reply } => {
                        let result = state
                            .store
                            .create_identity(&display_name)
                            .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::ListIdentities { reply } => {
                        let _ =
                            reply.send(state.store.list_identities().map_err(EngineError::from));
                    }
                    EngineRequest::DeleteIdentity { id, reply } => {
                        let _ =
                            reply.send(state.store.delete_identity(&id).map_err(EngineError::from));
                    }
                    EngineRequest::Status { reply } => {
                        let _ = reply.send(engine_status(&state));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle {
        tx,
        frame_gate: Arc::new(Semaphore::new(1)),
        stopped,
    }
}

fn engine_status(state: &EngineState) -> Result<EngineStatus, EngineError> {
    Ok(EngineStatus {
        embedder_available: state.embedder.is_some(),
        identity_count: state.store.list_identities()?.len(),
        record_count: state.store.record_count()?,
    })
}

/// Best face in the frame, or `None` as an input defect.
///
/// A detector failure is logged and degraded to "no face" — per-frame faults
/// never crash the pipeline.
fn detect_best(detector: &mut dyn FaceDetector, frame: &RgbImage) -> Option<DetectedFace> {
    match detector.detect(frame) {
        Ok(faces) => faces.into_iter().next(),
        Err(err) => {
            tracing::warn!(error = %err, "detector failed; treating frame as faceless");
            None
        }
    }
}

/// Extract a descriptor through the preferred path: embedding when the
/// model is available, the legacy codec otherwise or on inference failure.
fn extract_descriptor(embedder: &mut Option<FaceEmbedder>, face: &DetectedFace) -> Descriptor {
    if let Some(model) = embedder {
        match model.embed(&face.crop) {
            Ok(descriptor) => return descriptor,
            Err(err) => {
                tracing::warn!(error = %err, "embedding failed; falling back to legacy codec");
            }
        }
    }
    descriptor::extract(&face.crop, &face.landmarks)
}

/// Gate a detected face and extract its descriptor, or reject the frame.
fn gate_frame(
    state: &mut EngineState,
    frame: &RgbImage,
) -> Result<(DetectedFace, Descriptor), FrameRejection> {
    let Some(face) = detect_best(state.detector.as_mut(), frame) else {
        return Err(FrameRejection::NoFace);
    };
    if !face.angle.is_valid() {
        return Err(FrameRejection::InvalidPose {
            yaw: face.angle.yaw,
            pitch: face.angle.pitch,
        });
    }

    let descriptor = extract_descriptor(&mut state.embedder, &face);
    if let Err(defect) = state.quality_policy.assess(&descriptor) {
        tracing::debug!(defect = %defect, "quality gate rejected frame");
        return Err(FrameRejection::LowQuality(defect));
    }
    Ok((face, descriptor))
}

fn run_enroll(
    state: &mut EngineState,
    identity_id: &str,
    frame: &RgbImage,
) -> Result<FrameOutcome<EnrollOutcome>, EngineError> {
    let (face, descriptor) = match gate_frame(state, frame) {
        Ok(ok) => ok,
        Err(rejection) => return Ok(FrameOutcome::Processed(EnrollOutcome::Rejected(rejection))),
    };

    let angle_class = face.angle.class();
    if angle_class == AngleClass::MixedAngle {
        return Ok(FrameOutcome::Processed(EnrollOutcome::Rejected(
            FrameRejection::NonCanonicalPose,
        )));
    }

    // A stop that landed while this frame was in flight discards the capture
    // before anything is persisted.
    if state.stopped.load(Ordering::SeqCst) {
        tracing::debug!("enrollment frame discarded: session stopped mid-flight");
        return Ok(FrameOutcome::Stopped);
    }

    let record = facet_core::GalleryRecord {
        identity_id: identity_id.to_string(),
        angle_class,
        descriptor,
        confidence: face.confidence,
        captured_at: Utc::now(),
    };
    let identity = state.store.append_record(&record)?;

    let next_required = enrollment::next_required_angle(&identity.captured_angles);
    let progress = enrollment::progress(&identity.captured_angles);
    tracing::info!(
        identity = %identity.id,
        angle = %angle_class,
        progress,
        complete = identity.is_complete,
        "enrollment capture stored"
    );

    Ok(FrameOutcome::Processed(EnrollOutcome::Captured(CaptureProgress {
        angle: angle_class,
        captured: identity.captured_angles,
        next_required,
        instruction: next_required.map(enrollment::instruction),
        progress,
        is_complete: identity.is_complete,
    })))
}

fn run_recognize(
    state: &mut EngineState,
    frame: &RgbImage,
) -> Result<FrameOutcome<RecognizeOutcome>, EngineError> {
    let (face, descriptor) = match gate_frame(state, frame) {
        Ok(ok) => ok,
        Err(rejection) => {
            return Ok(FrameOutcome::Processed(RecognizeOutcome::Rejected(rejection)))
        }
    };

    let gallery = state.store.snapshot()?;
    let outcome = match matcher::resolve(
        &descriptor,
        face.angle.class(),
        &gallery,
        &state.match_policy,
    ) {
        Some(result) => {
            tracing::info!(
                identity = %result.identity_id,
                confidence = result.confidence,
                matched_angle = %result.matched_angle,
                "face recognized"
            );
            RecognizeOutcome::Match(result)
        }
        None => RecognizeOutcome::NoMatch,
    };
    Ok(FrameOutcome::Processed(outcome))
}
