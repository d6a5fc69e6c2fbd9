//! facet-engine — the sequential frame pipeline around facet-core.
//!
//! Wires the external detector, the descriptor/embedding extraction, the
//! quality gate, and the match resolver into a single-threaded engine with
//! strict in-flight frame guarding, plus the gallery store and session
//! types callers interact with.

pub mod config;
pub mod engine;
pub mod session;
pub mod store;

pub use config::Config;
pub use engine::{
    load_optional_embedder, spawn_engine, CaptureProgress, EngineError, EngineHandle,
    EngineStatus, EnrollOutcome, FrameOutcome, FrameRejection, RecognizeOutcome,
};
pub use session::{EnrollmentSession, EnrollmentStatus, RecognitionSession, RecognitionStatus};
pub use store::{GalleryStore, MemoryStore, SqliteStore, StoreError};
