//! Deep face embedder via ONNX Runtime.
//!
//! Wraps a FaceNet-style model producing 512-dimensional L2-normalized
//! embeddings from 160×160 RGB face crops.

use crate::types::{Descriptor, EMBEDDING_DIM};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
const EMBED_INPUT_SIZE: usize = 160;
/// Channels are mapped to [-1, 1] via pixel / 127.5 - 1.
const EMBED_PIXEL_SCALE: f32 = 127.5;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ONNX-backed face embedder.
///
/// Loading fails fast when the model is missing or unreadable; callers hold
/// an `Option<FaceEmbedder>` decided once per session and route to the legacy
/// descriptor codec when it is `None`. Per-frame calls never retry loading.
pub struct FaceEmbedder {
    session: Session,
}

impl FaceEmbedder {
    /// Load the embedding ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EmbedderError> {
        if !Path::new(model_path).exists() {
            return Err(EmbedderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded embedding model"
        );

        Ok(Self { session })
    }

    /// Extract a 512-dimensional L2-normalized embedding from a face crop.
    pub fn embed(&mut self, crop: &RgbImage) -> Result<Descriptor, EmbedderError> {
        let input = Self::preprocess(crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let raw: Vec<f32> = raw_data.to_vec();

        if raw.len() != EMBEDDING_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Descriptor::Embedding(l2_normalize(raw)))
    }

    /// Preprocess a face crop into the model's NHWC float tensor: resize to
    /// 160×160 and map each channel to [-1, 1].
    fn preprocess(crop: &RgbImage) -> Array4<f32> {
        let size = EMBED_INPUT_SIZE;
        let resized = image::imageops::resize(crop, size as u32, size as u32, FilterType::Triangle);

        let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
        for y in 0..size {
            for x in 0..size {
                let [r, g, b] = resized.get_pixel(x as u32, y as u32).0;
                tensor[[0, y, x, 0]] = r as f32 / EMBED_PIXEL_SCALE - 1.0;
                tensor[[0, y, x, 1]] = g as f32 / EMBED_PIXEL_SCALE - 1.0;
                tensor[[0, y, x, 2]] = b as f32 / EMBED_PIXEL_SCALE - 1.0;
            }
        }
        tensor
    }
}

/// Divide by the Euclidean norm; a zero norm leaves the values unchanged.
fn l2_normalize(values: Vec<f32>) -> Vec<f32> {
    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter().map(|v| v / norm).collect()
    } else {
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_shape() {
        let crop = RgbImage::from_pixel(100, 80, image::Rgb([128, 128, 128]));
        let tensor = FaceEmbedder::preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, EMBED_INPUT_SIZE, EMBED_INPUT_SIZE, 3]);
    }

    #[test]
    fn test_preprocess_normalization_range() {
        let black = RgbImage::from_pixel(160, 160, image::Rgb([0, 0, 0]));
        let white = RgbImage::from_pixel(160, 160, image::Rgb([255, 255, 255]));
        assert!((FaceEmbedder::preprocess(&black)[[0, 0, 0, 0]] + 1.0).abs() < 1e-6);
        let white_val = FaceEmbedder::preprocess(&white)[[0, 0, 0, 0]];
        assert!((white_val - 1.0).abs() < 0.01, "got {white_val}");
    }

    #[test]
    fn test_l2_normalize_unit_norm() {
        let normalized = l2_normalize(vec![3.0, 4.0]);
        let norm: f32 = normalized.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_unchanged() {
        assert_eq!(l2_normalize(vec![0.0; 4]), vec![0.0; 4]);
    }

    #[test]
    fn test_load_missing_model() {
        let result = FaceEmbedder::load("/nonexistent/model.onnx");
        assert!(matches!(result, Err(EmbedderError::ModelNotFound(_))));
    }
}
