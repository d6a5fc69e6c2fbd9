//! Legacy face descriptor codec — LBP texture, HOG shape, geometric ratios.
//!
//! Converts a cropped face into a 420-value descriptor: a 256-bin Local
//! Binary Pattern histogram, 144 Histogram-of-Oriented-Gradients features,
//! and 20 scale-normalized landmark ratios, z-score normalized as a whole.

use crate::types::{
    Descriptor, Landmarks, LEGACY_DIM, LM_LEFT_EYE, LM_MOUTH_LEFT, LM_MOUTH_RIGHT, LM_NOSE,
    LM_RIGHT_EYE,
};
use image::imageops::FilterType;
use image::{GrayImage, RgbImage};

// --- Named constants ---
const WORKING_SIZE: u32 = 64;
const LBP_BINS: usize = 256;
const HOG_CELL_SIZE: usize = 16;
const HOG_CELLS_PER_AXIS: usize = WORKING_SIZE as usize / HOG_CELL_SIZE; // 4
const HOG_BINS: usize = 9;
const HOG_BIN_WIDTH_DEG: f32 = 20.0;
const HOG_LEN: usize = HOG_CELLS_PER_AXIS * HOG_CELLS_PER_AXIS * HOG_BINS; // 144
const GEOMETRIC_LEN: usize = 20;
const SYMMETRY_LEN: usize = 5;
const CENTER_LEN: usize = 5;

// ITU-R BT.601 luma weights.
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

/// LBP neighbor offsets in fixed clockwise order starting at north-west.
/// Bit i of the code corresponds to offset i.
const LBP_NEIGHBORS: [(i32, i32); 8] = [
    (-1, -1), // NW
    (0, -1),  // N
    (1, -1),  // NE
    (1, 0),   // E
    (1, 1),   // SE
    (0, 1),   // S
    (-1, 1),  // SW
    (-1, 0),  // W
];

/// Extract the legacy 420-value descriptor from a face crop.
///
/// Extraction is total: the only degradable input — missing landmarks —
/// takes the explicit zero-geometric branch, and the quality gate downstream
/// filters degenerate output.
pub fn extract(crop: &RgbImage, landmarks: &Landmarks) -> Descriptor {
    let gray = grayscale_working(crop);

    let mut features = Vec::with_capacity(LEGACY_DIM);
    features.extend_from_slice(&lbp_histogram(&gray));
    features.extend_from_slice(&hog_features(&gray));
    features.extend_from_slice(&geometric_features(landmarks));
    debug_assert_eq!(features.len(), LEGACY_DIM);

    Descriptor::Legacy(zscore(&features))
}

/// Convert to grayscale (BT.601 luma) and resize to the 64×64 working
/// resolution with deterministic bilinear resampling.
fn grayscale_working(crop: &RgbImage) -> Vec<u8> {
    let gray = GrayImage::from_fn(crop.width(), crop.height(), |x, y| {
        let [r, g, b] = crop.get_pixel(x, y).0;
        let luma = LUMA_R * r as f32 + LUMA_G * g as f32 + LUMA_B * b as f32;
        image::Luma([luma.round().clamp(0.0, 255.0) as u8])
    });
    image::imageops::resize(&gray, WORKING_SIZE, WORKING_SIZE, FilterType::Triangle).into_raw()
}

/// 256-bin LBP histogram over all interior pixels, normalized to sum 1
/// (all-zero when there are no interior pixels).
fn lbp_histogram(gray: &[u8]) -> [f32; LBP_BINS] {
    let size = WORKING_SIZE as usize;
    let mut histogram = [0.0f32; LBP_BINS];
    let mut total = 0u32;

    for y in 1..size - 1 {
        for x in 1..size - 1 {
            let center = gray[y * size + x];
            let mut code = 0usize;
            for (bit, (dx, dy)) in LBP_NEIGHBORS.iter().enumerate() {
                let nx = (x as i32 + dx) as usize;
                let ny = (y as i32 + dy) as usize;
                if gray[ny * size + nx] >= center {
                    code |= 1 << bit;
                }
            }
            histogram[code] += 1.0;
            total += 1;
        }
    }

    if total > 0 {
        for bin in histogram.iter_mut() {
            *bin /= total as f32;
        }
    }
    histogram
}

/// HOG features: centered-difference gradients, a 4×4 grid of 16×16-pixel
/// cells, 9 unsigned orientation bins per cell, each cell L2-normalized
/// independently (flat cells stay zero). 16 cells × 9 bins = 144 features.
fn hog_features(gray: &[u8]) -> [f32; HOG_LEN] {
    let size = WORKING_SIZE as usize;
    let mut cells = [[0.0f32; HOG_BINS]; HOG_CELLS_PER_AXIS * HOG_CELLS_PER_AXIS];

    // Border pixels have no centered difference; their gradient is zero and
    // contributes nothing.
    for y in 1..size - 1 {
        for x in 1..size - 1 {
            let gx = gray[y * size + x + 1] as f32 - gray[y * size + x - 1] as f32;
            let gy = gray[(y + 1) * size + x] as f32 - gray[(y - 1) * size + x] as f32;
            let magnitude = (gx * gx + gy * gy).sqrt();
            if magnitude <= 0.0 {
                continue;
            }

            // Unsigned orientation folded into [0, 180).
            let angle = gy.atan2(gx).to_degrees();
            let folded = (angle + 180.0) % 180.0;
            let bin = ((folded / HOG_BIN_WIDTH_DEG) as usize).min(HOG_BINS - 1);

            let cell = (y / HOG_CELL_SIZE) * HOG_CELLS_PER_AXIS + x / HOG_CELL_SIZE;
            cells[cell][bin] += magnitude;
        }
    }

    let mut features = [0.0f32; HOG_LEN];
    for (i, cell) in cells.iter().enumerate() {
        let norm = cell.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for (j, v) in cell.iter().enumerate() {
                features[i * HOG_BINS + j] = v / norm;
            }
        }
    }
    features
}

/// Scale-normalized geometric ratios, always exactly 20 values.
///
/// Fewer than 3 landmark points (or a degenerate bounding box) yields the
/// all-zero fallback block. Each feature is skipped when a landmark it needs
/// is absent; the block is zero-padded to length.
fn geometric_features(landmarks: &Landmarks) -> [f32; GEOMETRIC_LEN] {
    let mut padded = [0.0f32; GEOMETRIC_LEN];

    let bbox = landmarks.bounding_box;
    if landmarks.points.len() < 3 || bbox.width <= 0.0 || bbox.height <= 0.0 {
        return padded;
    }

    let mut features: Vec<f32> = Vec::with_capacity(GEOMETRIC_LEN);

    if let (Some(left), Some(right)) =
        (landmarks.point(LM_LEFT_EYE), landmarks.point(LM_RIGHT_EYE))
    {
        features.push(left.distance_to(right) / bbox.width);
    }
    if let (Some(nose), Some(mouth)) =
        (landmarks.point(LM_NOSE), landmarks.point(LM_MOUTH_LEFT))
    {
        features.push(nose.distance_to(mouth) / bbox.height);
    }
    features.push(bbox.width / bbox.height);
    features.extend_from_slice(&symmetry_features(landmarks));
    features.extend_from_slice(&center_features(landmarks));
    if let (Some(left), Some(right)) =
        (landmarks.point(LM_MOUTH_LEFT), landmarks.point(LM_MOUTH_RIGHT))
    {
        features.push(left.distance_to(right) / bbox.width);
    }

    features.truncate(GEOMETRIC_LEN);
    padded[..features.len()].copy_from_slice(&features);
    padded
}

/// Five symmetry ratios: vertical eye offset, vertical mouth-corner offset,
/// and horizontal eye symmetry about the box center, zero-padded.
fn symmetry_features(landmarks: &Landmarks) -> [f32; SYMMETRY_LEN] {
    let mut features = [0.0f32; SYMMETRY_LEN];
    let bbox = landmarks.bounding_box;
    let mut i = 0;

    if let (Some(left), Some(right)) =
        (landmarks.point(LM_LEFT_EYE), landmarks.point(LM_RIGHT_EYE))
    {
        features[i] = (left.y - right.y).abs() / bbox.height;
        i += 1;
    }
    if let (Some(left), Some(right)) =
        (landmarks.point(LM_MOUTH_LEFT), landmarks.point(LM_MOUTH_RIGHT))
    {
        features[i] = (left.y - right.y).abs() / bbox.height;
        i += 1;
    }
    let center_x = bbox.center().x;
    if let (Some(left), Some(right)) =
        (landmarks.point(LM_LEFT_EYE), landmarks.point(LM_RIGHT_EYE))
    {
        features[i] = ((left.x - center_x).abs() - (right.x - center_x).abs()).abs() / bbox.width;
    }
    features
}

/// Five center-distance ratios: each of the first five landmarks' distance
/// to the bounding-box center, normalized by box width, zero-padded.
fn center_features(landmarks: &Landmarks) -> [f32; CENTER_LEN] {
    let mut features = [0.0f32; CENTER_LEN];
    let center = landmarks.bounding_box.center();
    let width = landmarks.bounding_box.width;

    for (i, point) in landmarks.points.iter().take(CENTER_LEN).enumerate() {
        features[i] = point.distance_to(center) / width;
    }
    features
}

/// Z-score normalize: subtract the mean, divide by the population standard
/// deviation. A zero deviation leaves the values unnormalized. Returns a new
/// vector; the input buffer is never mutated.
fn zscore(values: &[f32]) -> Vec<f32> {
    let n = values.len() as f32;
    if n == 0.0 {
        return Vec::new();
    }
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
    let std_dev = variance.sqrt();

    if std_dev > 0.0 {
        values.iter().map(|v| (v - mean) / std_dev).collect()
    } else {
        values.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Point};

    fn uniform_gray(value: u8) -> Vec<u8> {
        vec![value; (WORKING_SIZE * WORKING_SIZE) as usize]
    }

    fn gradient_gray() -> Vec<u8> {
        let size = WORKING_SIZE as usize;
        (0..size * size).map(|i| ((i % size) * 4) as u8).collect()
    }

    fn full_landmarks() -> Landmarks {
        Landmarks {
            points: vec![
                Point::new(30.0, 40.0),  // left eye
                Point::new(70.0, 40.0),  // right eye
                Point::new(50.0, 60.0),  // nose
                Point::new(35.0, 80.0),  // mouth left
                Point::new(65.0, 80.0),  // mouth right
            ],
            bounding_box: BoundingBox { x: 0.0, y: 0.0, width: 100.0, height: 100.0 },
            confidence: 0.9,
        }
    }

    fn test_crop() -> RgbImage {
        RgbImage::from_fn(100, 100, |x, y| {
            image::Rgb([(x * 2) as u8, (y * 2) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_lbp_histogram_sums_to_one() {
        let sum: f32 = lbp_histogram(&gradient_gray()).iter().sum();
        assert!((sum - 1.0).abs() < 1e-4, "LBP bins should sum to 1, got {sum}");
    }

    #[test]
    fn test_lbp_uniform_image_is_all_ones_code() {
        // Every neighbor equals the center, so every comparison sets its bit.
        let histogram = lbp_histogram(&uniform_gray(128));
        assert!((histogram[255] - 1.0).abs() < 1e-6);
        assert!(histogram[..255].iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_hog_flat_image_is_zero() {
        let features = hog_features(&uniform_gray(200));
        assert!(features.iter().all(|&f| f == 0.0));
    }

    #[test]
    fn test_hog_cell_norms_unit_or_zero() {
        let features = hog_features(&gradient_gray());
        for cell in 0..HOG_CELLS_PER_AXIS * HOG_CELLS_PER_AXIS {
            let slice = &features[cell * HOG_BINS..(cell + 1) * HOG_BINS];
            let norm = slice.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!(
                norm < 1e-6 || (norm - 1.0).abs() < 1e-4,
                "cell {cell} norm should be 0 or 1, got {norm}"
            );
        }
    }

    #[test]
    fn test_hog_horizontal_gradient_hits_zero_bin() {
        // Purely horizontal gradient: gy = 0, gx > 0 → angle 0° → folded 180 % 180 = 0.
        let features = hog_features(&gradient_gray());
        let first_cell = &features[..HOG_BINS];
        assert!((first_cell[0] - 1.0).abs() < 1e-4, "expected all mass in bin 0");
    }

    #[test]
    fn test_hog_length() {
        assert_eq!(hog_features(&gradient_gray()).len(), 144);
    }

    #[test]
    fn test_geometric_too_few_points_is_zero() {
        let bbox = BoundingBox { x: 0.0, y: 0.0, width: 100.0, height: 100.0 };
        let mut landmarks = Landmarks::empty(bbox);
        landmarks.points = vec![Point::new(1.0, 1.0), Point::new(2.0, 2.0)];
        assert_eq!(geometric_features(&landmarks), [0.0; GEOMETRIC_LEN]);
    }

    #[test]
    fn test_geometric_degenerate_bbox_is_zero() {
        let mut landmarks = full_landmarks();
        landmarks.bounding_box.width = 0.0;
        assert_eq!(geometric_features(&landmarks), [0.0; GEOMETRIC_LEN]);
    }

    #[test]
    fn test_geometric_always_twenty() {
        for count in 0..=8 {
            let mut landmarks = full_landmarks();
            landmarks.points.resize(count, Point::new(50.0, 50.0));
            assert_eq!(geometric_features(&landmarks).len(), GEOMETRIC_LEN);
        }
    }

    #[test]
    fn test_geometric_eye_distance_ratio() {
        let features = geometric_features(&full_landmarks());
        // Eyes at x=30 and x=70 in a 100-wide box.
        assert!((features[0] - 0.4).abs() < 1e-6, "eye ratio: {}", features[0]);
        // Aspect ratio of a square box.
        assert!((features[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_geometric_symmetric_face_has_zero_offsets() {
        let features = geometric_features(&full_landmarks());
        // Eyes and mouth corners level, eyes equidistant from center.
        assert!(features[3].abs() < 1e-6, "vertical eye offset");
        assert!(features[4].abs() < 1e-6, "vertical mouth offset");
        assert!(features[5].abs() < 1e-6, "horizontal eye symmetry");
    }

    #[test]
    fn test_zscore_standardizes() {
        let normalized = zscore(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let mean: f32 = normalized.iter().sum::<f32>() / normalized.len() as f32;
        let variance: f32 =
            normalized.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / normalized.len() as f32;
        assert!(mean.abs() < 1e-6);
        assert!((variance - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_zscore_flat_input_unchanged() {
        let flat = vec![3.0f32; 10];
        assert_eq!(zscore(&flat), flat);
    }

    #[test]
    fn test_extract_length_and_variant() {
        let descriptor = extract(&test_crop(), &full_landmarks());
        assert_eq!(descriptor.len(), LEGACY_DIM);
        assert_eq!(descriptor.variant(), crate::types::DescriptorVariant::Legacy);
    }

    #[test]
    fn test_extract_deterministic() {
        let crop = test_crop();
        let landmarks = full_landmarks();
        assert_eq!(extract(&crop, &landmarks), extract(&crop, &landmarks));
    }

    #[test]
    fn test_extract_without_landmarks_still_full_length() {
        let bbox = BoundingBox { x: 0.0, y: 0.0, width: 100.0, height: 100.0 };
        let descriptor = extract(&test_crop(), &Landmarks::empty(bbox));
        assert_eq!(descriptor.len(), LEGACY_DIM);
    }
}
