//! Face mesh landmark model via ONNX Runtime.
//!
//! Runs the 468-point face mesh on a square crop around a detected face and
//! maps the points back into normalized coordinates of the whole photo.

use crate::detector::FaceBox;
use crate::types::{Point3, MESH_POINT_COUNT};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const MESH_INPUT_SIZE: u32 = 192;
/// Crop side relative to the longer side of the detected face box.
const MESH_CROP_SCALE: f32 = 1.5;

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("model file not found: {0}; place the face mesh face_landmark.onnx in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Square region of the source photo fed to the mesh model.
///
/// May extend past the photo edges; the overhang is zero-padded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crop {
    pub x: i64,
    pub y: i64,
    pub side: u32,
}

impl Crop {
    /// Square crop centred on the face, `MESH_CROP_SCALE` times its longer side.
    pub fn around(face: &FaceBox) -> Self {
        let (cx, cy) = face.center();
        let side = (face.width.max(face.height) * MESH_CROP_SCALE).round().max(1.0);
        Self {
            x: (cx - side / 2.0).round() as i64,
            y: (cy - side / 2.0).round() as i64,
            side: side as u32,
        }
    }

    /// Map a point in model input pixels to normalized photo coordinates.
    ///
    /// `z` follows the same scale as `x`.
    pub fn to_normalized(&self, p: [f32; 3], width: u32, height: u32) -> Point3 {
        let k = self.side as f32 / MESH_INPUT_SIZE as f32;
        let w = width as f32;
        let h = height as f32;
        Point3::new(
            (self.x as f32 + p[0] * k) / w,
            (self.y as f32 + p[1] * k) / h,
            p[2] * k / w,
        )
    }
}

/// Face mesh landmark regressor.
pub struct FaceMesh {
    session: Session,
    landmarks_idx: usize,
}

impl FaceMesh {
    /// Load the face mesh ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, MeshError> {
        if !model_path.exists() {
            return Err(MeshError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if output_names.is_empty() {
            return Err(MeshError::InferenceFailed("face mesh model has no outputs".into()));
        }
        let landmarks_idx = discover_landmarks_output(&output_names);

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            landmarks_idx,
            "loaded face mesh model"
        );

        Ok(Self { session, landmarks_idx })
    }

    /// Regress the full mesh for `face`, in normalized photo coordinates.
    pub fn landmarks(&mut self, image: &RgbImage, face: &FaceBox) -> Result<Vec<Point3>, MeshError> {
        let crop = Crop::around(face);
        let input = preprocess(image, &crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[self.landmarks_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| MeshError::InferenceFailed(format!("landmarks: {e}")))?;

        decode_mesh(raw, &crop, image.width(), image.height())
    }
}

/// Pick the landmark tensor by name, falling back to the first output.
fn discover_landmarks_output(names: &[String]) -> usize {
    names
        .iter()
        .position(|n| n.to_ascii_lowercase().contains("landmark"))
        .unwrap_or(0)
}

/// Crop, zero-pad and resize to a 1×192×192×3 tensor with values in [0, 1].
fn preprocess(image: &RgbImage, crop: &Crop) -> Array4<f32> {
    let mut canvas = RgbImage::new(crop.side, crop.side);
    imageops::overlay(&mut canvas, image, -crop.x, -crop.y);
    let resized = imageops::resize(&canvas, MESH_INPUT_SIZE, MESH_INPUT_SIZE, FilterType::Triangle);

    let size = MESH_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, y as usize, x as usize, c]] = pixel[c] as f32 / 255.0;
        }
    }
    tensor
}

/// Interpret the flat model output as `(x, y, z)` triples in crop pixels.
fn decode_mesh(raw: &[f32], crop: &Crop, width: u32, height: u32) -> Result<Vec<Point3>, MeshError> {
    let needed = MESH_POINT_COUNT * 3;
    if raw.len() < needed {
        return Err(MeshError::InferenceFailed(format!(
            "expected at least {needed} landmark values, got {}",
            raw.len()
        )));
    }

    Ok(raw[..needed]
        .chunks_exact(3)
        .map(|c| crop.to_normalized([c[0], c[1], c[2]], width, height))
        .collect())
}
