//! Landmark extraction: photo in, four-region landmark set out.

use crate::detector::{DetectorError, FaceDetector};
use crate::mesh::{FaceMesh, MeshError};
use crate::types::LandmarkSet;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

/// SCRFD detection model filename inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// Face mesh landmark model filename inside the model directory.
pub const MESH_MODEL_FILE: &str = "face_landmark.onnx";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("face mesh error: {0}")]
    Mesh(#[from] MeshError),
    #[error("face mesh returned too few points for region selection")]
    IncompleteMesh,
}

/// Produces the region landmark subset for the first face in a photo.
///
/// `Ok(None)` means no face was found.
pub trait LandmarkExtractor {
    fn extract(&mut self, image: &RgbImage) -> Result<Option<LandmarkSet>, ExtractError>;
}

impl<T: LandmarkExtractor + ?Sized> LandmarkExtractor for Box<T> {
    fn extract(&mut self, image: &RgbImage) -> Result<Option<LandmarkSet>, ExtractError> {
        (**self).extract(image)
    }
}

/// SCRFD detection followed by face mesh regression on the most confident face.
pub struct OnnxLandmarkExtractor {
    detector: FaceDetector,
    mesh: FaceMesh,
}

impl OnnxLandmarkExtractor {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, ExtractError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let mesh = FaceMesh::load(&model_dir.join(MESH_MODEL_FILE))?;
        Ok(Self { detector, mesh })
    }
}

impl LandmarkExtractor for OnnxLandmarkExtractor {
    fn extract(&mut self, image: &RgbImage) -> Result<Option<LandmarkSet>, ExtractError> {
        let faces = self.detector.detect(image)?;
        let Some(face) = faces.first() else {
            return Ok(None);
        };
        if faces.len() > 1 {
            tracing::debug!(faces = faces.len(), "multiple faces detected, using the most confident");
        }

        let mesh = self.mesh.landmarks(image, face)?;
        let set = LandmarkSet::from_mesh(&mesh).ok_or(ExtractError::IncompleteMesh)?;
        tracing::debug!(confidence = face.confidence, "extracted region landmarks");
        Ok(Some(set))
    }
}
