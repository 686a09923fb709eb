//! vigil-core: identity verification from facial landmarks.
//!
//! Uses SCRFD for face detection and a 468-point face mesh for landmark
//! regression, both running via ONNX Runtime for CPU inference. Four facial
//! regions are compared by cosine similarity against reference landmarks.

pub mod detector;
pub mod directory;
pub mod extractor;
pub mod generator;
pub mod mesh;
pub mod photo;
pub mod store;
pub mod types;
pub mod verify;

use std::path::PathBuf;

pub use directory::{normalize_document, normalize_name, UserDirectory, UserRecord};
pub use extractor::{ExtractError, LandmarkExtractor, OnnxLandmarkExtractor};
pub use store::{LandmarkFile, StoreError};
pub use types::{LandmarkSet, MatchResult, Matcher, Point3, Region, RegionCosineMatcher};
pub use verify::{Verified, Verifier, VerifyError, SIMILARITY_THRESHOLD};

/// Default ONNX model directory: `$XDG_DATA_HOME/vigil/models`, falling back
/// to `~/.local/share/vigil/models`.
pub fn default_model_dir() -> PathBuf {
    let data_dir = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        });
    data_dir.join("vigil").join("models")
}
