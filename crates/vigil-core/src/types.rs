use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of points produced by the face mesh model.
pub const MESH_POINT_COUNT: usize = 468;

// Face mesh indices per region. Stored and live sets are compared
// point-for-point, so every producer of a `LandmarkSet` goes through
// `LandmarkSet::from_mesh` and these tables.
const LEFT_EYE_INDICES: [usize; 2] = [33, 133];
const RIGHT_EYE_INDICES: [usize; 2] = [362, 263];
const NOSE_INDICES: [usize; 3] = [1, 2, 98];
const MOUTH_INDICES: [usize; 2] = [61, 291];

/// One of the four facial regions used for comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    LeftEye,
    RightEye,
    Nose,
    Mouth,
}

impl Region {
    /// All regions, in comparison order.
    pub const ALL: [Region; 4] = [Region::LeftEye, Region::RightEye, Region::Nose, Region::Mouth];

    pub fn name(self) -> &'static str {
        match self {
            Region::LeftEye => "left_eye",
            Region::RightEye => "right_eye",
            Region::Nose => "nose",
            Region::Mouth => "mouth",
        }
    }

    /// Face mesh indices selected for this region.
    pub fn mesh_indices(self) -> &'static [usize] {
        match self {
            Region::LeftEye => &LEFT_EYE_INDICES,
            Region::RightEye => &RIGHT_EYE_INDICES,
            Region::Nose => &NOSE_INDICES,
            Region::Mouth => &MOUTH_INDICES,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A landmark in normalized image coordinates.
///
/// `x` is divided by image width, `y` by image height, and `z` shares the
/// scale of `x`. Serialized as a bare `[x, y, z]` array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<[f32; 3]> for Point3 {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Point3> for [f32; 3] {
    fn from(p: Point3) -> Self {
        [p.x, p.y, p.z]
    }
}

/// Region point count disagrees with the region index table.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("region {region} has {actual} points, expected {expected}")]
pub struct ShapeMismatch {
    pub region: Region,
    pub expected: usize,
    pub actual: usize,
}

/// Landmark subset for one face: all four regions, never a partial set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    pub left_eye: Vec<Point3>,
    pub right_eye: Vec<Point3>,
    pub nose: Vec<Point3>,
    pub mouth: Vec<Point3>,
}

impl LandmarkSet {
    /// Select the region subset from a full face mesh.
    ///
    /// Returns `None` if the mesh is too short to contain every region index.
    pub fn from_mesh(mesh: &[Point3]) -> Option<Self> {
        let pick = |region: Region| -> Option<Vec<Point3>> {
            region
                .mesh_indices()
                .iter()
                .map(|&i| mesh.get(i).copied())
                .collect()
        };

        Some(Self {
            left_eye: pick(Region::LeftEye)?,
            right_eye: pick(Region::RightEye)?,
            nose: pick(Region::Nose)?,
            mouth: pick(Region::Mouth)?,
        })
    }

    pub fn region(&self, region: Region) -> &[Point3] {
        match region {
            Region::LeftEye => &self.left_eye,
            Region::RightEye => &self.right_eye,
            Region::Nose => &self.nose,
            Region::Mouth => &self.mouth,
        }
    }

    /// Flatten a region's points into `[x0, y0, z0, x1, y1, z1, ...]`.
    pub fn flatten(&self, region: Region) -> Vec<f32> {
        self.region(region)
            .iter()
            .flat_map(|p| [p.x, p.y, p.z])
            .collect()
    }

    /// Check that every region holds exactly as many points as its index table.
    pub fn check_shape(&self) -> Result<(), ShapeMismatch> {
        for region in Region::ALL {
            let expected = region.mesh_indices().len();
            let actual = self.region(region).len();
            if actual != expected {
                return Err(ShapeMismatch {
                    region,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Per-region cosine similarity against `other`, in `Region::ALL` order.
    pub fn region_similarities(&self, other: &LandmarkSet) -> [f32; 4] {
        Region::ALL.map(|region| cosine_similarity(&self.flatten(region), &other.flatten(region)))
    }

    /// Unweighted mean of the per-region cosine similarities, in [-1, 1].
    pub fn similarity(&self, other: &LandmarkSet) -> f32 {
        mean(&self.region_similarities(other))
    }
}

/// Cosine similarity between two vectors.
///
/// Returns a value in [-1, 1], or 0.0 when either vector has zero norm.
/// Extra trailing elements of the longer vector are ignored.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 {
        (dot / denom).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Arithmetic mean; an empty slice averages to 0.0.
pub fn mean(scores: &[f32]) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f32>() / scores.len() as f32
}

/// Outcome of comparing a live landmark set against a stored one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Average region similarity in [-1, 1].
    pub similarity: f32,
}

/// Strategy for deciding whether a live set matches a stored set.
pub trait Matcher {
    fn compare(&self, live: &LandmarkSet, stored: &LandmarkSet, threshold: f32) -> MatchResult;
}

/// Averages cosine similarity over the four regions; matches strictly above
/// the threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionCosineMatcher;

impl Matcher for RegionCosineMatcher {
    fn compare(&self, live: &LandmarkSet, stored: &LandmarkSet, threshold: f32) -> MatchResult {
        let similarity = live.similarity(stored);
        MatchResult {
            matched: similarity > threshold,
            similarity,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_set() -> LandmarkSet {
        LandmarkSet {
            left_eye: vec![Point3::new(0.38, 0.42, -0.02), Point3::new(0.45, 0.43, -0.01)],
            right_eye: vec![Point3::new(0.55, 0.43, -0.01), Point3::new(0.62, 0.42, -0.02)],
            nose: vec![
                Point3::new(0.50, 0.55, -0.06),
                Point3::new(0.50, 0.58, -0.04),
                Point3::new(0.46, 0.56, -0.02),
            ],
            mouth: vec![Point3::new(0.43, 0.67, -0.01), Point3::new(0.57, 0.67, -0.01)],
        }
    }

    fn synthetic_mesh() -> Vec<Point3> {
        (0..MESH_POINT_COUNT)
            .map(|i| Point3::new(i as f32, i as f32 * 0.5, -(i as f32)))
            .collect()
    }

    #[test]
    fn test_from_mesh_selects_region_indices() {
        let set = LandmarkSet::from_mesh(&synthetic_mesh()).unwrap();
        assert_eq!(set.left_eye.iter().map(|p| p.x).collect::<Vec<_>>(), vec![33.0, 133.0]);
        assert_eq!(set.right_eye.iter().map(|p| p.x).collect::<Vec<_>>(), vec![362.0, 263.0]);
        assert_eq!(set.nose.iter().map(|p| p.x).collect::<Vec<_>>(), vec![1.0, 2.0, 98.0]);
        assert_eq!(set.mouth.iter().map(|p| p.x).collect::<Vec<_>>(), vec![61.0, 291.0]);
        assert!(set.check_shape().is_ok());
    }

    #[test]
    fn test_from_mesh_too_short() {
        let mesh = synthetic_mesh();
        assert!(LandmarkSet::from_mesh(&mesh[..300]).is_none());
        assert!(LandmarkSet::from_mesh(&[]).is_none());
    }

    #[test]
    fn test_flatten_order() {
        let set = sample_set();
        assert_eq!(set.flatten(Region::Mouth), vec![0.43, 0.67, -0.01, 0.57, 0.67, -0.01]);
        assert_eq!(set.flatten(Region::Nose).len(), 9);
    }

    #[test]
    fn test_check_shape_mismatch() {
        let mut set = sample_set();
        set.nose.pop();
        let err = set.check_shape().unwrap_err();
        assert_eq!(err.region, Region::Nose);
        assert_eq!(err.expected, 3);
        assert_eq!(err.actual, 2);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(sample_set()).unwrap();
        assert_eq!(json["left_eye"][0].as_array().unwrap().len(), 3);
        assert_eq!(json["nose"].as_array().unwrap().len(), 3);
        let back: LandmarkSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample_set());
    }

    #[test]
    fn test_partial_set_rejected_by_serde() {
        let json = r#"{"left_eye": [[0.1, 0.2, 0.3], [0.1, 0.2, 0.3]], "right_eye": []}"#;
        assert!(serde_json::from_str::<LandmarkSet>(json).is_err());
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = [1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_mean_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert!((mean(&[0.5, 1.0]) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_self_similarity_is_one() {
        let set = sample_set();
        assert!((set.similarity(&set) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_symmetric() {
        let a = sample_set();
        let mut b = sample_set();
        b.left_eye[0].x = 0.30;
        b.nose[2].z = 0.04;
        b.mouth[1].y = 0.71;
        assert_eq!(a.similarity(&b), b.similarity(&a));
    }

    #[test]
    fn test_similarity_bounded() {
        let a = sample_set();
        let mut negated = sample_set();
        for region in [&mut negated.left_eye, &mut negated.right_eye, &mut negated.nose, &mut negated.mouth] {
            for p in region.iter_mut() {
                *p = Point3::new(-p.x, -p.y, -p.z);
            }
        }
        let sim = a.similarity(&negated);
        assert!((sim + 1.0).abs() < 1e-6);
        assert!((-1.0..=1.0).contains(&sim));
    }

    #[test]
    fn test_matcher_threshold_is_strict() {
        let set = sample_set();
        let hit = RegionCosineMatcher.compare(&set, &set, 0.6);
        assert!(hit.matched);
        assert!((hit.similarity - 1.0).abs() < 1e-6);

        // A similarity equal to the threshold does not match.
        let exact = RegionCosineMatcher.compare(&set, &set, hit.similarity);
        assert!(!exact.matched);
    }
}
