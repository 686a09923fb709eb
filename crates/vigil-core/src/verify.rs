//! Identity verification: directory lookup followed by landmark comparison.

use crate::directory::UserDirectory;
use crate::types::{LandmarkSet, Matcher, RegionCosineMatcher};
use thiserror::Error;

/// Average region similarity must exceed this to verify.
pub const SIMILARITY_THRESHOLD: f32 = 0.6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerifyError {
    #[error("user not found with the provided name and document number")]
    UserNotFound,
    #[error("no stored landmarks for user {0}")]
    MissingLandmarks(String),
    #[error("face similarity {similarity:.2} is below the threshold {threshold}")]
    Rejected { similarity: f32, threshold: f32 },
}

/// Successful verification.
#[derive(Debug, Clone, PartialEq)]
pub struct Verified {
    pub user_id: String,
    pub name: String,
    pub similarity: f32,
}

/// Read-only verifier over a user directory with attached landmarks.
pub struct Verifier<M = RegionCosineMatcher> {
    directory: UserDirectory,
    matcher: M,
    threshold: f32,
}

impl Verifier<RegionCosineMatcher> {
    pub fn new(directory: UserDirectory, threshold: f32) -> Self {
        Self::with_matcher(directory, RegionCosineMatcher, threshold)
    }
}

impl<M: Matcher> Verifier<M> {
    pub fn with_matcher(directory: UserDirectory, matcher: M, threshold: f32) -> Self {
        Self {
            directory,
            matcher,
            threshold,
        }
    }

    pub fn directory(&self) -> &UserDirectory {
        &self.directory
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Look up the claimed identity and compare its stored landmarks against
    /// the live set.
    pub fn verify(
        &self,
        name: &str,
        document_number: &str,
        live: &LandmarkSet,
    ) -> Result<Verified, VerifyError> {
        let user = self
            .directory
            .lookup(name, document_number)
            .ok_or(VerifyError::UserNotFound)?;

        let stored = user
            .landmarks
            .as_ref()
            .ok_or_else(|| VerifyError::MissingLandmarks(user.id.clone()))?;

        let result = self.matcher.compare(live, stored, self.threshold);
        tracing::debug!(user_id = %user.id, similarity = result.similarity, "compared landmarks");

        if !result.matched {
            return Err(VerifyError::Rejected {
                similarity: result.similarity,
                threshold: self.threshold,
            });
        }

        Ok(Verified {
            user_id: user.id.clone(),
            name: user.name.clone(),
            similarity: result.similarity,
        })
    }
}
