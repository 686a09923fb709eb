//! Persisted landmark file: user id → stored landmark set or `null`.

use crate::types::{LandmarkSet, ShapeMismatch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("landmark file not found: {0}; run `vigil generate` first")]
    NotFound(String),
    #[error("failed to access landmark file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("bad landmark JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed landmarks for user {user}: {source}")]
    Malformed {
        user: String,
        source: ShapeMismatch,
    },
}

/// Mapping from user id to stored landmarks, as written by the generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkFile {
    entries: BTreeMap<String, Option<LandmarkSet>>,
}

impl LandmarkFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entries, rejecting sets whose region shapes are wrong.
    pub fn from_entries(entries: BTreeMap<String, Option<LandmarkSet>>) -> Result<Self, StoreError> {
        let file = Self { entries };
        file.validate()?;
        Ok(file)
    }

    /// Read and validate a landmark file.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let src = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(path.display().to_string())
            } else {
                StoreError::Io {
                    path: path.display().to_string(),
                    source,
                }
            }
        })?;
        Self::from_json(&src)
    }

    pub fn from_json(src: &str) -> Result<Self, StoreError> {
        let file: LandmarkFile = serde_json::from_str(src)?;
        file.validate()?;
        Ok(file)
    }

    /// Write the file as pretty-printed JSON, replacing any previous version.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn insert(&mut self, user_id: impl Into<String>, set: Option<LandmarkSet>) {
        self.entries.insert(user_id.into(), set);
    }

    pub fn get(&self, user_id: &str) -> Option<&Option<LandmarkSet>> {
        self.entries.get(user_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Option<LandmarkSet>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn validate(&self) -> Result<(), StoreError> {
        for (user, set) in &self.entries {
            if let Some(set) = set {
                set.check_shape().map_err(|source| StoreError::Malformed {
                    user: user.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}
