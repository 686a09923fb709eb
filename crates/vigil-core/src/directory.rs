//! User directory.
//!
//! The user table lives in `data/users.toml` and is embedded at compile time.
//! A different dataset file can be supplied at runtime with the same schema.

use crate::store::LandmarkFile;
use crate::types::LandmarkSet;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Compile-time embedded default dataset.
const EMBEDDED_USERS: &str = include_str!("../../../data/users.toml");

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("failed to read dataset {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("bad dataset TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate user id in dataset: {0}")]
    DuplicateId(String),
}

/// A user record as declared in the dataset, plus landmarks attached at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub national_id: String,
    pub tax_id: String,
    pub passport: String,
    /// Reference photo filename, relative to the generator's photo directory.
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(skip)]
    pub landmarks: Option<LandmarkSet>,
}

impl UserRecord {
    pub fn documents(&self) -> [&str; 3] {
        [&self.national_id, &self.tax_id, &self.passport]
    }

    /// Name-and-document match against already normalized inputs.
    fn matches(&self, name: &str, document: &str) -> bool {
        self.name.to_lowercase() == name
            && self
                .documents()
                .iter()
                .any(|doc| normalize_document(doc) == document)
    }
}

#[derive(Debug, Deserialize)]
struct DatasetFile {
    #[serde(default)]
    users: Vec<UserRecord>,
}

/// Ordered user table. Table order is scan order; the first match wins.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: Vec<UserRecord>,
}

impl UserDirectory {
    /// The dataset compiled into the binary.
    pub fn embedded() -> Result<Self, DatasetError> {
        Self::from_toml(EMBEDDED_USERS)
    }

    /// Load a dataset file from disk.
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let src = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&src)
    }

    /// Load from `path` when given, else the embedded dataset.
    pub fn load_or_embedded(path: Option<&Path>) -> Result<Self, DatasetError> {
        match path {
            Some(p) => Self::load(p),
            None => Self::embedded(),
        }
    }

    pub fn from_toml(src: &str) -> Result<Self, DatasetError> {
        let file: DatasetFile = toml::from_str(src)?;
        Self::from_records(file.users)
    }

    pub fn from_records(users: Vec<UserRecord>) -> Result<Self, DatasetError> {
        for (i, user) in users.iter().enumerate() {
            if users[..i].iter().any(|u| u.id == user.id) {
                return Err(DatasetError::DuplicateId(user.id.clone()));
            }
        }
        Ok(Self { users })
    }

    pub fn users(&self) -> &[UserRecord] {
        &self.users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.id == id)
    }

    /// Attach stored landmarks by user id. Returns how many users received a set.
    ///
    /// Ids unknown to the directory are ignored. A `null` entry leaves the
    /// user without landmarks.
    pub fn attach_landmarks(&mut self, file: &LandmarkFile) -> usize {
        let mut attached = 0;
        for (id, set) in file.iter() {
            match self.users.iter_mut().find(|u| u.id == *id) {
                Some(user) => {
                    user.landmarks = set.clone();
                    if set.is_some() {
                        attached += 1;
                    }
                }
                None => tracing::debug!(user_id = %id, "landmark entry for unknown user ignored"),
            }
        }
        attached
    }

    /// Find the first user whose name and any document identifier match.
    ///
    /// Name comparison is trimmed and case-insensitive; document comparison
    /// uses [`normalize_document`].
    pub fn lookup(&self, name: &str, document_number: &str) -> Option<&UserRecord> {
        let name = normalize_name(name);
        let document = normalize_document(document_number);
        self.users.iter().find(|u| u.matches(&name, &document))
    }
}

/// Trim, drop every space, uppercase.
pub fn normalize_document(doc: &str) -> String {
    doc.trim().replace(' ', "").to_uppercase()
}

/// Trim and lowercase.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
