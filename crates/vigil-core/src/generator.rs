//! Offline landmark generation over the dataset's reference photos.
//!
//! Per-entry failures never abort the batch: a missing photo records
//! nothing, an unreadable photo, a photo without a face, or an extractor
//! failure records `null`.

use crate::directory::UserDirectory;
use crate::extractor::LandmarkExtractor;
use crate::store::LandmarkFile;
use std::path::Path;

/// Per-batch outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateSummary {
    pub processed: usize,
    pub no_face: usize,
    pub failed: usize,
    pub missing: usize,
}

/// Extract landmarks for every user that names a reference photo.
pub fn generate<E: LandmarkExtractor + ?Sized>(
    directory: &UserDirectory,
    photo_dir: &Path,
    extractor: &mut E,
) -> (LandmarkFile, GenerateSummary) {
    let mut file = LandmarkFile::new();
    let mut summary = GenerateSummary::default();

    for user in directory.users() {
        let Some(filename) = user.photo.as_deref() else {
            tracing::debug!(user_id = %user.id, "no reference photo declared");
            continue;
        };
        let path = photo_dir.join(filename);

        if !path.exists() {
            tracing::error!(user_id = %user.id, path = %path.display(), "reference photo not found");
            summary.missing += 1;
            continue;
        }

        let image = match image::open(&path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                tracing::error!(user_id = %user.id, file = filename, error = %e, "failed to read reference photo");
                file.insert(user.id.clone(), None);
                summary.failed += 1;
                continue;
            }
        };

        match extractor.extract(&image) {
            Ok(Some(set)) => {
                tracing::info!(user_id = %user.id, file = filename, "processed landmarks");
                file.insert(user.id.clone(), Some(set));
                summary.processed += 1;
            }
            Ok(None) => {
                tracing::warn!(user_id = %user.id, file = filename, "no face detected");
                file.insert(user.id.clone(), None);
                summary.no_face += 1;
            }
            Err(e) => {
                tracing::error!(user_id = %user.id, file = filename, error = %e, "failed to process reference photo");
                file.insert(user.id.clone(), None);
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        processed = summary.processed,
        no_face = summary.no_face,
        failed = summary.failed,
        missing = summary.missing,
        "landmark generation finished"
    );

    (file, summary)
}
