use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::DownloadFailure;

const PDF_MAGIC: &[u8] = b"%PDF";

/// Size and content hash of a verified artifact
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFingerprint {
    /// File size in bytes
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the file contents
    pub sha256: String,
}

/// Check that a reported artifact is really there and plausible
///
/// The file must exist, be a regular non-empty file and, if it carries a
/// `.pdf` extension, start with the PDF magic bytes. Anything else is a
/// [`FailureKind::Corrupted`](crate::error::FailureKind::Corrupted) failure.
pub async fn verify_artifact(path: &Path) -> Result<ArtifactFingerprint, DownloadFailure> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| {
        DownloadFailure::corrupted(format!("artifact {} is missing: {e}", path.display()))
    })?;
    if !metadata.is_file() {
        return Err(DownloadFailure::corrupted(format!(
            "artifact {} is not a regular file",
            path.display()
        )));
    }
    if metadata.len() == 0 {
        return Err(DownloadFailure::corrupted(format!(
            "artifact {} is empty",
            path.display()
        )));
    }

    let bytes = tokio::fs::read(path).await.map_err(|e| {
        DownloadFailure::corrupted(format!("artifact {} is unreadable: {e}", path.display()))
    })?;

    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if is_pdf && !bytes.starts_with(PDF_MAGIC) {
        return Err(DownloadFailure::corrupted(format!(
            "artifact {} does not look like a PDF",
            path.display()
        )));
    }

    Ok(ArtifactFingerprint {
        size_bytes: bytes.len() as u64,
        sha256: format!("{:x}", Sha256::digest(&bytes)),
    })
}
