use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{RecordsError, RecordsResult};

/// Buckets file-upload fields may point at.
pub const BUCKETS: &[&str] = &[
    "employee-photos",
    "employee-lor",
    "student-photos",
    "student-documents",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub url: String,
    pub path: String,
    pub sha256: String,
    pub size: u64,
}

/// Content-addressed file store rooted in the workspace.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Stores `bytes` at `<bucket>/<entity>/<id>/<sha256>.<ext>`; uploading the same
    /// content twice yields the same url.
    pub fn upload(
        &self,
        bucket: &str,
        entity_type: &str,
        entity_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> RecordsResult<StoredFile> {
        if !BUCKETS.contains(&bucket) {
            return Err(RecordsError::BadInput(format!("unknown storage bucket: {bucket}")));
        }
        for (what, part) in [("entity type", entity_type), ("entity id", entity_id)] {
            if !is_path_segment(part) {
                return Err(RecordsError::BadInput(format!("invalid {what}: {part:?}")));
            }
        }

        let digest = format!("{:x}", Sha256::digest(bytes));
        let stored_name = match extension_of(file_name) {
            Some(ext) => format!("{digest}.{ext}"),
            None => digest.clone(),
        };
        let rel = format!("{bucket}/{entity_type}/{entity_id}/{stored_name}");
        let dest = self.root.join(&rel);
        write_file(&dest, bytes).map_err(|e| RecordsError::Persistence(format!("{e:#}")))?;
        info!(bucket, entity_type, entity_id, size = bytes.len(), "file stored");

        Ok(StoredFile {
            url: format!("storage://{rel}"),
            path: dest.to_string_lossy().to_string(),
            sha256: digest,
            size: bytes.len() as u64,
        })
    }

    pub fn upload_from_path(
        &self,
        bucket: &str,
        entity_type: &str,
        entity_id: &str,
        source: &Path,
    ) -> RecordsResult<StoredFile> {
        let bytes = std::fs::read(source).map_err(|e| {
            RecordsError::BadInput(format!("failed to read {}: {e}", source.to_string_lossy()))
        })?;
        let file_name = source
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        self.upload(bucket, entity_type, entity_id, file_name, &bytes)
    }
}

fn write_file(dest: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    std::fs::write(dest, bytes)
        .with_context(|| format!("failed to write {}", dest.to_string_lossy()))?;
    Ok(())
}

fn is_path_segment(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn extension_of(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}
