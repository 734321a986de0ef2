//! Scoped local storage for downloaded documents.

use std::path::Path;
use tempfile::NamedTempFile;

/// A downloaded document on local disk. The file is deleted when this is dropped.
pub struct StagedDocument {
    file: NamedTempFile,
    file_name: String,
}

/// Create the staging directory. Run once at startup.
pub async fn prepare_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await
}

impl StagedDocument {
    /// Reserve a staging file in `dir`, which must already exist.
    pub fn create_in(dir: &Path, file_name: &str) -> std::io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("docchat-")
            .suffix(&staging_suffix(file_name))
            .tempfile_in(dir)?;

        Ok(Self {
            file,
            file_name: file_name.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Name the user gave the document.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Read the staged bytes.
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(self.path()).await
    }
}

/// Keep the extension on the staged file; the rest of the user's name is not trusted.
fn staging_suffix(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}
