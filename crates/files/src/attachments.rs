//! Per-order attachment storage implementation.
//!
//! [`AttachmentStore`] is scoped to a single attachments root resolved at
//! startup; every operation beneath it is keyed by the owning order's
//! identifier. The store is stateless (safe to share behind an `Arc`) and
//! performs validation eagerly in the constructor.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use hms_id::DocId;

use crate::FilesError;

/// Fallback name when sanitisation leaves nothing usable.
const UNNAMED: &str = "attachment";

/// Metadata for a stored attachment.
///
/// This record is embedded into the owning service-result document. It never
/// contains an absolute path; the stored name plus the order identifier is
/// enough to locate the bytes under any attachments root.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct StoredAttachment {
    /// File name as supplied by the uploader, before sanitisation.
    pub original_filename: String,

    /// Unique on-disk name: `<millis>_<sanitised original>`.
    pub stored_filename: String,

    /// Size of the stored content in bytes.
    pub size_bytes: u64,

    /// Best-effort media type detected from the content, if recognisable.
    pub media_type: Option<String>,

    /// Hexadecimal SHA-256 digest of the content.
    pub sha256: String,

    /// UTC timestamp when the attachment was stored.
    pub stored_at: DateTime<Utc>,
}

/// Filesystem-backed store for CLS result attachments.
///
/// One instance serves the whole process; files are grouped by order
/// identifier in a flat directory per order.
#[derive(Debug)]
pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    /// Creates a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidRoot`] if `root` does not exist, is not a
    /// directory, or cannot be canonicalised.
    pub fn new(root: &Path) -> Result<Self, FilesError> {
        if !root.exists() {
            return Err(FilesError::InvalidRoot(format!(
                "directory does not exist: {}",
                root.display()
            )));
        }
        if !root.is_dir() {
            return Err(FilesError::InvalidRoot(format!(
                "path is not a directory: {}",
                root.display()
            )));
        }
        let root = root.canonicalize().map_err(|e| {
            FilesError::InvalidRoot(format!("cannot canonicalize {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    /// Stores one attachment for an order and returns its metadata.
    ///
    /// The original name is sanitised and prefixed with the current
    /// millisecond timestamp; the order's directory is created on first use.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::Io`] if the directory or file cannot be written.
    pub fn save(
        &self,
        order_id: &DocId,
        original_filename: &str,
        bytes: &[u8],
    ) -> Result<StoredAttachment, FilesError> {
        let stored_at = Utc::now();
        let sanitised = sanitize_filename(original_filename);
        let stored_filename = format!("{}_{}", stored_at.timestamp_millis(), sanitised);

        let order_dir = self.order_dir(order_id);
        fs::create_dir_all(&order_dir)?;
        fs::write(order_dir.join(&stored_filename), bytes)?;

        let sha256 = hex::encode(Sha256::digest(bytes));
        let media_type = infer::get(bytes).map(|kind| kind.mime_type().to_string());

        Ok(StoredAttachment {
            original_filename: original_filename.to_string(),
            stored_filename,
            size_bytes: bytes.len() as u64,
            media_type,
            sha256,
            stored_at,
        })
    }

    /// Reads a previously stored attachment back.
    ///
    /// # Errors
    ///
    /// * [`FilesError::InvalidName`] if `stored_filename` contains path
    ///   components (it must be a bare name produced by [`Self::save`]).
    /// * [`FilesError::NotFound`] if no such attachment exists for the order.
    /// * [`FilesError::Io`] on read failure.
    pub fn read(&self, order_id: &DocId, stored_filename: &str) -> Result<Vec<u8>, FilesError> {
        if stored_filename != sanitize_filename(stored_filename) {
            return Err(FilesError::InvalidName(stored_filename.to_string()));
        }

        let path = self.order_dir(order_id).join(stored_filename);
        if !path.is_file() {
            return Err(FilesError::NotFound(format!(
                "{}/{}",
                order_id, stored_filename
            )));
        }
        Ok(fs::read(&path)?)
    }

    /// Lists the stored names for an order, oldest first.
    ///
    /// Orders without any attachments yield an empty list rather than an
    /// error — the per-order directory only exists after the first save.
    pub fn list(&self, order_id: &DocId) -> Result<Vec<String>, FilesError> {
        let order_dir = self.order_dir(order_id);
        if !order_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&order_dir)? {
            let entry = entry?;
            if entry.path().is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn order_dir(&self, order_id: &DocId) -> PathBuf {
        self.root.join(order_id.to_string())
    }
}

/// Strips path separators and parent-directory sequences from an uploaded
/// file name, leaving a single safe path component.
///
/// Empty or fully stripped names become `attachment`.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .collect::<Vec<_>>()
        .join("_")
        .replace("..", "_");

    if cleaned.is_empty() {
        UNNAMED.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> AttachmentStore {
        AttachmentStore::new(temp.path()).unwrap()
    }

    #[test]
    fn test_new_rejects_missing_root() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        assert!(matches!(
            AttachmentStore::new(&missing),
            Err(FilesError::InvalidRoot(_))
        ));
    }

    #[test]
    fn test_new_rejects_file_root() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a-file");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            AttachmentStore::new(&file),
            Err(FilesError::InvalidRoot(_))
        ));
    }

    #[test]
    fn test_save_and_read_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let order = DocId::new();

        let meta = store.save(&order, "report.pdf", b"pdf bytes").unwrap();
        assert_eq!(meta.original_filename, "report.pdf");
        assert!(meta.stored_filename.ends_with("_report.pdf"));
        assert_eq!(meta.size_bytes, 9);
        assert_eq!(meta.sha256.len(), 64);

        let bytes = store.read(&order, &meta.stored_filename).unwrap();
        assert_eq!(bytes, b"pdf bytes");
    }

    #[test]
    fn test_save_detects_media_type() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let order = DocId::new();

        let png_header = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        let meta = store.save(&order, "slide.png", &png_header).unwrap();
        assert_eq!(meta.media_type.as_deref(), Some("image/png"));

        let meta = store.save(&order, "notes.txt", b"just text").unwrap();
        assert_eq!(meta.media_type, None);
    }

    #[test]
    fn test_save_same_name_twice_keeps_both() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let order = DocId::new();

        let first = store.save(&order, "report.pdf", b"v1").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = store.save(&order, "report.pdf", b"v2").unwrap();

        assert_ne!(first.stored_filename, second.stored_filename);
        assert_eq!(store.read(&order, &first.stored_filename).unwrap(), b"v1");
        assert_eq!(store.read(&order, &second.stored_filename).unwrap(), b"v2");
    }

    #[test]
    fn test_orders_are_isolated() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let order_a = DocId::new();
        let order_b = DocId::new();

        let meta = store.save(&order_a, "a.txt", b"a").unwrap();
        assert!(matches!(
            store.read(&order_b, &meta.stored_filename),
            Err(FilesError::NotFound(_))
        ));
        assert_eq!(store.list(&order_b).unwrap().len(), 0);
        assert_eq!(store.list(&order_a).unwrap().len(), 1);
    }

    #[test]
    fn test_read_rejects_path_components() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let order = DocId::new();

        assert!(matches!(
            store.read(&order, "../../etc/passwd"),
            Err(FilesError::InvalidName(_))
        ));
        assert!(matches!(
            store.read(&order, "sub/file.txt"),
            Err(FilesError::InvalidName(_))
        ));
    }

    #[test]
    fn test_sanitize_filename_strips_traversal() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("..\\..\\boot.ini"), "boot.ini");
        assert_eq!(sanitize_filename("a/b/c.txt"), "a_b_c.txt");
        assert_eq!(sanitize_filename("..."), "_.");
        assert_eq!(sanitize_filename(""), "attachment");
        assert_eq!(sanitize_filename("/././//"), "attachment");
    }

    #[test]
    fn test_metadata_serialises() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let order = DocId::new();

        let meta = store.save(&order, "report.pdf", b"bytes").unwrap();
        let json = serde_json::to_string(&meta).unwrap();
        let back: StoredAttachment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}
