//! Attachment storage for CLS results.
//!
//! Result ingestion for ancillary-service (CLS) orders can carry binary file
//! attachments — scanned reports, imaging exports, instrument printouts. This
//! crate stores those files on disk, keeping the document store free of
//! binary payloads; the [`StoredAttachment`] metadata record is what gets
//! embedded into the result document.
//!
//! ## Storage layout
//!
//! Attachments live under a per-order directory beneath a single root:
//!
//! ```text
//! <attachments_root>/
//! └── <order_id>/                  # canonical 32-hex order identifier
//!     ├── 1717490000123_report.pdf
//!     └── 1717490003991_slide.png
//! ```
//!
//! ## Naming rules
//!
//! - Uploaded file names are sanitised: path separators and parent-directory
//!   sequences are stripped, so an upload can never escape its order
//!   directory.
//! - Stored names are made unique by prefixing the millisecond timestamp at
//!   storage time, so re-uploading the same name never overwrites an earlier
//!   attachment.
//!
//! A SHA-256 digest of the content is recorded in the metadata for later
//! integrity checks, and the media type is detected best-effort from the
//! bytes (never trusted from the upload).

mod attachments;

pub use attachments::{sanitize_filename, AttachmentStore, StoredAttachment};

/// Errors that can occur during attachment operations.
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Attachment root does not exist or is not a directory.
    #[error("invalid attachments root: {0}")]
    InvalidRoot(String),

    /// The requested attachment does not exist.
    #[error("attachment not found: {0}")]
    NotFound(String),

    /// The requested stored name contains path components and was refused.
    #[error("invalid attachment name: {0}")]
    InvalidName(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
