//! HMS error taxonomy.
//!
//! One error enum covers every engine; the API layer maps each kind to an
//! HTTP status. Reference-resolution failures (`NotFound`) abort a
//! multi-step write before anything is persisted, and `Upstream` failures
//! from the insurance client are folded into the document's notes by the
//! caller rather than surfaced to the end user.

use hms_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum HmsError {
    /// A referenced patient, drug, order, prescription or result is missing.
    #[error("{0}")]
    NotFound(String),

    /// A unique key (drug code, patient email/phone, card number) is taken.
    #[error("{0}")]
    Conflict(String),

    /// Malformed identifier, malformed date, unknown enum value,
    /// non-positive quantity, and similar request-shape failures.
    #[error("{0}")]
    InvalidArgument(String),

    /// A status change not permitted from the document's current state.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// The insurance validation service is unreachable or failing.
    ///
    /// Never fatal to the caller's own write: the surrounding flow converts
    /// this into a recorded note on the document.
    #[error("insurance service unavailable: {0}")]
    Upstream(String),

    /// Storage-layer failure that is not a domain condition.
    #[error("storage error: {0}")]
    Storage(String),

    /// Attachment storage failure.
    #[error(transparent)]
    Files(#[from] hms_files::FilesError),
}

pub type HmsResult<T> = std::result::Result<T, HmsError>;

impl From<StoreError> for HmsError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => HmsError::NotFound(format!("document {id} not found")),
            StoreError::IdExists(id) => HmsError::Conflict(format!("document {id} already exists")),
            StoreError::DuplicateKey { index, value } => {
                HmsError::Conflict(format!("duplicate {index}: {value}"))
            }
            StoreError::Poisoned => HmsError::Storage("collection lock poisoned".into()),
        }
    }
}

impl From<hms_id::IdError> for HmsError {
    fn from(err: hms_id::IdError) -> Self {
        HmsError::InvalidArgument(err.to_string())
    }
}
