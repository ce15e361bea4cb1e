//! Core runtime configuration.
//!
//! Resolved once at process startup and passed into the engines. Request
//! handlers never read environment variables; that keeps behaviour
//! consistent across multi-threaded runtimes and test harnesses.

use std::path::{Path, PathBuf};

use crate::error::{HmsError, HmsResult};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    attachments_dir: PathBuf,
    insurance_url: String,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// `insurance_url` is the base URL of the insurance validation service;
    /// the client derives the validate endpoint from it.
    pub fn new(attachments_dir: PathBuf, insurance_url: String) -> HmsResult<Self> {
        if insurance_url.trim().is_empty() {
            return Err(HmsError::InvalidArgument(
                "insurance_url cannot be empty".into(),
            ));
        }

        Ok(Self {
            attachments_dir,
            insurance_url,
        })
    }

    pub fn attachments_dir(&self) -> &Path {
        &self.attachments_dir
    }

    pub fn insurance_url(&self) -> &str {
        &self.insurance_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_insurance_url() {
        let result = CoreConfig::new(PathBuf::from("/tmp"), "  ".into());
        assert!(matches!(result, Err(HmsError::InvalidArgument(_))));
    }

    #[test]
    fn test_accessors() {
        let cfg = CoreConfig::new(
            PathBuf::from("/data/attachments"),
            "http://localhost:8000/insurance/validate".into(),
        )
        .unwrap();
        assert_eq!(cfg.attachments_dir(), Path::new("/data/attachments"));
        assert!(cfg.insurance_url().ends_with("/validate"));
    }
}
