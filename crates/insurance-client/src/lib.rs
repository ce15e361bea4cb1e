//! HTTP client for the BHYT insurance validation service.
//!
//! The one hard rule of this client: [`InsuranceClient::validate`] never
//! returns an error. An unreachable service, a timeout or a malformed reply
//! all come back as an ordinary [`ValidationOutcome`] whose `failure` field
//! says what went wrong, so patient-side writes can record the degraded
//! verdict instead of aborting.

use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Upper bound on one validation round trip, connect included.
pub const VALIDATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Returns true for the canonical BHYT card number shape: exactly 2 ASCII
/// uppercase letters followed by 13 digits. Checked locally before any
/// network traffic.
pub fn is_well_formed_card_number(card_number: &str) -> bool {
    let bytes = card_number.as_bytes();
    bytes.len() == 15
        && bytes[..2].iter().all(u8::is_ascii_uppercase)
        && bytes[2..].iter().all(u8::is_ascii_digit)
}

#[derive(Debug, Serialize)]
struct ValidationRequest<'a> {
    card_number: &'a str,
    date_of_birth: NaiveDate,
}

/// Wire shape of the service's validation reply.
#[derive(Debug, Clone, Deserialize)]
struct ValidationReply {
    is_valid: bool,
    message: String,
    #[serde(default)]
    card_info: Option<serde_json::Value>,
    #[serde(default)]
    coverage_percentage: Option<u8>,
}

/// Why a validation could not produce a real verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The card number failed the local format check; no request was sent.
    MalformedCardNumber,
    /// The service could not be reached or answered unusably.
    Unavailable(String),
}

/// Result of one validation attempt.
///
/// `valid` is only ever true for a confirmed card. When `failure` is set the
/// verdict is degraded, not negative: the card may well be fine.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub message: String,
    pub card_info: Option<serde_json::Value>,
    pub coverage_percentage: Option<u8>,
    pub failure: Option<FailureReason>,
}

impl ValidationOutcome {
    fn unavailable(detail: String) -> Self {
        Self {
            valid: false,
            message: format!("Không thể kết nối dịch vụ BHYT: {detail}"),
            card_info: None,
            coverage_percentage: None,
            failure: Some(FailureReason::Unavailable(detail)),
        }
    }
}

/// Errors constructing the client itself. Validation calls never error.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("insurance endpoint must not be empty")]
    EmptyEndpoint,
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Client for the insurance service's validation endpoint.
#[derive(Debug, Clone)]
pub struct InsuranceClient {
    http: reqwest::Client,
    endpoint: String,
}

impl InsuranceClient {
    /// Builds a client against the service base URL
    /// (e.g. `http://localhost:8002`).
    ///
    /// # Errors
    ///
    /// [`ClientError`] for an empty base URL or a TLS/backend setup failure.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base = base_url.trim_end_matches('/');
        if base.is_empty() {
            return Err(ClientError::EmptyEndpoint);
        }
        let http = reqwest::Client::builder()
            .timeout(VALIDATION_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{base}/api/v1/insurance/validate"),
        })
    }

    /// Validates a card against the remote service. Infallible by contract:
    /// malformed input short-circuits locally, and transport or decoding
    /// trouble yields an [`FailureReason::Unavailable`] outcome.
    pub async fn validate(&self, card_number: &str, date_of_birth: NaiveDate) -> ValidationOutcome {
        if !is_well_formed_card_number(card_number) {
            return ValidationOutcome {
                valid: false,
                message:
                    "Số thẻ BHYT không đúng định dạng (phải có 15 ký tự: 2 chữ cái + 13 số)"
                        .to_string(),
                card_info: None,
                coverage_percentage: None,
                failure: Some(FailureReason::MalformedCardNumber),
            };
        }

        let request = ValidationRequest {
            card_number,
            date_of_birth,
        };
        let response = match self.http.post(&self.endpoint).json(&request).send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "insurance service unreachable");
                return ValidationOutcome::unavailable(err.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, "insurance service returned an error status");
            return ValidationOutcome::unavailable(format!("HTTP {status}"));
        }

        match response.json::<ValidationReply>().await {
            Ok(reply) => ValidationOutcome {
                valid: reply.is_valid,
                message: reply.message,
                card_info: reply.card_info,
                coverage_percentage: reply.coverage_percentage,
                failure: None,
            },
            Err(err) => {
                tracing::warn!(error = %err, "insurance service reply did not parse");
                ValidationOutcome::unavailable(format!("bad reply: {err}"))
            }
        }
    }
}
