//! Domain records and status vocabularies.
//!
//! These are the documents the engines persist, plus the enums that drive
//! the prescription and CLS-order state machines. Embedded value objects
//! (prescription items, drug snapshots, text results) are owned by their
//! parent document and never stored on their own.

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;

use hms_files::StoredAttachment;
use hms_id::DocId;
use hms_store::Document;

use crate::error::HmsError;

// ============================================================================
// STATUS VOCABULARIES
// ============================================================================

/// Prescription lifecycle.
///
/// Transitions: `draft -> {issued, canceled}`, `issued -> {dispensed,
/// canceled}`; `dispensed` and `canceled` are terminal. Requesting the
/// current state is a no-op, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
    Draft,
    Issued,
    Dispensed,
    Canceled,
}

impl PrescriptionStatus {
    /// Returns true if a transition from `self` to `next` is allowed.
    /// Same-state "transitions" are not in the table; callers treat them as
    /// no-ops before consulting it.
    pub fn allows(self, next: Self) -> bool {
        use PrescriptionStatus::*;
        matches!(
            (self, next),
            (Draft, Issued) | (Draft, Canceled) | (Issued, Dispensed) | (Issued, Canceled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PrescriptionStatus::Draft => "draft",
            PrescriptionStatus::Issued => "issued",
            PrescriptionStatus::Dispensed => "dispensed",
            PrescriptionStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for PrescriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrescriptionStatus {
    type Err = HmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PrescriptionStatus::Draft),
            "issued" => Ok(PrescriptionStatus::Issued),
            "dispensed" => Ok(PrescriptionStatus::Dispensed),
            "canceled" => Ok(PrescriptionStatus::Canceled),
            other => Err(HmsError::InvalidArgument(format!(
                "unknown prescription status '{other}'"
            ))),
        }
    }
}

/// CLS order lifecycle.
///
/// Transitions: `ordered -> {in_progress, completed, canceled}`,
/// `in_progress -> {completed, canceled}`; `completed` and `canceled` are
/// terminal. Result ingestion is the one sanctioned shortcut straight to
/// `completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Ordered,
    InProgress,
    Completed,
    Canceled,
}

impl OrderStatus {
    /// Returns true if a transition from `self` to `next` is allowed.
    pub fn allows(self, next: Self) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Ordered, InProgress)
                | (Ordered, Completed)
                | (Ordered, Canceled)
                | (InProgress, Completed)
                | (InProgress, Canceled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Ordered => "ordered",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Completed => "completed",
            OrderStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = HmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ordered" => Ok(OrderStatus::Ordered),
            "in_progress" => Ok(OrderStatus::InProgress),
            "completed" => Ok(OrderStatus::Completed),
            "canceled" => Ok(OrderStatus::Canceled),
            other => Err(HmsError::InvalidArgument(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

/// CLS order priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderPriority {
    Normal,
    Urgent,
}

impl Default for OrderPriority {
    fn default() -> Self {
        OrderPriority::Normal
    }
}

impl FromStr for OrderPriority {
    type Err = HmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(OrderPriority::Normal),
            "urgent" => Ok(OrderPriority::Urgent),
            other => Err(HmsError::InvalidArgument(format!(
                "unknown order priority '{other}' (expected normal or urgent)"
            ))),
        }
    }
}

/// Public status vocabulary of the technician listing view.
///
/// `waiting` maps to the internal `ordered` state; the other two are
/// pass-through. An unrecognised value is a validation error, never a
/// silently empty listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabStatusFilter {
    Waiting,
    InProgress,
    Completed,
}

impl LabStatusFilter {
    /// The internal order status this public value selects.
    pub fn order_status(self) -> OrderStatus {
        match self {
            LabStatusFilter::Waiting => OrderStatus::Ordered,
            LabStatusFilter::InProgress => OrderStatus::InProgress,
            LabStatusFilter::Completed => OrderStatus::Completed,
        }
    }
}

impl FromStr for LabStatusFilter {
    type Err = HmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(LabStatusFilter::Waiting),
            "in_progress" => Ok(LabStatusFilter::InProgress),
            "completed" => Ok(LabStatusFilter::Completed),
            other => Err(HmsError::InvalidArgument(format!(
                "unknown lab status '{other}' (expected waiting, in_progress or completed)"
            ))),
        }
    }
}

/// Test-type facet of the technician listing view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestType {
    Hematology,
    Biochemistry,
    Imaging,
}

impl FromStr for TestType {
    type Err = HmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hematology" => Ok(TestType::Hematology),
            "biochemistry" => Ok(TestType::Biochemistry),
            "imaging" => Ok(TestType::Imaging),
            other => Err(HmsError::InvalidArgument(format!(
                "unknown test type '{other}' (expected hematology, biochemistry or imaging)"
            ))),
        }
    }
}

// ============================================================================
// PATIENTS
// ============================================================================

/// Insurance state embedded in a patient document.
///
/// Mutated only by the insurance-validation merge flow; its absence is a
/// valid state (insurance is optional).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct InsuranceInfo {
    pub card_number: String,
    pub is_validated: bool,
    pub validation_date: DateTime<Utc>,
    pub coverage_percentage: u8,
    /// Free text; a failed or degraded validation is recorded here instead
    /// of failing the surrounding write.
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct Patient {
    #[schema(value_type = String)]
    pub id: DocId,
    pub full_name: String,
    /// Unique across patients.
    pub phone: String,
    /// Unique across patients.
    pub email: String,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub insurance_info: Option<InsuranceInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Patient {
    fn id(&self) -> DocId {
        self.id
    }
}

// ============================================================================
// DRUG CATALOG
// ============================================================================

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct Drug {
    #[schema(value_type = String)]
    pub id: DocId,
    /// Unique across the catalog, including soft-deleted records.
    pub drug_code: String,
    pub name: String,
    pub dosage_form: String,
    pub strength: String,
    pub unit: String,
    pub route: String,
    /// Catalog price per unit; never negative.
    pub price: f64,
    /// Cleared instead of deleting the record; inactive drugs are invisible
    /// to new prescriptions but stay referenceable via historical snapshots.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Drug {
    fn id(&self) -> DocId {
        self.id
    }
}

// ============================================================================
// PRESCRIPTIONS
// ============================================================================

/// Denormalised copy of a drug's descriptive fields, embedded into a
/// prescription line at creation time so later catalog edits never change a
/// historical prescription.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct DrugSnapshot {
    pub drug_code: String,
    pub name: String,
    pub strength: String,
    pub dosage_form: String,
    pub unit: String,
}

/// One prescription line. Immutable after creation: `unit_price`,
/// `line_cost` and `drug_snapshot` are captured once and never recomputed.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct PrescriptionItem {
    #[schema(value_type = String)]
    pub drug_id: DocId,
    pub quantity: u32,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub route: Option<String>,
    pub instructions: Option<String>,
    pub unit_price: f64,
    pub line_cost: f64,
    pub drug_snapshot: DrugSnapshot,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct Prescription {
    #[schema(value_type = String)]
    pub id: DocId,
    #[schema(value_type = String)]
    pub patient_id: DocId,
    /// Opaque prescriber identifier; not resolved against any collection.
    pub doctor_id: String,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
    pub status: PrescriptionStatus,
    pub prescribed_date: DateTime<Utc>,
    pub items: Vec<PrescriptionItem>,
    /// Sum of line costs rounded to 2 decimals; write-once at creation.
    pub total_cost: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Prescription {
    fn id(&self) -> DocId {
        self.id
    }
}

// ============================================================================
// CLS ORDERS AND RESULTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ServiceOrderItem {
    pub service_code: String,
    pub service_name: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ServiceOrder {
    #[schema(value_type = String)]
    pub id: DocId,
    #[schema(value_type = String)]
    pub patient_id: DocId,
    pub doctor_id: String,
    pub order_date: DateTime<Utc>,
    pub priority: OrderPriority,
    pub status: OrderStatus,
    pub items: Vec<ServiceOrderItem>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for ServiceOrder {
    fn id(&self) -> DocId {
        self.id
    }
}

/// One structured text finding within a service result.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct TextResult {
    pub parameter: String,
    pub value: String,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
}

/// Result document for a CLS order.
///
/// At most one result exists per order (ingestion upserts on `order_id`);
/// its existence implies the owning order is `completed`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ServiceResult {
    #[schema(value_type = String)]
    pub id: DocId,
    #[schema(value_type = String)]
    pub order_id: DocId,
    pub result_date: DateTime<Utc>,
    pub modality: Option<String>,
    pub text_results: Vec<TextResult>,
    /// Append-only: repeat ingestions extend this list, never replace it.
    pub attachments: Vec<StoredAttachment>,
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for ServiceResult {
    fn id(&self) -> DocId {
        self.id
    }
}

// ============================================================================
// INSURANCE CARDS
// ============================================================================

/// A BHYT card registered with the validation service.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct InsuranceCard {
    #[schema(value_type = String)]
    pub id: DocId,
    /// 15 characters: 2 uppercase letters + 13 digits. Unique.
    pub card_number: String,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub address: String,
    pub issued_place: String,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
    pub coverage_percentage: u8,
    /// Card tier ("Hạng I" … "Hạng III"), used by the coverage matrix.
    pub hospital_level: String,
}

impl Document for InsuranceCard {
    fn id(&self) -> DocId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prescription_transition_table() {
        use PrescriptionStatus::*;

        assert!(Draft.allows(Issued));
        assert!(Draft.allows(Canceled));
        assert!(Issued.allows(Dispensed));
        assert!(Issued.allows(Canceled));

        assert!(!Draft.allows(Dispensed));
        assert!(!Issued.allows(Draft));
        assert!(!Dispensed.allows(Issued));
        assert!(!Dispensed.allows(Canceled));
        assert!(!Canceled.allows(Draft));
        assert!(!Canceled.allows(Issued));
    }

    #[test]
    fn test_order_transition_table() {
        use OrderStatus::*;

        assert!(Ordered.allows(InProgress));
        assert!(Ordered.allows(Completed));
        assert!(Ordered.allows(Canceled));
        assert!(InProgress.allows(Completed));
        assert!(InProgress.allows(Canceled));

        assert!(!InProgress.allows(Ordered));
        assert!(!Completed.allows(Ordered));
        assert!(!Completed.allows(Canceled));
        assert!(!Canceled.allows(InProgress));
    }

    #[test]
    fn test_status_serde_uses_snake_case() {
        let json = serde_json::to_string(&OrderStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let back: PrescriptionStatus = serde_json::from_str("\"dispensed\"").unwrap();
        assert_eq!(back, PrescriptionStatus::Dispensed);
    }

    #[test]
    fn test_status_parse_rejects_unknown() {
        assert!("pending".parse::<PrescriptionStatus>().is_err());
        assert!("WAITING".parse::<LabStatusFilter>().is_err());
        assert!("radiology".parse::<TestType>().is_err());
        assert!("stat".parse::<OrderPriority>().is_err());
        assert_eq!("urgent".parse::<OrderPriority>().ok(), Some(OrderPriority::Urgent));
    }

    #[test]
    fn test_lab_status_maps_waiting_to_ordered() {
        let filter: LabStatusFilter = "waiting".parse().unwrap();
        assert_eq!(filter.order_status(), OrderStatus::Ordered);
    }
}
