//! Prescription engine.
//!
//! Turns a set of drug references and quantities into an immutable,
//! cost-snapshotted prescription and drives it through its lifecycle.
//!
//! Creation is all-or-nothing: the patient and every referenced drug are
//! resolved, quantities validated and costs computed *before* the single
//! insert, so a failure at any line leaves no prescription behind. Each line
//! captures the drug's price and descriptive fields at creation time; later
//! catalog edits never change a historical prescription's cost or text.

use std::sync::Arc;

use chrono::Utc;

use hms_id::DocId;

use crate::catalog::CatalogService;
use crate::db::Database;
use crate::domain::{DrugSnapshot, Prescription, PrescriptionItem, PrescriptionStatus};
use crate::error::{HmsError, HmsResult};
use crate::patients::paginate;

/// One requested prescription line.
#[derive(Debug, Clone)]
pub struct NewPrescriptionItem {
    pub drug_id: DocId,
    pub quantity: u32,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub route: Option<String>,
    pub instructions: Option<String>,
}

/// Input for prescription creation.
#[derive(Debug, Clone)]
pub struct NewPrescription {
    pub patient_id: DocId,
    pub doctor_id: String,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
    /// Initial state; defaults to `draft`.
    pub status: Option<PrescriptionStatus>,
    pub items: Vec<NewPrescriptionItem>,
}

/// Listing filters.
#[derive(Debug, Clone, Default)]
pub struct PrescriptionFilter {
    pub status: Option<PrescriptionStatus>,
    pub patient_id: Option<DocId>,
    pub doctor_id: Option<String>,
    pub skip: usize,
    pub limit: Option<usize>,
}

/// Rounds a currency amount to 2 decimal places.
pub fn round_to_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Prescription operations.
#[derive(Clone)]
pub struct PrescriptionService {
    db: Arc<Database>,
    catalog: CatalogService,
}

impl PrescriptionService {
    pub fn new(db: Arc<Database>) -> Self {
        let catalog = CatalogService::new(db.clone());
        Self { db, catalog }
    }

    /// Creates a prescription.
    ///
    /// Resolution order: (1) the patient, (2) every drug reference against
    /// *active* catalog entries, (3) cost computation — and only then one
    /// insert. Errors identify the offending line by 1-based index.
    ///
    /// # Errors
    ///
    /// * `NotFound` if the patient is missing, or a line references a
    ///   missing or inactive drug.
    /// * `InvalidArgument` for a non-positive quantity.
    pub fn create(&self, input: NewPrescription) -> HmsResult<Prescription> {
        if self.db.patients.get(&input.patient_id)?.is_none() {
            return Err(HmsError::NotFound("patient not found".into()));
        }

        let mut items = Vec::with_capacity(input.items.len());
        let mut total = 0.0;
        for (index, line) in input.items.iter().enumerate() {
            let position = index + 1;
            if line.quantity == 0 {
                return Err(HmsError::InvalidArgument(format!(
                    "item {position}: quantity must be positive"
                )));
            }

            let drug = self.catalog.get_active(&line.drug_id)?.ok_or_else(|| {
                HmsError::NotFound(format!("item {position}: drug not found or inactive"))
            })?;

            let line_cost = round_to_cents(drug.price * f64::from(line.quantity));
            total += line_cost;
            items.push(PrescriptionItem {
                drug_id: line.drug_id,
                quantity: line.quantity,
                dosage: line.dosage.clone(),
                frequency: line.frequency.clone(),
                route: line.route.clone(),
                instructions: line.instructions.clone(),
                unit_price: drug.price,
                line_cost,
                drug_snapshot: DrugSnapshot {
                    drug_code: drug.drug_code,
                    name: drug.name,
                    strength: drug.strength,
                    dosage_form: drug.dosage_form,
                    unit: drug.unit,
                },
            });
        }

        let now = Utc::now();
        let prescription = Prescription {
            id: DocId::new(),
            patient_id: input.patient_id,
            doctor_id: input.doctor_id,
            diagnosis: input.diagnosis,
            notes: input.notes,
            status: input.status.unwrap_or(PrescriptionStatus::Draft),
            prescribed_date: now,
            items,
            total_cost: round_to_cents(total),
            created_at: now,
            updated_at: now,
        };

        self.db.prescriptions.insert(prescription.clone())?;
        tracing::info!(
            prescription_id = %prescription.id,
            patient_id = %prescription.patient_id,
            total_cost = prescription.total_cost,
            "prescription created"
        );
        Ok(prescription)
    }

    /// # Errors
    ///
    /// `NotFound` if no such prescription exists.
    pub fn get(&self, id: &DocId) -> HmsResult<Prescription> {
        self.db
            .prescriptions
            .get(id)?
            .ok_or_else(|| HmsError::NotFound("prescription not found".into()))
    }

    /// Lists prescriptions matching the filter, most recently prescribed
    /// first.
    pub fn list(&self, filter: &PrescriptionFilter) -> HmsResult<Vec<Prescription>> {
        let matches = |p: &Prescription| {
            filter.status.map_or(true, |s| p.status == s)
                && filter.patient_id.map_or(true, |id| p.patient_id == id)
                && filter
                    .doctor_id
                    .as_deref()
                    .map_or(true, |d| p.doctor_id == d)
        };
        let mut prescriptions = self.db.prescriptions.find(matches)?;
        prescriptions.sort_by_key(|p| std::cmp::Reverse(p.prescribed_date));
        paginate(&mut prescriptions, filter.skip, filter.limit);
        Ok(prescriptions)
    }

    /// Requests a status transition.
    ///
    /// Requesting the current status is a no-op and returns the unchanged
    /// document (no timestamp bump). The transition check and the write run
    /// in one critical section on the document; across requests the policy
    /// stays last-writer-wins (no version token).
    ///
    /// # Errors
    ///
    /// `InvalidTransition` naming both states if the lifecycle table does
    /// not allow the move.
    pub fn set_status(
        &self,
        id: &DocId,
        requested: PrescriptionStatus,
    ) -> HmsResult<Prescription> {
        let updated = self.db.prescriptions.update_with(id, |p| {
            if p.status == requested {
                return Ok(());
            }
            if !p.status.allows(requested) {
                return Err(HmsError::InvalidTransition {
                    from: p.status.to_string(),
                    to: requested.to_string(),
                });
            }
            p.status = requested;
            p.updated_at = Utc::now();
            Ok(())
        });

        match updated {
            Err(HmsError::NotFound(_)) => {
                Err(HmsError::NotFound("prescription not found".into()))
            }
            other => other,
        }
    }
}
