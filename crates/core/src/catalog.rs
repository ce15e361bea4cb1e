//! Drug catalog.
//!
//! CRUD over drug records with a uniqueness invariant on `drug_code`. The
//! catalog's contribution to the clinical workflow is supplying an
//! authoritative point-in-time price and description to the prescription
//! engine; it does no cost computation itself. Drugs are soft-deleted only:
//! `is_active` is cleared and the record (and its code) stays claimed, so
//! historical prescriptions keep resolving their snapshots.

use std::sync::Arc;

use chrono::Utc;

use hms_id::DocId;

use crate::db::Database;
use crate::domain::Drug;
use crate::error::{HmsError, HmsResult};
use crate::patients::{contains_ci, paginate};

/// Input for catalog creation.
#[derive(Debug, Clone)]
pub struct NewDrug {
    pub drug_code: String,
    pub name: String,
    pub dosage_form: String,
    pub strength: String,
    pub unit: String,
    pub route: String,
    pub price: f64,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct DrugUpdate {
    pub drug_code: Option<String>,
    pub name: Option<String>,
    pub dosage_form: Option<String>,
    pub strength: Option<String>,
    pub unit: Option<String>,
    pub route: Option<String>,
    pub price: Option<f64>,
    pub is_active: Option<bool>,
}

/// Listing filters.
#[derive(Debug, Clone, Default)]
pub struct DrugFilter {
    /// Case-insensitive name substring.
    pub name: Option<String>,
    /// Case-insensitive code substring.
    pub code: Option<String>,
    /// When set, only drugs with a matching `is_active` flag.
    pub active: Option<bool>,
    pub skip: usize,
    pub limit: Option<usize>,
}

/// Drug catalog operations.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<Database>,
}

impl CatalogService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Adds a drug to the catalog.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` for a blank code/name or a negative price.
    /// * `Conflict` if the code is already claimed — including by a racing
    ///   concurrent create, which loses at the store's unique index.
    pub fn create(&self, input: NewDrug) -> HmsResult<Drug> {
        if input.drug_code.trim().is_empty() {
            return Err(HmsError::InvalidArgument("drug_code is required".into()));
        }
        if input.name.trim().is_empty() {
            return Err(HmsError::InvalidArgument("name is required".into()));
        }
        if input.price < 0.0 {
            return Err(HmsError::InvalidArgument(
                "price cannot be negative".into(),
            ));
        }

        let now = Utc::now();
        let drug = Drug {
            id: DocId::new(),
            drug_code: input.drug_code,
            name: input.name,
            dosage_form: input.dosage_form,
            strength: input.strength,
            unit: input.unit,
            route: input.route,
            price: input.price,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.db.drugs.insert(drug.clone())?;
        tracing::info!(drug_id = %drug.id, code = %drug.drug_code, "drug created");
        Ok(drug)
    }

    /// # Errors
    ///
    /// `NotFound` if no such drug exists.
    pub fn get(&self, id: &DocId) -> HmsResult<Drug> {
        self.db
            .drugs
            .get(id)?
            .ok_or_else(|| HmsError::NotFound("drug not found".into()))
    }

    /// Returns the drug only if it exists *and* is active — the resolution
    /// rule for new prescriptions.
    pub fn get_active(&self, id: &DocId) -> HmsResult<Option<Drug>> {
        Ok(self.db.drugs.get(id)?.filter(|d| d.is_active))
    }

    /// Lists catalog entries matching the filter.
    pub fn list(&self, filter: &DrugFilter) -> HmsResult<Vec<Drug>> {
        let matches = |d: &Drug| {
            contains_ci(&d.name, filter.name.as_deref())
                && contains_ci(&d.drug_code, filter.code.as_deref())
                && filter.active.map_or(true, |want| d.is_active == want)
        };
        let mut drugs = self.db.drugs.find(matches)?;
        paginate(&mut drugs, filter.skip, filter.limit);
        Ok(drugs)
    }

    /// Applies a partial update. Code uniqueness is re-checked only when the
    /// code is actually being changed (the index re-validation runs inside
    /// the same critical section as the write).
    pub fn update(&self, id: &DocId, update: DrugUpdate) -> HmsResult<Drug> {
        if let Some(price) = update.price {
            if price < 0.0 {
                return Err(HmsError::InvalidArgument(
                    "price cannot be negative".into(),
                ));
            }
        }

        let updated = self.db.drugs.update_with(id, |d| {
            if let Some(v) = update.drug_code.clone() {
                d.drug_code = v;
            }
            if let Some(v) = update.name.clone() {
                d.name = v;
            }
            if let Some(v) = update.dosage_form.clone() {
                d.dosage_form = v;
            }
            if let Some(v) = update.strength.clone() {
                d.strength = v;
            }
            if let Some(v) = update.unit.clone() {
                d.unit = v;
            }
            if let Some(v) = update.route.clone() {
                d.route = v;
            }
            if let Some(v) = update.price {
                d.price = v;
            }
            if let Some(v) = update.is_active {
                d.is_active = v;
            }
            d.updated_at = Utc::now();
            Ok::<(), HmsError>(())
        });

        match updated {
            Err(HmsError::NotFound(_)) => Err(HmsError::NotFound("drug not found".into())),
            other => other,
        }
    }

    /// Soft-deletes a drug: clears `is_active`, never removes the record.
    pub fn deactivate(&self, id: &DocId) -> HmsResult<Drug> {
        let updated = self.db.drugs.update_with(id, |d| {
            d.is_active = false;
            d.updated_at = Utc::now();
            Ok::<(), HmsError>(())
        });

        match updated {
            Err(HmsError::NotFound(_)) => Err(HmsError::NotFound("drug not found".into())),
            other => {
                if let Ok(drug) = &other {
                    tracing::info!(drug_id = %drug.id, code = %drug.drug_code, "drug deactivated");
                }
                other
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> CatalogService {
        CatalogService::new(Arc::new(Database::new()))
    }

    fn paracetamol() -> NewDrug {
        NewDrug {
            drug_code: "PARA500".into(),
            name: "Paracetamol".into(),
            dosage_form: "tablet".into(),
            strength: "500mg".into(),
            unit: "viên".into(),
            route: "oral".into(),
            price: 1000.0,
        }
    }

    #[test]
    fn test_create_and_get() {
        let svc = service();
        let drug = svc.create(paracetamol()).unwrap();
        assert!(drug.is_active);
        assert_eq!(svc.get(&drug.id).unwrap(), drug);
    }

    #[test]
    fn test_duplicate_code_conflicts() {
        let svc = service();
        svc.create(paracetamol()).unwrap();
        let err = svc.create(paracetamol()).unwrap_err();
        assert!(matches!(err, HmsError::Conflict(_)));
    }

    #[test]
    fn test_concurrent_same_code_creates_one_winner() {
        let svc = service();
        let a = svc.clone();
        let b = svc.clone();
        let first = std::thread::spawn(move || a.create(paracetamol()));
        let second = std::thread::spawn(move || b.create(paracetamol()));
        let outcomes = [first.join().unwrap(), second.join().unwrap()];

        let successes = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(successes, 1);
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, Err(HmsError::Conflict(_)))));
    }

    #[test]
    fn test_negative_price_rejected() {
        let svc = service();
        let mut input = paracetamol();
        input.price = -1.0;
        assert!(matches!(
            svc.create(input),
            Err(HmsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_soft_delete_keeps_record_and_code() {
        let svc = service();
        let drug = svc.create(paracetamol()).unwrap();

        let deactivated = svc.deactivate(&drug.id).unwrap();
        assert!(!deactivated.is_active);

        // The record survives and the code stays claimed.
        assert_eq!(svc.get(&drug.id).unwrap().drug_code, "PARA500");
        assert!(matches!(
            svc.create(paracetamol()),
            Err(HmsError::Conflict(_))
        ));
        // And it is no longer available to new prescriptions.
        assert!(svc.get_active(&drug.id).unwrap().is_none());
    }

    #[test]
    fn test_update_without_code_change_keeps_code() {
        let svc = service();
        let drug = svc.create(paracetamol()).unwrap();

        let updated = svc
            .update(
                &drug.id,
                DrugUpdate {
                    price: Some(1200.0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.price, 1200.0);
        assert_eq!(updated.drug_code, "PARA500");
    }

    #[test]
    fn test_update_code_to_taken_value_conflicts() {
        let svc = service();
        svc.create(paracetamol()).unwrap();
        let mut other = paracetamol();
        other.drug_code = "IBU400".into();
        other.name = "Ibuprofen".into();
        let ibu = svc.create(other).unwrap();

        let err = svc
            .update(
                &ibu.id,
                DrugUpdate {
                    drug_code: Some("PARA500".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, HmsError::Conflict(_)));
        assert_eq!(svc.get(&ibu.id).unwrap().drug_code, "IBU400");
    }

    #[test]
    fn test_list_filters() {
        let svc = service();
        svc.create(paracetamol()).unwrap();
        let mut other = paracetamol();
        other.drug_code = "IBU400".into();
        other.name = "Ibuprofen".into();
        let ibu = svc.create(other).unwrap();
        svc.deactivate(&ibu.id).unwrap();

        let by_name = svc
            .list(&DrugFilter {
                name: Some("para".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_name.len(), 1);

        let active_only = svc
            .list(&DrugFilter {
                active: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(active_only.len(), 1);
        assert_eq!(active_only[0].drug_code, "PARA500");

        let by_code = svc
            .list(&DrugFilter {
                code: Some("ibu".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_code.len(), 1);
    }
}
