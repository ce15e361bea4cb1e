//! Patient registration and the insurance-info merge.
//!
//! Plain field CRUD lives here because the uniqueness taxonomy (email and
//! phone conflicts) and the insurance merge both hang off the patient
//! document. The merge never blocks a patient write: whatever the
//! validation verdict says — including "the insurance service was down" —
//! is recorded on the document and the write succeeds.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use hms_id::DocId;

use crate::db::Database;
use crate::domain::{InsuranceInfo, Patient};
use crate::error::{HmsError, HmsResult};

/// Input for patient registration.
#[derive(Debug, Clone)]
pub struct NewPatient {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct PatientUpdate {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
}

/// Listing filters; all substring matches are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct PatientFilter {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub skip: usize,
    pub limit: Option<usize>,
}

/// The distilled outcome of an insurance validation, ready to merge onto a
/// patient document. Built by the caller from the validation client's
/// response — or from its failure, in which case `is_validated` is false and
/// `notes` says why.
#[derive(Debug, Clone)]
pub struct InsuranceVerdict {
    pub card_number: String,
    pub is_validated: bool,
    pub coverage_percentage: u8,
    pub notes: Option<String>,
}

/// Patient data operations.
#[derive(Clone)]
pub struct PatientService {
    db: Arc<Database>,
}

impl PatientService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Registers a new patient.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` if name, phone or email are blank, or the email
    ///   has no `@`.
    /// * `Conflict` if the email or phone is already registered. Two racing
    ///   registrations with the same email resolve to one success and one
    ///   conflict at the store's unique index.
    pub fn register(&self, input: NewPatient) -> HmsResult<Patient> {
        validate_identity(&input.full_name, &input.phone, &input.email)?;

        let now = Utc::now();
        let patient = Patient {
            id: DocId::new(),
            full_name: input.full_name,
            phone: input.phone,
            email: input.email,
            address: input.address,
            date_of_birth: input.date_of_birth,
            gender: input.gender,
            insurance_info: None,
            created_at: now,
            updated_at: now,
        };

        self.db.patients.insert(patient.clone())?;
        tracing::info!(patient_id = %patient.id, "patient registered");
        Ok(patient)
    }

    /// # Errors
    ///
    /// `NotFound` if no such patient exists.
    pub fn get(&self, id: &DocId) -> HmsResult<Patient> {
        self.db
            .patients
            .get(id)?
            .ok_or_else(|| HmsError::NotFound("patient not found".into()))
    }

    /// Lists patients matching the filter, in stable identifier order.
    pub fn list(&self, filter: &PatientFilter) -> HmsResult<Vec<Patient>> {
        let matches = |p: &Patient| {
            contains_ci(&p.full_name, filter.name.as_deref())
                && contains_ci(&p.phone, filter.phone.as_deref())
                && contains_ci(&p.email, filter.email.as_deref())
        };
        let mut patients = self.db.patients.find(matches)?;
        paginate(&mut patients, filter.skip, filter.limit);
        Ok(patients)
    }

    /// Applies a partial update, re-checking email/phone uniqueness when
    /// either is being changed.
    pub fn update(&self, id: &DocId, update: PatientUpdate) -> HmsResult<Patient> {
        if let Some(email) = &update.email {
            if !email.contains('@') {
                return Err(HmsError::InvalidArgument("invalid email address".into()));
            }
        }

        let updated = self.db.patients.update_with(id, |p| {
            if let Some(v) = update.full_name.clone() {
                p.full_name = v;
            }
            if let Some(v) = update.phone.clone() {
                p.phone = v;
            }
            if let Some(v) = update.email.clone() {
                p.email = v;
            }
            if let Some(v) = update.address.clone() {
                p.address = Some(v);
            }
            if let Some(v) = update.date_of_birth {
                p.date_of_birth = Some(v);
            }
            if let Some(v) = update.gender.clone() {
                p.gender = Some(v);
            }
            p.updated_at = Utc::now();
            Ok::<(), HmsError>(())
        });

        match updated {
            Err(HmsError::NotFound(_)) => Err(HmsError::NotFound("patient not found".into())),
            other => other,
        }
    }

    /// # Errors
    ///
    /// `NotFound` if no such patient exists.
    pub fn delete(&self, id: &DocId) -> HmsResult<()> {
        if self.db.patients.delete(id)? {
            Ok(())
        } else {
            Err(HmsError::NotFound("patient not found".into()))
        }
    }

    /// Merges an insurance validation verdict onto a patient.
    ///
    /// This is the only writer of `insurance_info`. The verdict may record a
    /// failed or degraded validation; that still merges and still succeeds —
    /// insurance is an optional attribute and validation is best-effort.
    pub fn apply_insurance(&self, id: &DocId, verdict: InsuranceVerdict) -> HmsResult<Patient> {
        let updated = self.db.patients.update_with(id, |p| {
            p.insurance_info = Some(InsuranceInfo {
                card_number: verdict.card_number.clone(),
                is_validated: verdict.is_validated,
                validation_date: Utc::now(),
                coverage_percentage: verdict.coverage_percentage,
                notes: verdict.notes.clone(),
            });
            p.updated_at = Utc::now();
            Ok::<(), HmsError>(())
        });

        match updated {
            Err(HmsError::NotFound(_)) => Err(HmsError::NotFound("patient not found".into())),
            other => other,
        }
    }
}

fn validate_identity(full_name: &str, phone: &str, email: &str) -> HmsResult<()> {
    if full_name.trim().is_empty() {
        return Err(HmsError::InvalidArgument("full_name is required".into()));
    }
    if phone.trim().is_empty() {
        return Err(HmsError::InvalidArgument("phone is required".into()));
    }
    if email.trim().is_empty() || !email.contains('@') {
        return Err(HmsError::InvalidArgument("invalid email address".into()));
    }
    Ok(())
}

/// Case-insensitive substring match; `None` filter matches everything.
pub(crate) fn contains_ci(haystack: &str, needle: Option<&str>) -> bool {
    match needle {
        Some(n) => haystack.to_lowercase().contains(&n.to_lowercase()),
        None => true,
    }
}

/// Applies skip/limit in place. A missing limit means "no cap".
pub(crate) fn paginate<T>(items: &mut Vec<T>, skip: usize, limit: Option<usize>) {
    if skip > 0 {
        items.drain(..skip.min(items.len()));
    }
    if let Some(limit) = limit {
        items.truncate(limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> PatientService {
        PatientService::new(Arc::new(Database::new()))
    }

    fn new_patient(name: &str, phone: &str, email: &str) -> NewPatient {
        NewPatient {
            full_name: name.into(),
            phone: phone.into(),
            email: email.into(),
            address: None,
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 15),
            gender: None,
        }
    }

    #[test]
    fn test_register_and_get() {
        let svc = service();
        let created = svc
            .register(new_patient("Nguyễn Văn A", "0901234567", "a@example.com"))
            .unwrap();

        let fetched = svc.get(&created.id).unwrap();
        assert_eq!(fetched, created);
        assert!(fetched.insurance_info.is_none());
        assert_eq!(fetched.created_at, fetched.updated_at);
    }

    #[test]
    fn test_register_duplicate_email_conflicts() {
        let svc = service();
        svc.register(new_patient("A", "0901", "same@example.com"))
            .unwrap();
        let err = svc
            .register(new_patient("B", "0902", "same@example.com"))
            .unwrap_err();
        assert!(matches!(err, HmsError::Conflict(_)));
    }

    #[test]
    fn test_register_duplicate_phone_conflicts() {
        let svc = service();
        svc.register(new_patient("A", "0901", "a@example.com"))
            .unwrap();
        let err = svc
            .register(new_patient("B", "0901", "b@example.com"))
            .unwrap_err();
        assert!(matches!(err, HmsError::Conflict(_)));
    }

    #[test]
    fn test_register_rejects_bad_email() {
        let svc = service();
        let err = svc
            .register(new_patient("A", "0901", "not-an-email"))
            .unwrap_err();
        assert!(matches!(err, HmsError::InvalidArgument(_)));
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let svc = service();
        assert!(matches!(
            svc.get(&DocId::new()),
            Err(HmsError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_filters_by_name_substring() {
        let svc = service();
        svc.register(new_patient("Nguyễn Văn A", "0901", "a@x.com"))
            .unwrap();
        svc.register(new_patient("Trần Thị B", "0902", "b@x.com"))
            .unwrap();

        let filter = PatientFilter {
            name: Some("nguyễn".into()),
            ..Default::default()
        };
        let found = svc.list(&filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].full_name, "Nguyễn Văn A");
    }

    #[test]
    fn test_list_pagination() {
        let svc = service();
        for i in 0..5 {
            svc.register(new_patient(
                &format!("P{i}"),
                &format!("090{i}"),
                &format!("p{i}@x.com"),
            ))
            .unwrap();
        }

        let filter = PatientFilter {
            skip: 2,
            limit: Some(2),
            ..Default::default()
        };
        assert_eq!(svc.list(&filter).unwrap().len(), 2);
    }

    #[test]
    fn test_update_to_taken_email_conflicts() {
        let svc = service();
        svc.register(new_patient("A", "0901", "a@x.com")).unwrap();
        let b = svc.register(new_patient("B", "0902", "b@x.com")).unwrap();

        let err = svc
            .update(
                &b.id,
                PatientUpdate {
                    email: Some("a@x.com".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, HmsError::Conflict(_)));
        // Losing update left the patient untouched.
        assert_eq!(svc.get(&b.id).unwrap().email, "b@x.com");
    }

    #[test]
    fn test_apply_insurance_merges_verdict() {
        let svc = service();
        let p = svc.register(new_patient("A", "0901", "a@x.com")).unwrap();

        let merged = svc
            .apply_insurance(
                &p.id,
                InsuranceVerdict {
                    card_number: "HS4010123456789".into(),
                    is_validated: true,
                    coverage_percentage: 80,
                    notes: None,
                },
            )
            .unwrap();

        let info = merged.insurance_info.unwrap();
        assert!(info.is_validated);
        assert_eq!(info.coverage_percentage, 80);
    }

    #[test]
    fn test_apply_insurance_failure_still_merges() {
        let svc = service();
        let p = svc.register(new_patient("A", "0901", "a@x.com")).unwrap();

        let merged = svc
            .apply_insurance(
                &p.id,
                InsuranceVerdict {
                    card_number: "HS4010123456789".into(),
                    is_validated: false,
                    coverage_percentage: 0,
                    notes: Some("insurance service unavailable: connection refused".into()),
                },
            )
            .unwrap();

        let info = merged.insurance_info.unwrap();
        assert!(!info.is_validated);
        assert!(info.notes.unwrap().contains("unavailable"));
    }
}
