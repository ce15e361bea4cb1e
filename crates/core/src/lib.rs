//! # HMS Core
//!
//! Core business logic for the hospital management platform:
//! - Patient registry and insurance-info merge
//! - Drug catalog with soft delete
//! - Cost-snapshotted prescriptions with a lifecycle state machine
//! - CLS (lab/imaging) orders, result ingestion and attachments
//! - BHYT card registry, validation and coverage calculation
//!
//! **No API concerns**: HTTP servers, request parsing and response shaping
//! belong in `api-rest`.

pub mod catalog;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod insurance;
pub mod orders;
pub mod patients;
pub mod prescriptions;

pub use config::CoreConfig;
pub use db::Database;
pub use error::{HmsError, HmsResult};

#[cfg(test)]
mod tests {
    //! Cross-service flow: register, prescribe, order, ingest.

    use std::sync::Arc;

    use hms_files::AttachmentStore;

    use crate::catalog::{CatalogService, NewDrug};
    use crate::db::Database;
    use crate::domain::{
        OrderStatus, PrescriptionStatus, ServiceOrderItem,
    };
    use crate::error::HmsError;
    use crate::orders::{
        IncomingFile, NewServiceOrder, OrderService, ResultFilter, ResultIngestion,
    };
    use crate::patients::{NewPatient, PatientService};
    use crate::prescriptions::{
        NewPrescription, NewPrescriptionItem, PrescriptionService,
    };

    #[test]
    fn test_full_clinical_flow() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Arc::new(Database::new());
        let attachments = Arc::new(AttachmentStore::new(dir.path()).unwrap());
        let patients = PatientService::new(db.clone());
        let catalog = CatalogService::new(db.clone());
        let prescriptions = PrescriptionService::new(db.clone());
        let orders = OrderService::new(db, attachments);

        let patient = patients
            .register(NewPatient {
                full_name: "Nguyễn Văn A".into(),
                phone: "0901234567".into(),
                email: "nva@example.com".into(),
                address: Some("123 Nguyễn Huệ, Q1".into()),
                date_of_birth: None,
                gender: None,
            })
            .unwrap();

        let drug = catalog
            .create(NewDrug {
                drug_code: "PARA500".into(),
                name: "Paracetamol 500mg".into(),
                dosage_form: "tablet".into(),
                strength: "500mg".into(),
                unit: "viên".into(),
                route: "oral".into(),
                price: 1000.0,
            })
            .unwrap();

        let prescription = prescriptions
            .create(NewPrescription {
                patient_id: patient.id,
                doctor_id: "doctor-1".into(),
                diagnosis: Some("sốt siêu vi".into()),
                notes: None,
                status: None,
                items: vec![NewPrescriptionItem {
                    drug_id: drug.id,
                    quantity: 3,
                    dosage: Some("1 viên".into()),
                    frequency: Some("3 lần/ngày".into()),
                    route: None,
                    instructions: Some("sau ăn".into()),
                }],
            })
            .unwrap();
        assert_eq!(prescription.total_cost, 3000.0);
        assert_eq!(prescription.status, PrescriptionStatus::Draft);

        prescriptions
            .set_status(&prescription.id, PrescriptionStatus::Issued)
            .unwrap();
        prescriptions
            .set_status(&prescription.id, PrescriptionStatus::Dispensed)
            .unwrap();
        let back = prescriptions
            .set_status(&prescription.id, PrescriptionStatus::Issued)
            .unwrap_err();
        assert!(matches!(back, HmsError::InvalidTransition { .. }));

        let order = orders
            .create(NewServiceOrder {
                patient_id: patient.id,
                doctor_id: "doctor-1".into(),
                priority: None,
                items: vec![ServiceOrderItem {
                    service_code: "CBC01".into(),
                    service_name: "Công thức máu".into(),
                    notes: None,
                }],
                notes: None,
            })
            .unwrap();

        orders
            .ingest_result(
                &order.id,
                ResultIngestion {
                    modality: Some("hematology".into()),
                    conclusion: Some("bình thường".into()),
                    text_results: vec![],
                    files: vec![IncomingFile {
                        filename: "cbc.pdf".into(),
                        bytes: b"%PDF-1.4 report".to_vec(),
                    }],
                    result_date: None,
                },
            )
            .unwrap();

        assert_eq!(orders.get(&order.id).unwrap().status, OrderStatus::Completed);
        let results = orders
            .list_results(&ResultFilter {
                patient_id: Some(patient.id),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].attachments.len(), 1);
    }
}
