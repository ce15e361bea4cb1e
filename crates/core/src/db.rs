//! The process-wide database handle.
//!
//! Constructed once at startup and passed into each engine behind an `Arc`;
//! no engine reaches for a global. Unique indexes are declared here so every
//! write path shares the same constraints:
//!
//! - patients: `email`, `phone`
//! - drugs: `drug_code` (including soft-deleted records)
//! - insurance cards: `card_number`
//! - service results: `order_id` (at most one result per order)

use hms_store::Collection;

use crate::domain::{Drug, InsuranceCard, Patient, Prescription, ServiceOrder, ServiceResult};

pub struct Database {
    pub patients: Collection<Patient>,
    pub drugs: Collection<Drug>,
    pub prescriptions: Collection<Prescription>,
    pub orders: Collection<ServiceOrder>,
    pub results: Collection<ServiceResult>,
    pub cards: Collection<InsuranceCard>,
}

impl Database {
    pub fn new() -> Self {
        Self {
            patients: Collection::builder()
                .unique_index("email", |p: &Patient| Some(p.email.clone()))
                .unique_index("phone", |p: &Patient| Some(p.phone.clone()))
                .build(),
            drugs: Collection::builder()
                .unique_index("drug_code", |d: &Drug| Some(d.drug_code.clone()))
                .build(),
            prescriptions: Collection::builder().build(),
            orders: Collection::builder().build(),
            results: Collection::builder()
                .unique_index("order_id", |r: &ServiceResult| Some(r.order_id.to_string()))
                .build(),
            cards: Collection::builder()
                .unique_index("card_number", |c: &InsuranceCard| {
                    Some(c.card_number.clone())
                })
                .build(),
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}
