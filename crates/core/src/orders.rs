//! CLS (cận lâm sàng — lab and imaging) order and result engine.
//!
//! Orders move through `ordered → in_progress → completed` with `canceled`
//! reachable from the two non-terminal states. Results are ingested as an
//! upsert keyed on the order: scalar fields overwrite, attachments only ever
//! append, and ingestion completes the owning order before the result is
//! stored, so a stored result always belongs to a completed order.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use hms_files::AttachmentStore;
use hms_id::DocId;
use hms_store::StoreError;

use crate::db::Database;
use crate::domain::{
    LabStatusFilter, OrderPriority, OrderStatus, ServiceOrder, ServiceOrderItem, ServiceResult,
    TestType, TextResult,
};
use crate::error::{HmsError, HmsResult};
use crate::patients::{contains_ci, paginate};

/// Input for order creation.
#[derive(Debug, Clone)]
pub struct NewServiceOrder {
    pub patient_id: DocId,
    pub doctor_id: String,
    pub priority: Option<OrderPriority>,
    pub items: Vec<ServiceOrderItem>,
    pub notes: Option<String>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ServiceOrderUpdate {
    pub priority: Option<OrderPriority>,
    pub status: Option<OrderStatus>,
    pub notes: Option<String>,
}

/// General listing filters.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub patient_id: Option<DocId>,
    pub doctor_id: Option<String>,
    pub status: Option<OrderStatus>,
    pub skip: usize,
    pub limit: Option<usize>,
}

/// Technician worklist query. Dates are inclusive calendar-day bounds
/// against the order date.
#[derive(Debug, Clone, Default)]
pub struct LabWorklistQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub status: Option<LabStatusFilter>,
    pub test_type: Option<TestType>,
    pub skip: usize,
    pub limit: Option<usize>,
}

/// One uploaded file accompanying a result ingestion.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Payload of a result ingestion. Absent scalars leave any existing value
/// in place on re-ingestion.
#[derive(Debug, Clone, Default)]
pub struct ResultIngestion {
    pub modality: Option<String>,
    pub conclusion: Option<String>,
    pub text_results: Vec<TextResult>,
    pub files: Vec<IncomingFile>,
    pub result_date: Option<DateTime<Utc>>,
}

/// Result listing selector: by owning order or by patient.
#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    pub order_id: Option<DocId>,
    pub patient_id: Option<DocId>,
}

/// Service order and result operations.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<Database>,
    attachments: Arc<AttachmentStore>,
}

impl OrderService {
    pub fn new(db: Arc<Database>, attachments: Arc<AttachmentStore>) -> Self {
        Self { db, attachments }
    }

    /// Creates a service order in the `ordered` state.
    ///
    /// # Errors
    ///
    /// * `NotFound` if the patient does not exist.
    /// * `InvalidArgument` for an empty item list or a blank service code
    ///   or name.
    pub fn create(&self, input: NewServiceOrder) -> HmsResult<ServiceOrder> {
        if self.db.patients.get(&input.patient_id)?.is_none() {
            return Err(HmsError::NotFound("patient not found".into()));
        }
        if input.items.is_empty() {
            return Err(HmsError::InvalidArgument(
                "an order needs at least one service item".into(),
            ));
        }
        for (index, item) in input.items.iter().enumerate() {
            if item.service_code.trim().is_empty() || item.service_name.trim().is_empty() {
                return Err(HmsError::InvalidArgument(format!(
                    "item {}: service code and name must not be blank",
                    index + 1
                )));
            }
        }

        let now = Utc::now();
        let order = ServiceOrder {
            id: DocId::new(),
            patient_id: input.patient_id,
            doctor_id: input.doctor_id,
            order_date: now,
            priority: input.priority.unwrap_or_default(),
            status: OrderStatus::Ordered,
            items: input.items,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        };
        self.db.orders.insert(order.clone())?;
        tracing::info!(order_id = %order.id, patient_id = %order.patient_id, "service order created");
        Ok(order)
    }

    /// # Errors
    ///
    /// `NotFound` if no such order exists.
    pub fn get(&self, id: &DocId) -> HmsResult<ServiceOrder> {
        self.db
            .orders
            .get(id)?
            .ok_or_else(|| HmsError::NotFound("service order not found".into()))
    }

    /// Applies a partial update.
    ///
    /// A requested status must be reachable from the current one; requesting
    /// the current status changes nothing. Any field change bumps
    /// `updated_at` once.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` for a status move the lifecycle table forbids.
    pub fn update(&self, id: &DocId, update: ServiceOrderUpdate) -> HmsResult<ServiceOrder> {
        let updated = self.db.orders.update_with(id, |order| {
            let mut touched = false;
            if let Some(status) = update.status {
                if status != order.status {
                    if !order.status.allows(status) {
                        return Err(HmsError::InvalidTransition {
                            from: order.status.to_string(),
                            to: status.to_string(),
                        });
                    }
                    order.status = status;
                    touched = true;
                }
            }
            if let Some(priority) = update.priority {
                if priority != order.priority {
                    order.priority = priority;
                    touched = true;
                }
            }
            if let Some(notes) = &update.notes {
                if order.notes.as_deref() != Some(notes.as_str()) {
                    order.notes = Some(notes.clone());
                    touched = true;
                }
            }
            if touched {
                order.updated_at = Utc::now();
            }
            Ok(())
        });

        match updated {
            Err(HmsError::NotFound(_)) => Err(HmsError::NotFound("service order not found".into())),
            other => other,
        }
    }

    /// Lists orders matching the filter, most recent first.
    pub fn list(&self, filter: &OrderFilter) -> HmsResult<Vec<ServiceOrder>> {
        let matches = |o: &ServiceOrder| {
            filter.patient_id.map_or(true, |id| o.patient_id == id)
                && filter.doctor_id.as_deref().map_or(true, |d| o.doctor_id == d)
                && filter.status.map_or(true, |s| o.status == s)
        };
        let mut orders = self.db.orders.find(matches)?;
        orders.sort_by_key(|o| std::cmp::Reverse(o.order_date));
        paginate(&mut orders, filter.skip, filter.limit);
        Ok(orders)
    }

    /// Technician worklist: canceled orders are never shown, date bounds are
    /// inclusive calendar days, and a test-type filter keeps an order if
    /// *any* of its items matches.
    pub fn list_lab_orders(&self, query: &LabWorklistQuery) -> HmsResult<Vec<ServiceOrder>> {
        let matches = |o: &ServiceOrder| {
            if o.status == OrderStatus::Canceled {
                return false;
            }
            if let Some(wanted) = query.status {
                if o.status != wanted.order_status() {
                    return false;
                }
            }
            let day = o.order_date.date_naive();
            if query.date_from.map_or(false, |from| day < from) {
                return false;
            }
            if query.date_to.map_or(false, |to| day > to) {
                return false;
            }
            query
                .test_type
                .map_or(true, |t| o.items.iter().any(|item| item_matches_test_type(item, t)))
        };
        let mut orders = self.db.orders.find(matches)?;
        orders.sort_by_key(|o| std::cmp::Reverse(o.order_date));
        paginate(&mut orders, query.skip, query.limit);
        Ok(orders)
    }

    /// Ingests a result for an order.
    ///
    /// The owning order is marked `completed` up front, inside one critical
    /// section that rejects canceled orders; only then are files written and
    /// the result document created or merged. A result therefore never
    /// exists for an order that is not `completed`, even when a cancel races
    /// with the ingestion.
    ///
    /// The first ingestion creates the order's result document; later ones
    /// update it in place: non-empty scalars overwrite, text results replace
    /// when provided, and stored attachments always append.
    ///
    /// # Errors
    ///
    /// * `NotFound` if the order does not exist.
    /// * `InvalidTransition` if the order is canceled.
    pub fn ingest_result(
        &self,
        order_id: &DocId,
        ingestion: ResultIngestion,
    ) -> HmsResult<ServiceResult> {
        self.complete_order(order_id)?;

        let mut stored = Vec::with_capacity(ingestion.files.len());
        for file in &ingestion.files {
            stored.push(self.attachments.save(order_id, &file.filename, &file.bytes)?);
        }

        let now = Utc::now();
        let result_date = ingestion.result_date.unwrap_or(now);

        let existing = self.db.results.find_one(|r| r.order_id == *order_id)?;
        let result = match existing {
            Some(current) => self.merge_result(&current.id, &ingestion, stored, result_date)?,
            None => {
                let fresh = ServiceResult {
                    id: DocId::new(),
                    order_id: *order_id,
                    result_date,
                    modality: ingestion.modality.clone(),
                    text_results: ingestion.text_results.clone(),
                    attachments: stored.clone(),
                    conclusion: ingestion.conclusion.clone(),
                    created_at: now,
                    updated_at: now,
                };
                match self.db.results.insert(fresh.clone()) {
                    Ok(()) => fresh,
                    // Lost the creation race; fold our payload into the winner.
                    Err(StoreError::DuplicateKey { .. }) => {
                        let winner = self
                            .db
                            .results
                            .find_one(|r| r.order_id == *order_id)?
                            .ok_or_else(|| {
                                HmsError::Storage("result vanished during ingestion".into())
                            })?;
                        self.merge_result(&winner.id, &ingestion, stored, result_date)?
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        };

        tracing::info!(
            order_id = %order_id,
            result_id = %result.id,
            attachments = result.attachments.len(),
            "result ingested"
        );
        Ok(result)
    }

    /// Lists results by owning order or by patient.
    ///
    /// A patient query joins through the patient's orders; a patient with no
    /// orders yields an empty list without touching the result collection.
    pub fn list_results(&self, filter: &ResultFilter) -> HmsResult<Vec<ServiceResult>> {
        if let Some(order_id) = filter.order_id {
            return Ok(self.db.results.find(|r| r.order_id == order_id)?);
        }
        if let Some(patient_id) = filter.patient_id {
            let orders = self.db.orders.find(|o| o.patient_id == patient_id)?;
            if orders.is_empty() {
                return Ok(Vec::new());
            }
            let order_ids: Vec<DocId> = orders.iter().map(|o| o.id).collect();
            let mut results = self
                .db
                .results
                .find(|r| order_ids.contains(&r.order_id))?;
            results.sort_by_key(|r| std::cmp::Reverse(r.result_date));
            return Ok(results);
        }
        let mut results = self.db.results.find(|_| true)?;
        results.sort_by_key(|r| std::cmp::Reverse(r.result_date));
        Ok(results)
    }

    fn merge_result(
        &self,
        result_id: &DocId,
        ingestion: &ResultIngestion,
        stored: Vec<hms_files::StoredAttachment>,
        result_date: DateTime<Utc>,
    ) -> HmsResult<ServiceResult> {
        self.db.results.update_with(result_id, |r| {
            if let Some(modality) = &ingestion.modality {
                if !modality.trim().is_empty() {
                    r.modality = Some(modality.clone());
                }
            }
            if let Some(conclusion) = &ingestion.conclusion {
                if !conclusion.trim().is_empty() {
                    r.conclusion = Some(conclusion.clone());
                }
            }
            if !ingestion.text_results.is_empty() {
                r.text_results = ingestion.text_results.clone();
            }
            r.attachments.extend(stored.iter().cloned());
            r.result_date = result_date;
            r.updated_at = Utc::now();
            Ok::<(), HmsError>(())
        })
    }

    fn complete_order(&self, order_id: &DocId) -> HmsResult<()> {
        let completed = self.db.orders.update_with(order_id, |order| {
            if order.status == OrderStatus::Completed {
                return Ok(());
            }
            if !order.status.allows(OrderStatus::Completed) {
                return Err(HmsError::InvalidTransition {
                    from: order.status.to_string(),
                    to: OrderStatus::Completed.to_string(),
                });
            }
            order.status = OrderStatus::Completed;
            order.updated_at = Utc::now();
            Ok(())
        });

        match completed {
            Err(HmsError::NotFound(_)) => Err(HmsError::NotFound("service order not found".into())),
            other => other.map(|_| ()),
        }
    }
}

/// Heuristic classification of a service item for the technician worklist.
///
/// Codes are matched by conventional prefixes, names by substrings in
/// Vietnamese and English. A code match or a name match is enough.
fn item_matches_test_type(item: &ServiceOrderItem, test_type: TestType) -> bool {
    let code = item.service_code.to_uppercase();
    let name = &item.service_name;
    let name_has = |needles: &[&str]| needles.iter().any(|n| contains_ci(name, Some(n)));
    match test_type {
        TestType::Hematology => {
            code.starts_with("HEM")
                || code.starts_with("CBC")
                || name_has(&["hema", "huyết", "cbc"])
        }
        TestType::Biochemistry => {
            code.starts_with("BIO")
                || code.starts_with("CHE")
                || name_has(&["chem", "sinh hóa", "glucose"])
        }
        TestType::Imaging => {
            ["XQ", "CT", "MRI", "US", "IMG"]
                .iter()
                .any(|p| code.starts_with(p))
                || name_has(&["x-ray", "xray", "siêu âm", "chụp", "scan"])
        }
    }
}
