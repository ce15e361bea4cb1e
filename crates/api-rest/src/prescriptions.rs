//! Prescription endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use hms_core::domain::{Prescription, PrescriptionStatus};
use hms_core::prescriptions::{NewPrescription, NewPrescriptionItem, PrescriptionFilter};
use hms_core::HmsError;

use crate::error::ApiResult;
use crate::{parse_id, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct PrescriptionItemReq {
    /// Drug identifier; must refer to an active catalog entry.
    pub drug_id: String,
    pub quantity: u32,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub route: Option<String>,
    pub instructions: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePrescriptionReq {
    pub patient_id: String,
    pub doctor_id: String,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
    /// Initial lifecycle state; defaults to draft.
    pub status: Option<String>,
    pub items: Vec<PrescriptionItemReq>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetStatusReq {
    /// Requested lifecycle state: draft, issued, dispensed or canceled.
    pub status: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PrescriptionListQuery {
    pub status: Option<String>,
    pub patient_id: Option<String>,
    pub doctor_id: Option<String>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/prescriptions",
    params(PrescriptionListQuery),
    responses(
        (status = 200, description = "Matching prescriptions, newest first", body = [Prescription]),
        (status = 400, description = "Unknown status or malformed identifier")
    )
)]
#[axum::debug_handler]
pub(crate) async fn list_prescriptions(
    State(state): State<AppState>,
    Query(query): Query<PrescriptionListQuery>,
) -> ApiResult<Json<Vec<Prescription>>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<PrescriptionStatus>)
        .transpose()?;
    let patient_id = query.patient_id.as_deref().map(parse_id).transpose()?;
    let filter = PrescriptionFilter {
        status,
        patient_id,
        doctor_id: query.doctor_id,
        skip: query.skip.unwrap_or(0),
        limit: query.limit,
    };
    Ok(Json(state.prescriptions.list(&filter)?))
}

#[utoipa::path(
    post,
    path = "/prescriptions",
    request_body = CreatePrescriptionReq,
    responses(
        (status = 201, description = "Prescription created with snapshotted costs", body = Prescription),
        (status = 400, description = "Invalid quantity or identifier"),
        (status = 404, description = "Patient or drug not found")
    )
)]
#[axum::debug_handler]
pub(crate) async fn create_prescription(
    State(state): State<AppState>,
    Json(req): Json<CreatePrescriptionReq>,
) -> ApiResult<(StatusCode, Json<Prescription>)> {
    let patient_id = parse_id(&req.patient_id)?;
    let status = req
        .status
        .as_deref()
        .map(str::parse::<PrescriptionStatus>)
        .transpose()?;
    let mut items = Vec::with_capacity(req.items.len());
    for (index, item) in req.items.into_iter().enumerate() {
        let drug_id = parse_id(&item.drug_id).map_err(|_| {
            HmsError::InvalidArgument(format!("item {}: malformed drug id", index + 1))
        })?;
        items.push(NewPrescriptionItem {
            drug_id,
            quantity: item.quantity,
            dosage: item.dosage,
            frequency: item.frequency,
            route: item.route,
            instructions: item.instructions,
        });
    }
    let prescription = state.prescriptions.create(NewPrescription {
        patient_id,
        doctor_id: req.doctor_id,
        diagnosis: req.diagnosis,
        notes: req.notes,
        status,
        items,
    })?;
    Ok((StatusCode::CREATED, Json(prescription)))
}

#[utoipa::path(
    get,
    path = "/prescriptions/{id}",
    params(("id" = String, Path, description = "Prescription identifier")),
    responses(
        (status = 200, description = "Prescription found", body = Prescription),
        (status = 404, description = "No such prescription")
    )
)]
#[axum::debug_handler]
pub(crate) async fn get_prescription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Prescription>> {
    let id = parse_id(&id)?;
    Ok(Json(state.prescriptions.get(&id)?))
}

#[utoipa::path(
    put,
    path = "/prescriptions/{id}/status",
    params(("id" = String, Path, description = "Prescription identifier")),
    request_body = SetStatusReq,
    responses(
        (status = 200, description = "Status applied (or already held)", body = Prescription),
        (status = 400, description = "Unknown status or forbidden transition"),
        (status = 404, description = "No such prescription")
    )
)]
#[axum::debug_handler]
pub(crate) async fn set_prescription_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetStatusReq>,
) -> ApiResult<Json<Prescription>> {
    let id = parse_id(&id)?;
    let requested: PrescriptionStatus = req.status.parse()?;
    Ok(Json(state.prescriptions.set_status(&id, requested)?))
}

pub fn routes() -> axum::Router<AppState> {
    use axum::routing::{get, post, put};
    axum::Router::new()
        .route("/prescriptions", get(list_prescriptions))
        .route("/prescriptions", post(create_prescription))
        .route("/prescriptions/:id", get(get_prescription))
        .route("/prescriptions/:id/status", put(set_prescription_status))
}
