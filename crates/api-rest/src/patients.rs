//! Patient endpoints, including the insurance merge.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use hms_core::domain::Patient;
use hms_core::patients::{InsuranceVerdict, NewPatient, PatientFilter, PatientUpdate};
use hms_core::HmsError;

use crate::error::ApiResult;
use crate::{parse_id, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePatientReq {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePatientReq {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PatientListQuery {
    /// Case-insensitive name substring.
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateInsuranceReq {
    /// BHYT card number (2 letters + 13 digits).
    pub card_number: String,
}

#[utoipa::path(
    get,
    path = "/patients",
    params(PatientListQuery),
    responses(
        (status = 200, description = "Matching patients", body = [Patient])
    )
)]
#[axum::debug_handler]
pub(crate) async fn list_patients(
    State(state): State<AppState>,
    Query(query): Query<PatientListQuery>,
) -> ApiResult<Json<Vec<Patient>>> {
    let filter = PatientFilter {
        name: query.name,
        phone: query.phone,
        email: query.email,
        skip: query.skip.unwrap_or(0),
        limit: query.limit,
    };
    Ok(Json(state.patients.list(&filter)?))
}

#[utoipa::path(
    post,
    path = "/patients",
    request_body = CreatePatientReq,
    responses(
        (status = 201, description = "Patient registered", body = Patient),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Phone or email already registered")
    )
)]
#[axum::debug_handler]
pub(crate) async fn create_patient(
    State(state): State<AppState>,
    Json(req): Json<CreatePatientReq>,
) -> ApiResult<(StatusCode, Json<Patient>)> {
    let patient = state.patients.register(NewPatient {
        full_name: req.full_name,
        phone: req.phone,
        email: req.email,
        address: req.address,
        date_of_birth: req.date_of_birth,
        gender: req.gender,
    })?;
    Ok((StatusCode::CREATED, Json(patient)))
}

#[utoipa::path(
    get,
    path = "/patients/{id}",
    params(("id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 200, description = "Patient found", body = Patient),
        (status = 404, description = "No such patient")
    )
)]
#[axum::debug_handler]
pub(crate) async fn get_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Patient>> {
    let id = parse_id(&id)?;
    Ok(Json(state.patients.get(&id)?))
}

#[utoipa::path(
    put,
    path = "/patients/{id}",
    params(("id" = String, Path, description = "Patient identifier")),
    request_body = UpdatePatientReq,
    responses(
        (status = 200, description = "Patient updated", body = Patient),
        (status = 404, description = "No such patient"),
        (status = 409, description = "Phone or email already registered")
    )
)]
#[axum::debug_handler]
pub(crate) async fn update_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePatientReq>,
) -> ApiResult<Json<Patient>> {
    let id = parse_id(&id)?;
    let patient = state.patients.update(
        &id,
        PatientUpdate {
            full_name: req.full_name,
            phone: req.phone,
            email: req.email,
            address: req.address,
            date_of_birth: req.date_of_birth,
            gender: req.gender,
        },
    )?;
    Ok(Json(patient))
}

#[utoipa::path(
    delete,
    path = "/patients/{id}",
    params(("id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 204, description = "Patient deleted"),
        (status = 404, description = "No such patient")
    )
)]
#[axum::debug_handler]
pub(crate) async fn delete_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    state.patients.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/patients/{id}/insurance",
    params(("id" = String, Path, description = "Patient identifier")),
    request_body = ValidateInsuranceReq,
    responses(
        (status = 200, description = "Validation outcome merged onto the patient", body = Patient),
        (status = 400, description = "Patient has no recorded date of birth"),
        (status = 404, description = "No such patient")
    )
)]
/// Validates the given BHYT card against the insurance service and merges
/// the verdict onto the patient's `insurance_info`.
///
/// A card the service rejects, or a service that cannot be reached, still
/// produces a merge: the patient keeps an unvalidated record whose notes say
/// why. Only a missing patient or a missing date of birth fail the request.
#[axum::debug_handler]
pub(crate) async fn merge_insurance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ValidateInsuranceReq>,
) -> ApiResult<Json<Patient>> {
    let id = parse_id(&id)?;
    let patient = state.patients.get(&id)?;
    let date_of_birth = patient.date_of_birth.ok_or_else(|| {
        HmsError::InvalidArgument(
            "patient has no date of birth on record; insurance validation needs one".into(),
        )
    })?;

    let outcome = state
        .insurance_client
        .validate(&req.card_number, date_of_birth)
        .await;
    let notes = if outcome.valid {
        None
    } else {
        Some(outcome.message.clone())
    };
    let verdict = InsuranceVerdict {
        card_number: req.card_number,
        is_validated: outcome.valid,
        coverage_percentage: outcome.coverage_percentage.unwrap_or(0),
        notes,
    };
    Ok(Json(state.patients.apply_insurance(&id, verdict)?))
}

pub fn routes() -> axum::Router<AppState> {
    use axum::routing::{delete, get, post, put};
    axum::Router::new()
        .route("/patients", get(list_patients))
        .route("/patients", post(create_patient))
        .route("/patients/:id", get(get_patient))
        .route("/patients/:id", put(update_patient))
        .route("/patients/:id", delete(delete_patient))
        .route("/patients/:id/insurance", post(merge_insurance))
}
