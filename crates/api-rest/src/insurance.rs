//! BHYT card registry and validation endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::ToSchema;

use hms_core::domain::InsuranceCard;
use hms_core::insurance::{InsuranceValidation, NewInsuranceCard};

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateCardReq {
    pub card_number: String,
    pub date_of_birth: NaiveDate,
}

#[utoipa::path(
    post,
    path = "/insurance/validate",
    request_body = ValidateCardReq,
    responses(
        (status = 200, description = "Validation verdict (also for bad cards)", body = InsuranceValidation)
    )
)]
/// Validates a BHYT card. A malformed, unknown or expired card is a 200 with
/// `is_valid: false` and a message, never an HTTP error.
#[axum::debug_handler]
pub(crate) async fn validate_card(
    State(state): State<AppState>,
    Json(req): Json<ValidateCardReq>,
) -> ApiResult<Json<InsuranceValidation>> {
    Ok(Json(
        state.insurance.validate(&req.card_number, req.date_of_birth)?,
    ))
}

#[utoipa::path(
    get,
    path = "/insurance/cards",
    responses(
        (status = 200, description = "All registered cards", body = [InsuranceCard])
    )
)]
#[axum::debug_handler]
pub(crate) async fn list_cards(State(state): State<AppState>) -> ApiResult<Json<Vec<InsuranceCard>>> {
    Ok(Json(state.insurance.list_cards()?))
}

#[utoipa::path(
    post,
    path = "/insurance/cards",
    request_body = NewInsuranceCard,
    responses(
        (status = 201, description = "Card registered", body = InsuranceCard),
        (status = 400, description = "Malformed card number"),
        (status = 409, description = "Card number already registered")
    )
)]
#[axum::debug_handler]
pub(crate) async fn add_card(
    State(state): State<AppState>,
    Json(req): Json<NewInsuranceCard>,
) -> ApiResult<(StatusCode, Json<InsuranceCard>)> {
    let card = state.insurance.add_card(req)?;
    Ok((StatusCode::CREATED, Json(card)))
}

#[utoipa::path(
    get,
    path = "/insurance/cards/{card_number}",
    params(("card_number" = String, Path, description = "BHYT card number")),
    responses(
        (status = 200, description = "Card found", body = InsuranceCard),
        (status = 404, description = "No such card")
    )
)]
#[axum::debug_handler]
pub(crate) async fn get_card(
    State(state): State<AppState>,
    Path(card_number): Path<String>,
) -> ApiResult<Json<InsuranceCard>> {
    Ok(Json(state.insurance.get_card(&card_number)?))
}

pub fn routes() -> axum::Router<AppState> {
    use axum::routing::{get, post};
    axum::Router::new()
        .route("/insurance/validate", post(validate_card))
        .route("/insurance/cards", get(list_cards))
        .route("/insurance/cards", post(add_card))
        .route("/insurance/cards/:card_number", get(get_card))
}
