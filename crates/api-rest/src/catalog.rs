//! Drug catalog endpoints. Deletion is a soft delete: the drug stays on
//! record for historical prescriptions but leaves the prescribable set.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use hms_core::catalog::{DrugFilter, DrugUpdate, NewDrug};
use hms_core::domain::Drug;

use crate::error::ApiResult;
use crate::{parse_id, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDrugReq {
    pub drug_code: String,
    pub name: String,
    pub dosage_form: String,
    pub strength: String,
    pub unit: String,
    pub route: String,
    pub price: f64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateDrugReq {
    pub drug_code: Option<String>,
    pub name: Option<String>,
    pub dosage_form: Option<String>,
    pub strength: Option<String>,
    pub unit: Option<String>,
    pub route: Option<String>,
    pub price: Option<f64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DrugListQuery {
    /// Case-insensitive name substring.
    pub name: Option<String>,
    /// Case-insensitive code substring.
    pub code: Option<String>,
    pub active: Option<bool>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/drugs",
    params(DrugListQuery),
    responses(
        (status = 200, description = "Matching drugs", body = [Drug])
    )
)]
#[axum::debug_handler]
pub(crate) async fn list_drugs(
    State(state): State<AppState>,
    Query(query): Query<DrugListQuery>,
) -> ApiResult<Json<Vec<Drug>>> {
    let filter = DrugFilter {
        name: query.name,
        code: query.code,
        active: query.active,
        skip: query.skip.unwrap_or(0),
        limit: query.limit,
    };
    Ok(Json(state.catalog.list(&filter)?))
}

#[utoipa::path(
    post,
    path = "/drugs",
    request_body = CreateDrugReq,
    responses(
        (status = 201, description = "Drug created", body = Drug),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Drug code already in use")
    )
)]
#[axum::debug_handler]
pub(crate) async fn create_drug(
    State(state): State<AppState>,
    Json(req): Json<CreateDrugReq>,
) -> ApiResult<(StatusCode, Json<Drug>)> {
    let drug = state.catalog.create(NewDrug {
        drug_code: req.drug_code,
        name: req.name,
        dosage_form: req.dosage_form,
        strength: req.strength,
        unit: req.unit,
        route: req.route,
        price: req.price,
    })?;
    Ok((StatusCode::CREATED, Json(drug)))
}

#[utoipa::path(
    get,
    path = "/drugs/{id}",
    params(("id" = String, Path, description = "Drug identifier")),
    responses(
        (status = 200, description = "Drug found", body = Drug),
        (status = 404, description = "No such drug")
    )
)]
#[axum::debug_handler]
pub(crate) async fn get_drug(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Drug>> {
    let id = parse_id(&id)?;
    Ok(Json(state.catalog.get(&id)?))
}

#[utoipa::path(
    put,
    path = "/drugs/{id}",
    params(("id" = String, Path, description = "Drug identifier")),
    request_body = UpdateDrugReq,
    responses(
        (status = 200, description = "Drug updated", body = Drug),
        (status = 404, description = "No such drug"),
        (status = 409, description = "Drug code already in use")
    )
)]
#[axum::debug_handler]
pub(crate) async fn update_drug(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateDrugReq>,
) -> ApiResult<Json<Drug>> {
    let id = parse_id(&id)?;
    let drug = state.catalog.update(
        &id,
        DrugUpdate {
            drug_code: req.drug_code,
            name: req.name,
            dosage_form: req.dosage_form,
            strength: req.strength,
            unit: req.unit,
            route: req.route,
            price: req.price,
            is_active: req.is_active,
        },
    )?;
    Ok(Json(drug))
}

#[utoipa::path(
    delete,
    path = "/drugs/{id}",
    params(("id" = String, Path, description = "Drug identifier")),
    responses(
        (status = 200, description = "Drug deactivated", body = Drug),
        (status = 404, description = "No such drug")
    )
)]
#[axum::debug_handler]
pub(crate) async fn deactivate_drug(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Drug>> {
    let id = parse_id(&id)?;
    Ok(Json(state.catalog.deactivate(&id)?))
}

pub fn routes() -> axum::Router<AppState> {
    use axum::routing::{delete, get, post, put};
    axum::Router::new()
        .route("/drugs", get(list_drugs))
        .route("/drugs", post(create_drug))
        .route("/drugs/:id", get(get_drug))
        .route("/drugs/:id", put(update_drug))
        .route("/drugs/:id", delete(deactivate_drug))
}
