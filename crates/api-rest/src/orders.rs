//! CLS order and result endpoints.
//!
//! Result ingestion is a multipart upload: scalar fields travel as text
//! parts (`modality`, `conclusion`, `text_results` as a JSON array) and any
//! number of file parts become stored attachments.

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use hms_core::domain::{
    LabStatusFilter, OrderPriority, OrderStatus, ServiceOrder, ServiceOrderItem, ServiceResult,
    TestType, TextResult,
};
use hms_core::orders::{
    IncomingFile, LabWorklistQuery, NewServiceOrder, OrderFilter, ResultFilter, ResultIngestion,
    ServiceOrderUpdate,
};
use hms_core::HmsError;

use crate::error::ApiResult;
use crate::{parse_id, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrderItemReq {
    pub service_code: String,
    pub service_name: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderReq {
    pub patient_id: String,
    pub doctor_id: String,
    /// normal or urgent; defaults to normal.
    pub priority: Option<String>,
    pub items: Vec<OrderItemReq>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderReq {
    /// normal or urgent.
    pub priority: Option<String>,
    /// ordered, in_progress, completed or canceled.
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct OrderListQuery {
    pub patient_id: Option<String>,
    pub doctor_id: Option<String>,
    pub status: Option<String>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct WorklistQuery {
    /// Inclusive lower bound (calendar day) on the order date.
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound (calendar day) on the order date.
    pub date_to: Option<NaiveDate>,
    /// waiting, in_progress or completed.
    pub status: Option<String>,
    /// hematology, biochemistry or imaging.
    pub test_type: Option<String>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ResultListQuery {
    pub order_id: Option<String>,
    pub patient_id: Option<String>,
}

#[utoipa::path(
    post,
    path = "/cls/orders",
    request_body = CreateOrderReq,
    responses(
        (status = 201, description = "Order placed in the ordered state", body = ServiceOrder),
        (status = 400, description = "Empty item list or blank service fields"),
        (status = 404, description = "No such patient")
    )
)]
#[axum::debug_handler]
pub(crate) async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderReq>,
) -> ApiResult<(StatusCode, Json<ServiceOrder>)> {
    let patient_id = parse_id(&req.patient_id)?;
    let priority = req
        .priority
        .as_deref()
        .map(str::parse::<OrderPriority>)
        .transpose()?;
    let items = req
        .items
        .into_iter()
        .map(|i| ServiceOrderItem {
            service_code: i.service_code,
            service_name: i.service_name,
            notes: i.notes,
        })
        .collect();
    let order = state.orders.create(NewServiceOrder {
        patient_id,
        doctor_id: req.doctor_id,
        priority,
        items,
        notes: req.notes,
    })?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[utoipa::path(
    get,
    path = "/cls/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Matching orders, newest first", body = [ServiceOrder])
    )
)]
#[axum::debug_handler]
pub(crate) async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> ApiResult<Json<Vec<ServiceOrder>>> {
    let filter = OrderFilter {
        patient_id: query.patient_id.as_deref().map(parse_id).transpose()?,
        doctor_id: query.doctor_id,
        status: query.status.as_deref().map(str::parse::<OrderStatus>).transpose()?,
        skip: query.skip.unwrap_or(0),
        limit: query.limit,
    };
    Ok(Json(state.orders.list(&filter)?))
}

#[utoipa::path(
    get,
    path = "/cls/orders/{id}",
    params(("id" = String, Path, description = "Order identifier")),
    responses(
        (status = 200, description = "Order found", body = ServiceOrder),
        (status = 404, description = "No such order")
    )
)]
#[axum::debug_handler]
pub(crate) async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ServiceOrder>> {
    let id = parse_id(&id)?;
    Ok(Json(state.orders.get(&id)?))
}

#[utoipa::path(
    put,
    path = "/cls/orders/{id}",
    params(("id" = String, Path, description = "Order identifier")),
    request_body = UpdateOrderReq,
    responses(
        (status = 200, description = "Order updated", body = ServiceOrder),
        (status = 400, description = "Unknown status or forbidden transition"),
        (status = 404, description = "No such order")
    )
)]
#[axum::debug_handler]
pub(crate) async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateOrderReq>,
) -> ApiResult<Json<ServiceOrder>> {
    let id = parse_id(&id)?;
    let status = req.status.as_deref().map(str::parse::<OrderStatus>).transpose()?;
    let priority = req
        .priority
        .as_deref()
        .map(str::parse::<OrderPriority>)
        .transpose()?;
    let order = state.orders.update(
        &id,
        ServiceOrderUpdate {
            priority,
            status,
            notes: req.notes,
        },
    )?;
    Ok(Json(order))
}

#[utoipa::path(
    get,
    path = "/lab/orders",
    params(WorklistQuery),
    responses(
        (status = 200, description = "Technician worklist, newest first", body = [ServiceOrder]),
        (status = 400, description = "Unknown status or test type")
    )
)]
/// Technician worklist. Canceled orders never appear; `waiting` selects
/// orders still in the `ordered` state.
#[axum::debug_handler]
pub(crate) async fn lab_worklist(
    State(state): State<AppState>,
    Query(query): Query<WorklistQuery>,
) -> ApiResult<Json<Vec<ServiceOrder>>> {
    let worklist = LabWorklistQuery {
        date_from: query.date_from,
        date_to: query.date_to,
        status: query
            .status
            .as_deref()
            .map(str::parse::<LabStatusFilter>)
            .transpose()?,
        test_type: query
            .test_type
            .as_deref()
            .map(str::parse::<TestType>)
            .transpose()?,
        skip: query.skip.unwrap_or(0),
        limit: query.limit,
    };
    Ok(Json(state.orders.list_lab_orders(&worklist)?))
}

#[utoipa::path(
    post,
    path = "/lab/orders/{id}/results",
    params(("id" = String, Path, description = "Order identifier")),
    request_body(content = Vec<u8>, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Result created or merged; order completed", body = ServiceResult),
        (status = 400, description = "Canceled order or malformed payload"),
        (status = 404, description = "No such order")
    )
)]
/// Ingests a result for an order. Repeat uploads merge: scalars overwrite,
/// attachments append.
#[axum::debug_handler]
pub(crate) async fn ingest_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<ServiceResult>> {
    let id = parse_id(&id)?;
    let ingestion = read_ingestion(multipart).await?;
    Ok(Json(state.orders.ingest_result(&id, ingestion)?))
}

#[utoipa::path(
    get,
    path = "/cls/results",
    params(ResultListQuery),
    responses(
        (status = 200, description = "Matching results", body = [ServiceResult])
    )
)]
#[axum::debug_handler]
pub(crate) async fn list_results(
    State(state): State<AppState>,
    Query(query): Query<ResultListQuery>,
) -> ApiResult<Json<Vec<ServiceResult>>> {
    let filter = ResultFilter {
        order_id: query.order_id.as_deref().map(parse_id).transpose()?,
        patient_id: query.patient_id.as_deref().map(parse_id).transpose()?,
    };
    Ok(Json(state.orders.list_results(&filter)?))
}

#[utoipa::path(
    get,
    path = "/lab/orders/{id}/attachments/{filename}",
    params(
        ("id" = String, Path, description = "Order identifier"),
        ("filename" = String, Path, description = "Stored attachment filename")
    ),
    responses(
        (status = 200, description = "Attachment bytes"),
        (status = 404, description = "No such attachment")
    )
)]
#[axum::debug_handler]
pub(crate) async fn download_attachment(
    State(state): State<AppState>,
    Path((id, filename)): Path<(String, String)>,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let bytes = state
        .attachments
        .read(&id, &filename)
        .map_err(HmsError::from)?;
    let response = (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Bytes::from(bytes),
    )
        .into_response();
    Ok(response)
}

/// Pulls an ingestion payload out of a multipart body. Unknown parts are
/// ignored so uploaders can carry extra metadata without breaking.
pub(crate) async fn read_ingestion(mut multipart: Multipart) -> ApiResult<ResultIngestion> {
    let mut ingestion = ResultIngestion::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HmsError::InvalidArgument(format!("bad multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "modality" => {
                ingestion.modality = Some(read_text(field).await?);
            }
            "conclusion" => {
                ingestion.conclusion = Some(read_text(field).await?);
            }
            "text_results" => {
                let raw = read_text(field).await?;
                ingestion.text_results = serde_json::from_str::<Vec<TextResult>>(&raw)
                    .map_err(|e| {
                        HmsError::InvalidArgument(format!("text_results is not a JSON array: {e}"))
                    })?;
            }
            "files" | "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "attachment".to_string());
                let bytes = field.bytes().await.map_err(|e| {
                    HmsError::InvalidArgument(format!("failed to read upload: {e}"))
                })?;
                ingestion.files.push(IncomingFile {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }
    Ok(ingestion)
}

pub(crate) async fn read_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| HmsError::InvalidArgument(format!("bad multipart field: {e}")).into())
}

pub fn routes() -> axum::Router<AppState> {
    use axum::routing::{get, post, put};
    axum::Router::new()
        .route("/cls/orders", post(create_order))
        .route("/cls/orders", get(list_orders))
        .route("/cls/orders/:id", get(get_order))
        .route("/cls/orders/:id", put(update_order))
        .route("/cls/results", get(list_results))
        .route("/lab/orders", get(lab_worklist))
        .route("/lab/orders/:id/results", post(ingest_result))
        .route("/lab/orders/:id/attachments/:filename", get(download_attachment))
}
