//! # API REST
//!
//! REST API implementation for the hospital management platform.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, multipart uploads, CORS)
//!
//! All business rules live in `hms-core`; handlers here parse, delegate and
//! shape responses.

#![warn(rust_2018_idioms)]

pub mod catalog;
pub mod error;
pub mod insurance;
pub mod orders;
pub mod patients;
pub mod prescriptions;

use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use hms_core::catalog::CatalogService;
use hms_core::insurance::InsuranceService;
use hms_core::orders::OrderService;
use hms_core::patients::PatientService;
use hms_core::prescriptions::PrescriptionService;
use hms_core::{CoreConfig, Database, HmsError};
use hms_files::AttachmentStore;
use hms_id::DocId;
use hms_insurance_client::InsuranceClient;

use crate::error::ApiResult;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<CoreConfig>,
    pub patients: PatientService,
    pub catalog: CatalogService,
    pub prescriptions: PrescriptionService,
    pub orders: OrderService,
    pub insurance: InsuranceService,
    pub attachments: Arc<AttachmentStore>,
    pub insurance_client: Arc<InsuranceClient>,
}

impl AppState {
    pub fn new(
        cfg: Arc<CoreConfig>,
        db: Arc<Database>,
        attachments: Arc<AttachmentStore>,
        insurance_client: Arc<InsuranceClient>,
    ) -> Self {
        Self {
            cfg,
            patients: PatientService::new(db.clone()),
            catalog: CatalogService::new(db.clone()),
            prescriptions: PrescriptionService::new(db.clone()),
            orders: OrderService::new(db.clone(), attachments.clone()),
            insurance: InsuranceService::new(db),
            attachments,
            insurance_client,
        }
    }
}

/// Parses a path or query identifier, turning a malformed one into a 400.
pub(crate) fn parse_id(raw: &str) -> Result<DocId, HmsError> {
    DocId::parse(raw).map_err(HmsError::from)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
#[axum::debug_handler]
pub(crate) async fn health(State(_state): State<AppState>) -> ApiResult<Json<HealthRes>> {
    Ok(Json(HealthRes {
        ok: true,
        message: "HMS REST API is alive".into(),
    }))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        patients::list_patients,
        patients::create_patient,
        patients::get_patient,
        patients::update_patient,
        patients::delete_patient,
        patients::merge_insurance,
        catalog::list_drugs,
        catalog::create_drug,
        catalog::get_drug,
        catalog::update_drug,
        catalog::deactivate_drug,
        prescriptions::list_prescriptions,
        prescriptions::create_prescription,
        prescriptions::get_prescription,
        prescriptions::set_prescription_status,
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::update_order,
        orders::lab_worklist,
        orders::ingest_result,
        orders::list_results,
        orders::download_attachment,
        insurance::validate_card,
        insurance::list_cards,
        insurance::add_card,
        insurance::get_card,
    ),
    components(schemas(
        HealthRes,
        error::ErrorBody,
        hms_core::domain::Patient,
        hms_core::domain::InsuranceInfo,
        hms_core::domain::Drug,
        hms_core::domain::DrugSnapshot,
        hms_core::domain::Prescription,
        hms_core::domain::PrescriptionItem,
        hms_core::domain::PrescriptionStatus,
        hms_core::domain::ServiceOrder,
        hms_core::domain::ServiceOrderItem,
        hms_core::domain::ServiceResult,
        hms_core::domain::TextResult,
        hms_core::domain::OrderStatus,
        hms_core::domain::OrderPriority,
        hms_core::domain::InsuranceCard,
        hms_core::insurance::InsuranceValidation,
        hms_core::insurance::NewInsuranceCard,
        hms_files::StoredAttachment,
        patients::CreatePatientReq,
        patients::UpdatePatientReq,
        patients::ValidateInsuranceReq,
        catalog::CreateDrugReq,
        catalog::UpdateDrugReq,
        prescriptions::CreatePrescriptionReq,
        prescriptions::PrescriptionItemReq,
        prescriptions::SetStatusReq,
        orders::CreateOrderReq,
        orders::OrderItemReq,
        orders::UpdateOrderReq,
        insurance::ValidateCardReq,
    ))
)]
pub struct ApiDoc;

/// Assembles the full application router, Swagger UI and CORS included.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(patients::routes())
        .merge(catalog::routes())
        .merge(prescriptions::routes())
        .merge(orders::routes())
        .merge(insurance::routes())
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_assembles() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = Arc::new(
            CoreConfig::new(dir.path().to_path_buf(), "http://localhost:8002".into()).unwrap(),
        );
        let db = Arc::new(Database::new());
        let attachments = Arc::new(AttachmentStore::new(dir.path()).unwrap());
        let client = Arc::new(InsuranceClient::new(cfg.insurance_url()).unwrap());
        let _app = router(AppState::new(cfg, db, attachments, client));
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        assert!(parse_id("not-an-id").is_err());
        let id = DocId::new();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }
}
