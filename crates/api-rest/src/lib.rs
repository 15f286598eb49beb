//! # API REST
//!
//! REST API implementation for the clinic status lifecycle.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status codes, actor headers)
//!
//! Every mutation goes through [`TransitionExecutor`]; handlers only decode requests and map
//! failures to `{ kind, message }` bodies.

#![warn(rust_2018_idioms)]

use api_shared::auth::{
    actor_from_headers, validate_api_key, ACTOR_CAPABILITIES_HEADER, ACTOR_ID_HEADER,
    ACTOR_ROLE_HEADER, API_KEY_HEADER,
};
use api_shared::{
    ApiError, BillItemReq, CreateBillReq, CreateLabOrderReq, CreateMedicalRecordReq, ErrorRes,
    HealthRes, HealthService, ListQuery, ListRes, PrescriptionLineReq, ResultParameter,
    StatusChangeReq, WireEntity, parse_status,
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, patch},
    Router,
};
use clinic_core::config::{
    data_dir_from_env_value, duration_secs_from_env_value, gst_rate_from_env_value,
};
use clinic_core::constants::{
    DEFAULT_CACHE_TTL_SECS, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_REST_ADDR,
};
use clinic_core::lifecycle::{NewBill, NewLabOrder, NewMedicalRecord};
use clinic_core::{
    Actor, Bill, ClinicConfig, LabOrder, MedicalRecord, PatientWorkload, PermissionGate,
    StatusBearing, TransitionError, TransitionExecutor,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

/// Application state shared across REST API handlers.
#[derive(Clone)]
pub struct AppState {
    executor: TransitionExecutor,
    cfg: Arc<ClinicConfig>,
}

/// Status code plus `{ kind, message }` body.
pub type Failure = (StatusCode, Json<ErrorRes>);

type HandlerResult<T> = Result<Json<T>, Failure>;

fn failure(err: ApiError) -> Failure {
    let status = StatusCode::from_u16(err.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(kind = ?err.kind, "{}", err.message);
    } else {
        tracing::warn!(kind = ?err.kind, "{}", err.message);
    }
    (status, Json(ErrorRes::from(&err)))
}

fn rejected(err: TransitionError) -> Failure {
    failure(err.into())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

impl AppState {
    pub fn new(executor: TransitionExecutor, cfg: Arc<ClinicConfig>) -> Self {
        Self { executor, cfg }
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<(), Failure> {
        validate_api_key(self.cfg.api_key(), header(headers, API_KEY_HEADER)).map_err(failure)
    }

    fn actor(&self, headers: &HeaderMap) -> Result<Actor, Failure> {
        self.authenticate(headers)?;
        actor_from_headers(
            header(headers, ACTOR_ID_HEADER),
            header(headers, ACTOR_ROLE_HEADER),
            header(headers, ACTOR_CAPABILITIES_HEADER),
        )
        .map_err(failure)
    }

    async fn list<E: StatusBearing>(
        &self,
        headers: &HeaderMap,
        query: ListQuery,
    ) -> HandlerResult<ListRes<E>> {
        self.authenticate(headers)?;
        let items = self
            .executor
            .list::<E>(&query.into())
            .await
            .map_err(rejected)?;
        Ok(Json(ListRes { items }))
    }

    async fn fetch<E: StatusBearing>(&self, headers: &HeaderMap, id: Uuid) -> HandlerResult<E> {
        self.authenticate(headers)?;
        let entity = self.executor.get::<E>(id).await.map_err(rejected)?;
        Ok(Json(entity))
    }

    async fn change_status<E: WireEntity>(
        &self,
        headers: &HeaderMap,
        id: Uuid,
        req: StatusChangeReq,
    ) -> HandlerResult<E> {
        let actor = self.actor(headers)?;
        let target = parse_status::<E::Status>(&req.status).map_err(failure)?;
        PermissionGate::authorize(&actor, E::capability_for(target)).map_err(rejected)?;
        let (expected, action) = E::decode(&req).map_err(failure)?;
        let entity = self
            .executor
            .transition::<E>(&actor, id, expected, action)
            .await
            .map_err(rejected)?;
        Ok(Json(entity))
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_lab_orders,
        create_lab_order,
        get_lab_order,
        update_lab_order_status,
        list_medical_records,
        create_medical_record,
        get_medical_record,
        update_prescription_status,
        list_bills,
        create_bill,
        get_bill,
        update_bill_status,
        delete_bill,
        patient_workload,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        StatusChangeReq,
        ResultParameter,
        CreateLabOrderReq,
        CreateMedicalRecordReq,
        PrescriptionLineReq,
        CreateBillReq,
        BillItemReq,
    ))
)]
struct ApiDoc;

/// Builds the REST router over `executor`.
pub fn app(executor: TransitionExecutor, cfg: Arc<ClinicConfig>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/lab_orders", get(list_lab_orders).post(create_lab_order))
        .route("/lab_orders/:id", get(get_lab_order))
        .route("/lab_orders/:id/status", patch(update_lab_order_status))
        .route(
            "/medical_records",
            get(list_medical_records).post(create_medical_record),
        )
        .route("/medical_records/:id", get(get_medical_record))
        .route(
            "/medical_records/:id/status",
            patch(update_prescription_status),
        )
        .route("/bills", get(list_bills).post(create_bill))
        .route("/bills/:id", get(get_bill).delete(delete_bill))
        .route("/bills/:id/status", patch(update_bill_status))
        .route("/patients/:id/workload", get(patient_workload))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(AppState::new(executor, cfg))
}

/// Resolves configuration from `CLINIC_*` environment variables.
///
/// # Errors
/// Returns an error if any variable is present but malformed, or the combination is invalid
/// (for example a cache TTL not shorter than the poll interval).
pub fn config_from_env() -> anyhow::Result<ClinicConfig> {
    let var = |name: &str| std::env::var(name).ok();

    let rest_addr = var("CLINIC_REST_ADDR")
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REST_ADDR.into());
    let poll_interval = duration_secs_from_env_value(
        "CLINIC_POLL_INTERVAL_SECS",
        var("CLINIC_POLL_INTERVAL_SECS"),
        DEFAULT_POLL_INTERVAL_SECS,
    )?;
    let cache_ttl = duration_secs_from_env_value(
        "CLINIC_CACHE_TTL_SECS",
        var("CLINIC_CACHE_TTL_SECS"),
        DEFAULT_CACHE_TTL_SECS,
    )?;

    Ok(ClinicConfig::new(
        rest_addr,
        data_dir_from_env_value(var("CLINIC_DATA_DIR")),
        poll_interval,
        cache_ttl,
        gst_rate_from_env_value(var("CLINIC_GST_RATE_BPS"))?,
        var("CLINIC_API_KEY"),
    )?)
}

/// Opens the configured store and serves the API until ctrl-c.
pub async fn serve(cfg: Arc<ClinicConfig>) -> anyhow::Result<()> {
    let store = clinic_core::store::open(&cfg).await?;
    let executor = TransitionExecutor::new(store, cfg.clone());

    tracing::info!("++ Starting clinic REST API on {}", cfg.rest_addr());
    if cfg.api_key().is_none() {
        tracing::warn!("CLINIC_API_KEY not set; API key check disabled");
    }

    let listener = tokio::net::TcpListener::bind(cfg.rest_addr()).await?;
    axum::serve(listener, app(executor, cfg))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("-- Shutting down clinic REST API");
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    get,
    path = "/lab_orders",
    params(ListQuery),
    responses(
        (status = 200, description = "Full snapshot of matching lab orders as `{ items }`"),
        (status = 401, description = "Missing or invalid API key", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn list_lab_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> HandlerResult<ListRes<LabOrder>> {
    state.list(&headers, query).await
}

#[utoipa::path(
    post,
    path = "/lab_orders",
    request_body = CreateLabOrderReq,
    responses(
        (status = 201, description = "Lab order created in `ordered`"),
        (status = 403, description = "Actor may not order lab tests", body = ErrorRes),
        (status = 422, description = "Blank test name or code", body = ErrorRes)
    )
)]
/// Orders a lab test.
#[axum::debug_handler]
async fn create_lab_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateLabOrderReq>,
) -> Result<(StatusCode, Json<LabOrder>), Failure> {
    let actor = state.actor(&headers)?;
    let input = NewLabOrder::try_from(req).map_err(failure)?;
    let order = state
        .executor
        .create_lab_order(&actor, input)
        .await
        .map_err(rejected)?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[utoipa::path(
    get,
    path = "/lab_orders/{id}",
    params(("id" = Uuid, Path, description = "Lab order id")),
    responses(
        (status = 200, description = "The lab order"),
        (status = 404, description = "No such lab order", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_lab_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> HandlerResult<LabOrder> {
    state.fetch(&headers, id).await
}

#[utoipa::path(
    patch,
    path = "/lab_orders/{id}/status",
    params(("id" = Uuid, Path, description = "Lab order id")),
    request_body = StatusChangeReq,
    responses(
        (status = 200, description = "Updated lab order"),
        (status = 403, description = "Permission denied", body = ErrorRes),
        (status = 409, description = "Illegal transition", body = ErrorRes),
        (status = 412, description = "Expected status is stale", body = ErrorRes),
        (status = 422, description = "Result has no parameters or attachments", body = ErrorRes)
    )
)]
/// Moves a lab order along its lifecycle.
///
/// Completing an order requires `parameters` and/or `attachments` in the body.
#[axum::debug_handler]
async fn update_lab_order_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusChangeReq>,
) -> HandlerResult<LabOrder> {
    state.change_status(&headers, id, req).await
}

#[utoipa::path(
    get,
    path = "/medical_records",
    params(ListQuery),
    responses(
        (status = 200, description = "Full snapshot of matching medical records as `{ items }`"),
        (status = 401, description = "Missing or invalid API key", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn list_medical_records(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> HandlerResult<ListRes<MedicalRecord>> {
    state.list(&headers, query).await
}

#[utoipa::path(
    post,
    path = "/medical_records",
    request_body = CreateMedicalRecordReq,
    responses(
        (status = 201, description = "Record created with its prescriptions pending"),
        (status = 403, description = "Actor may not create medical records", body = ErrorRes),
        (status = 422, description = "Blank prescription field", body = ErrorRes)
    )
)]
/// Records a consultation together with its prescription lines.
#[axum::debug_handler]
async fn create_medical_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateMedicalRecordReq>,
) -> Result<(StatusCode, Json<MedicalRecord>), Failure> {
    let actor = state.actor(&headers)?;
    let input = NewMedicalRecord::try_from(req).map_err(failure)?;
    let record = state
        .executor
        .create_medical_record(&actor, input)
        .await
        .map_err(rejected)?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(
    get,
    path = "/medical_records/{id}",
    params(("id" = Uuid, Path, description = "Medical record id")),
    responses(
        (status = 200, description = "The medical record"),
        (status = 404, description = "No such record", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_medical_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> HandlerResult<MedicalRecord> {
    state.fetch(&headers, id).await
}

#[utoipa::path(
    patch,
    path = "/medical_records/{id}/status",
    params(("id" = Uuid, Path, description = "Medical record id")),
    request_body = StatusChangeReq,
    responses(
        (status = 200, description = "Updated medical record"),
        (status = 403, description = "Permission denied", body = ErrorRes),
        (status = 409, description = "Illegal transition or already dispensed", body = ErrorRes),
        (status = 412, description = "Expected status is stale", body = ErrorRes),
        (status = 422, description = "Record has no prescription lines", body = ErrorRes)
    )
)]
/// Dispenses or cancels the prescriptions of a record.
#[axum::debug_handler]
async fn update_prescription_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusChangeReq>,
) -> HandlerResult<MedicalRecord> {
    state.change_status(&headers, id, req).await
}

#[utoipa::path(
    get,
    path = "/bills",
    params(ListQuery),
    responses(
        (status = 200, description = "Full snapshot of matching bills as `{ items }`"),
        (status = 401, description = "Missing or invalid API key", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn list_bills(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> HandlerResult<ListRes<Bill>> {
    state.list(&headers, query).await
}

#[utoipa::path(
    post,
    path = "/bills",
    request_body = CreateBillReq,
    responses(
        (status = 201, description = "Bill raised with totals computed"),
        (status = 403, description = "Actor may not create invoices", body = ErrorRes),
        (status = 422, description = "Invalid items, discount or initial payment", body = ErrorRes)
    )
)]
/// Raises a bill. GST is applied at the configured rate.
#[axum::debug_handler]
async fn create_bill(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateBillReq>,
) -> Result<(StatusCode, Json<Bill>), Failure> {
    let actor = state.actor(&headers)?;
    let input = NewBill::try_from(req).map_err(failure)?;
    let bill = state
        .executor
        .create_bill(&actor, input)
        .await
        .map_err(rejected)?;
    Ok((StatusCode::CREATED, Json(bill)))
}

#[utoipa::path(
    get,
    path = "/bills/{id}",
    params(("id" = Uuid, Path, description = "Bill id")),
    responses(
        (status = 200, description = "The bill"),
        (status = 404, description = "No such bill", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_bill(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> HandlerResult<Bill> {
    state.fetch(&headers, id).await
}

#[utoipa::path(
    patch,
    path = "/bills/{id}/status",
    params(("id" = Uuid, Path, description = "Bill id")),
    request_body = StatusChangeReq,
    responses(
        (status = 200, description = "Updated bill"),
        (status = 403, description = "Permission denied", body = ErrorRes),
        (status = 409, description = "Illegal transition", body = ErrorRes),
        (status = 412, description = "Expected status is stale", body = ErrorRes)
    )
)]
/// Confirms payment of, or cancels, a bill.
#[axum::debug_handler]
async fn update_bill_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusChangeReq>,
) -> HandlerResult<Bill> {
    state.change_status(&headers, id, req).await
}

#[utoipa::path(
    delete,
    path = "/bills/{id}",
    params(("id" = Uuid, Path, description = "Bill id")),
    responses(
        (status = 204, description = "Bill deleted"),
        (status = 403, description = "Only admins delete bills", body = ErrorRes),
        (status = 404, description = "No such bill", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn delete_bill(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, Failure> {
    let actor = state.actor(&headers)?;
    state
        .executor
        .delete_bill(&actor, id)
        .await
        .map_err(rejected)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/patients/{id}/workload",
    params(("id" = Uuid, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Open lab orders, pending prescriptions and unpaid bills")
    )
)]
/// Outstanding work for one patient across all three lifecycles.
#[axum::debug_handler]
async fn patient_workload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> HandlerResult<PatientWorkload> {
    state.authenticate(&headers)?;
    let workload = state
        .executor
        .patient_workload(id)
        .await
        .map_err(rejected)?;
    Ok(Json(workload))
}
