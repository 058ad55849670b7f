use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use coach_core::error::CoachError;
use coach_core::generator::TextGenerator;
use coach_core::plan::{
    DateRange, PlanRequest, generate_plan, generate_plan_from_weakness, get_plan_with_tasks,
};
use coach_core::questions::{QuestionRequest, ensure_available_detailed};
use coach_core::repair::{RepairScope, check_linkage, repair_linkage};
use coach_core::session::{Answer, StartSession, complete_session, record_answer, start_session};
use coach_core::weakness::{
    RecordWeakness, WeaknessQuery, get_weakness, list_weaknesses, record_weakness,
    set_weakness_status, weakness_summary,
};
use coach_db::models::{Severity, WeaknessStatus};
use coach_db::{Gateway, Page};

// ---------------------------------------------------------------------------
// State and envelope
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub generator: Arc<dyn TextGenerator>,
}

/// Success envelope: `{"success": true, "data": ...}`.
#[derive(Debug, Serialize)]
struct Envelope<T> {
    success: bool,
    data: T,
}

fn ok<T: Serialize>(data: T) -> Response {
    Json(Envelope {
        success: true,
        data,
    })
    .into_response()
}

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }
}

impl From<CoachError> for AppError {
    fn from(err: CoachError) -> Self {
        let status = match &err {
            CoachError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoachError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CoachError::Conflict(_) => StatusCode::CONFLICT,
            CoachError::NoQuestionsAvailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoachError::Generator(_) | CoachError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            CoachError::Persistence(_) | CoachError::InvariantViolation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "success": false, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult = Result<Response, AppError>;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GeneratePlanBody {
    pub student_name: String,
    #[serde(default)]
    pub target_school: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub daily_duration: i32,
}

#[derive(Debug, Deserialize)]
pub struct WeaknessPlanBody {
    pub weakness_id: Uuid,
    #[serde(default)]
    pub student_name: String,
    #[serde(default)]
    pub target_school: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub daily_duration: i32,
}

#[derive(Debug, Deserialize)]
pub struct RepairBody {
    #[serde(default)]
    pub scope: Option<RepairScope>,
    /// Report drift without running the passes.
    #[serde(default)]
    pub check: bool,
}

#[derive(Debug, Deserialize)]
pub struct AnswerBody {
    #[serde(default)]
    pub question_id: Option<Uuid>,
    pub question_text: String,
    pub answer_text: String,
    #[serde(default)]
    pub response_time: Option<i32>,
}

/// Query string for `GET /api/weaknesses`.
#[derive(Debug, Deserialize)]
pub struct WeaknessListParams {
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<WeaknessStatus>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct WeaknessStatusBody {
    pub status: WeaknessStatus,
}

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    #[serde(default)]
    pub student_name: Option<String>,
}

fn plan_request(
    student_name: String,
    target_school: String,
    start: NaiveDate,
    end: NaiveDate,
    daily_duration: i32,
) -> Result<PlanRequest, AppError> {
    Ok(PlanRequest {
        student_name,
        target_school,
        range: DateRange::new(start, end)?,
        daily_duration,
    })
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/questions/ensure", post(ensure_questions))
        .route("/api/plans/generate", post(create_plan))
        .route("/api/plans/from-weakness", post(create_weakness_plan))
        .route("/api/plans/{id}", get(show_plan))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}/answers", post(create_answer))
        .route("/api/sessions/{id}/complete", post(finish_session))
        .route("/api/weaknesses", post(create_weakness).get(index_weaknesses))
        .route("/api/weaknesses/summary", get(summarize_weaknesses))
        .route("/api/weaknesses/{id}", get(show_weakness))
        .route("/api/weaknesses/{id}/status", patch(update_weakness_status))
        .route("/api/repair", post(run_repair))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(
    gateway: Gateway,
    generator: Arc<dyn TextGenerator>,
    bind: &str,
    port: u16,
) -> Result<()> {
    let app = build_router(AppState { gateway, generator });
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("coach serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("coach serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl+C; serving until killed");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Response {
    ok(serde_json::json!({ "status": "ok" }))
}

async fn ensure_questions(
    State(state): State<AppState>,
    body: Result<Json<QuestionRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = body?;
    if request.count == 0 {
        return Err(AppError::bad_request("count must be positive"));
    }
    let result = ensure_available_detailed(&state.gateway, state.generator.as_ref(), &request).await;
    Ok(ok(result))
}

async fn create_plan(
    State(state): State<AppState>,
    body: Result<Json<GeneratePlanBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let request = plan_request(
        body.student_name,
        body.target_school,
        body.start_date,
        body.end_date,
        body.daily_duration,
    )?;
    let stored = generate_plan(&state.gateway, state.generator.as_ref(), &request).await?;
    Ok(ok(stored))
}

async fn create_weakness_plan(
    State(state): State<AppState>,
    body: Result<Json<WeaknessPlanBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let request = plan_request(
        body.student_name,
        body.target_school,
        body.start_date,
        body.end_date,
        body.daily_duration,
    )?;
    let stored = generate_plan_from_weakness(
        &state.gateway,
        state.generator.as_ref(),
        body.weakness_id,
        &request,
    )
    .await?;
    Ok(ok(stored))
}

async fn show_plan(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult {
    Ok(ok(get_plan_with_tasks(&state.gateway, id).await?))
}

async fn create_session(
    State(state): State<AppState>,
    body: Result<Json<StartSession>, JsonRejection>,
) -> ApiResult {
    let Json(request) = body?;
    let started = start_session(&state.gateway, state.generator.as_ref(), &request).await?;
    Ok(ok(started))
}

async fn create_answer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    body: Result<Json<AnswerBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let record = record_answer(
        &state.gateway,
        &Answer {
            session_id,
            question_id: body.question_id,
            question_text: body.question_text,
            answer_text: body.answer_text,
            response_time: body.response_time,
        },
    )
    .await?;
    Ok(ok(record))
}

async fn finish_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult {
    Ok(ok(complete_session(&state.gateway, id).await?))
}

async fn create_weakness(
    State(state): State<AppState>,
    body: Result<Json<RecordWeakness>, JsonRejection>,
) -> ApiResult {
    let Json(input) = body?;
    Ok(ok(record_weakness(&state.gateway, &input).await?))
}

async fn index_weaknesses(
    State(state): State<AppState>,
    params: Result<Query<WeaknessListParams>, QueryRejection>,
) -> ApiResult {
    let Query(params) = params?;
    let page = Page::new(
        params.limit.unwrap_or(Page::default().limit()),
        params.offset.unwrap_or(0),
    );
    let query = WeaknessQuery {
        student_name: params.student_name,
        category: params.category,
        status: params.status,
        severity: params.severity,
    };
    Ok(ok(list_weaknesses(&state.gateway, &query, page).await?))
}

async fn show_weakness(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult {
    Ok(ok(get_weakness(&state.gateway, id).await?))
}

async fn update_weakness_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<WeaknessStatusBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    Ok(ok(set_weakness_status(&state.gateway, id, body.status).await?))
}

async fn summarize_weaknesses(
    State(state): State<AppState>,
    params: Result<Query<SummaryParams>, QueryRejection>,
) -> ApiResult {
    let Query(params) = params?;
    Ok(ok(weakness_summary(&state.gateway, params.student_name.as_deref()).await?))
}

async fn run_repair(
    State(state): State<AppState>,
    body: Result<Json<RepairBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let scope = body.scope.unwrap_or(RepairScope::All);
    let report = if body.check {
        check_linkage(&state.gateway, scope).await?
    } else {
        repair_linkage(&state.gateway, scope).await?
    };
    Ok(ok(report))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
