// 🌐 REST API - axum routes over the card store
//
// Goal updates reconcile the card's bingos on the server and return the
// delta, so a client can re-render without fetching the card again.

use crate::card::{Bingo, Card, CardDetails, CardSettingsUpdate, Goal, GoalUpdate, NewCard};
use crate::db::{self, CardEvent};
use crate::error::BingoError;
use crate::lines::Line;
use crate::reconcile::ReconcileReport;
use crate::session::CardSession;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
}

impl AppState {
    pub fn new(conn: Connection) -> Self {
        AppState {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, BingoError> {
        self.db
            .lock()
            .map_err(|_| BingoError::Internal("database lock poisoned".to_string()))
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

/// Error response. Store failures are logged here with the operation and
/// target, and reach the caller only as a generic message.
#[derive(Debug)]
pub struct ApiError {
    error: BingoError,
}

impl ApiError {
    fn during(operation: &'static str, target: impl std::fmt::Display) -> impl FnOnce(BingoError) -> ApiError {
        move |err| {
            if err.is_internal() {
                error!(operation, target = %target, error = %err, "request failed");
            }
            ApiError { error: err }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.error {
            BingoError::Validation(_) => StatusCode::BAD_REQUEST,
            BingoError::NotFound(_) => StatusCode::NOT_FOUND,
            BingoError::Forbidden(_) => StatusCode::FORBIDDEN,
            BingoError::DuplicateCode(_) => StatusCode::CONFLICT,
            BingoError::Store(_) | BingoError::Serialization(_) | BingoError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<BingoError> for ApiError {
    fn from(error: BingoError) -> Self {
        ApiError { error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = if self.error.is_internal() {
            "internal server error".to_string()
        } else {
            self.error.to_string()
        };

        (self.status_code(), Json(ApiResponse::err(message))).into_response()
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| BingoError::validation("body", rejection.body_text()).into())
}

// ============================================================================
// PAYLOADS
// ============================================================================

#[derive(Serialize)]
struct CreatedCard {
    code: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteCardRequest {
    owner_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BingoRequest {
    card_code: String,
    #[serde(rename = "type")]
    kind: String,
    index: i64,
}

#[derive(Serialize)]
struct Removed {
    removed: bool,
}

/// Outcome of a reconciliation pass, with the card's bingos afterwards
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReconcileResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    goal: Option<Goal>,
    bingos: Vec<Bingo>,
    added: Vec<Bingo>,
    removed: Vec<Line>,
    celebrate: bool,
    converged: bool,
}

impl ReconcileResponse {
    fn new(session: CardSession, report: ReconcileReport, goal: Option<Goal>) -> Self {
        ReconcileResponse {
            goal,
            bingos: session.bingos,
            converged: report.is_converged(),
            celebrate: report.celebrate,
            added: report.added,
            removed: report.removed,
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/health
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/cards
async fn create_card(
    State(state): State<AppState>,
    payload: Result<Json<NewCard>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedCard>>), ApiError> {
    let new_card = body(payload)?;
    let conn = state.conn()?;

    let code = db::create_card(&conn, &new_card)
        .map_err(ApiError::during("create_card", new_card.owner_name.trim()))?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(CreatedCard { code }))))
}

/// GET /api/cards/:code
async fn get_card(State(state): State<AppState>, Path(code): Path<String>) -> ApiResult<CardDetails> {
    let conn = state.conn()?;
    let details = db::get_card(&conn, &code).map_err(ApiError::during("get_card", &code))?;
    ok(details)
}

/// PUT /api/cards/:code
async fn update_card(
    State(state): State<AppState>,
    Path(code): Path<String>,
    payload: Result<Json<CardSettingsUpdate>, JsonRejection>,
) -> ApiResult<Card> {
    let update = body(payload)?;
    let conn = state.conn()?;

    let card = db::update_card_settings(&conn, &code, &update)
        .map_err(ApiError::during("update_card_settings", &code))?;
    ok(card)
}

/// DELETE /api/cards/:code
async fn delete_card(
    State(state): State<AppState>,
    Path(code): Path<String>,
    payload: Result<Json<DeleteCardRequest>, JsonRejection>,
) -> ApiResult<CreatedCard> {
    let request = body(payload)?;
    let conn = state.conn()?;

    db::delete_card(&conn, &code, &request.owner_name)
        .map_err(ApiError::during("delete_card", &code))?;
    ok(CreatedCard { code })
}

/// POST /api/cards/:code/check - reconcile without a goal change
async fn check_card(State(state): State<AppState>, Path(code): Path<String>) -> ApiResult<ReconcileResponse> {
    let conn = state.conn()?;

    let (session, report) = CardSession::load(&conn, &code)
        .and_then(|session| session.recheck(&conn))
        .map_err(ApiError::during("recheck", &code))?;

    ok(ReconcileResponse::new(session, report, None))
}

/// GET /api/cards/:code/events
async fn card_events(State(state): State<AppState>, Path(code): Path<String>) -> ApiResult<Vec<CardEvent>> {
    let conn = state.conn()?;
    let events = db::get_card_events(&conn, &code).map_err(ApiError::during("get_card_events", &code))?;
    ok(events)
}

/// PUT /api/goals/:id - update a goal, then reconcile its card
async fn update_goal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<GoalUpdate>, JsonRejection>,
) -> ApiResult<ReconcileResponse> {
    let update = body(payload)?;
    let conn = state.conn()?;
    let fail = || ApiError::during("update_goal", id);

    let goal = db::get_goal(&conn, id).map_err(fail())?;
    let (session, report) = CardSession::load(&conn, &goal.card_code)
        .and_then(|session| session.update_goal(&conn, id, &update))
        .map_err(fail())?;

    let goal = session.goal(id).cloned();
    ok(ReconcileResponse::new(session, report, goal))
}

/// POST /api/bingos
async fn add_bingo(
    State(state): State<AppState>,
    payload: Result<Json<BingoRequest>, JsonRejection>,
) -> ApiResult<Bingo> {
    let request = body(payload)?;
    let line = Line::parse(&request.kind, request.index)?;
    let conn = state.conn()?;
    let fail = || ApiError::during("add_bingo", &request.card_code);

    db::get_card(&conn, &request.card_code).map_err(fail())?;
    let bingo = db::add_bingo(&conn, &request.card_code, line).map_err(fail())?;
    ok(bingo)
}

/// DELETE /api/bingos/:code/:type/:index
async fn remove_bingo(
    State(state): State<AppState>,
    Path((code, kind, index)): Path<(String, String, i64)>,
) -> ApiResult<Removed> {
    let line = Line::parse(&kind, index)?;
    let conn = state.conn()?;
    let fail = || ApiError::during("remove_bingo", &code);

    db::get_card(&conn, &code).map_err(fail())?;
    let removed = db::remove_bingo(&conn, &code, line).map_err(fail())?;
    ok(Removed { removed })
}

// ============================================================================
// ROUTER
// ============================================================================

/// `/api` routes plus static assets for everything else
pub fn router(state: AppState, static_dir: &std::path::Path) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/cards", post(create_card))
        .route("/cards/:code", get(get_card).put(update_card).delete(delete_card))
        .route("/cards/:code/check", post(check_card))
        .route("/cards/:code/events", get(card_events))
        .route("/goals/:id", put(update_goal))
        .route("/bingos", post(add_bingo))
        .route("/bingos/:code/:type/:index", delete(remove_bingo))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .fallback_service(ServeDir::new(static_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

// ============================================================================
// TESTS
// ============================================================================
