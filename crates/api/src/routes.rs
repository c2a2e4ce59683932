use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use termdesk_book::{Book, Operation};
use termdesk_core::Credential;
use termdesk_engine::{AccountInfoAction, Action, ActionId, BookAction, ListBooksAction};
use tracing::info;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Health
        .route("/health", get(health_check))
        // Terminals
        .route("/terminals", get(list_terminals))
        .route("/terminals/add", post(add_terminal))
        // Account
        .route("/account/info", post(account_info))
        // Books
        .route("/books", post(list_books))
        .route("/books/send", post(book_send))
        .route("/books/close", post(book_close))
        .route("/books/change-price", post(book_change_price))
        .route("/books/change-trailing-stop", post(book_change_stops))
        // Tasks
        .route("/tasks/status/{task_id}", get(task_status))
}

type ApiResponse = (StatusCode, Json<serde_json::Value>);

fn error(status: StatusCode, message: &str) -> ApiResponse {
    (status, Json(serde_json::json!({ "error": message })))
}

fn submitted(state: &AppState, credential: Credential, action: Box<dyn Action>) -> ApiResponse {
    let task_id = state.desk.submit(credential, action);
    (StatusCode::OK, Json(serde_json::json!({ "task_id": task_id })))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ---------------------------------------------------------------------------
// Terminals
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct AddTerminalRequest {
    broker: String,
    path: String,
}

async fn add_terminal(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddTerminalRequest>,
) -> ApiResponse {
    if req.broker.is_empty() || req.path.is_empty() {
        return error(StatusCode::BAD_REQUEST, "broker and path are required");
    }
    if !state.desk.register_terminal(&req.broker, &req.path) {
        info!(broker = %req.broker, path = %req.path, "Terminal was already registered");
    }
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "Terminal added" })),
    )
}

async fn list_terminals(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.desk.list_terminals())
}

// ---------------------------------------------------------------------------
// Account and inventory
// ---------------------------------------------------------------------------

async fn account_info(
    State(state): State<Arc<AppState>>,
    Json(acc): Json<Credential>,
) -> ApiResponse {
    submitted(&state, acc, Box::new(AccountInfoAction))
}

#[derive(Deserialize)]
struct BooksQuery {
    magic: Option<u64>,
}

async fn list_books(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BooksQuery>,
    Json(acc): Json<Credential>,
) -> ApiResponse {
    submitted(&state, acc, Box::new(ListBooksAction::new(query.magic)))
}

// ---------------------------------------------------------------------------
// Book operations
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct BookRequest {
    acc: Credential,
    book: Book,
    p: Option<Decimal>,
    tp: Option<Decimal>,
    sl: Option<Decimal>,
}

fn book_operation(state: &AppState, req: BookRequest, operation: Operation) -> ApiResponse {
    if let Err(e) = req.book.validate() {
        return error(StatusCode::BAD_REQUEST, &e.to_string());
    }
    let action = BookAction::new(req.book, operation);
    submitted(state, req.acc, Box::new(action))
}

async fn book_send(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BookRequest>,
) -> ApiResponse {
    book_operation(&state, req, Operation::Send)
}

async fn book_close(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BookRequest>,
) -> ApiResponse {
    book_operation(&state, req, Operation::Close)
}

async fn book_change_price(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BookRequest>,
) -> ApiResponse {
    let Some(price) = req.p else {
        return error(StatusCode::BAD_REQUEST, "p is required");
    };
    book_operation(&state, req, Operation::ChangePrice { price })
}

async fn book_change_stops(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BookRequest>,
) -> ApiResponse {
    let (Some(take_profit), Some(stop_loss)) = (req.tp, req.sl) else {
        return error(StatusCode::BAD_REQUEST, "tp and sl are required");
    };
    book_operation(
        &state,
        req,
        Operation::ChangeStops {
            take_profit,
            stop_loss,
        },
    )
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn task_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResponse {
    let record = task_id
        .parse::<ActionId>()
        .ok()
        .and_then(|id| state.desk.fetch_result(&id));
    match record {
        Some(record) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "task_id": task_id,
                "status": record.status,
                "result": record.result,
                "error": record.error,
                "attempt": record.attempt,
            })),
        ),
        None => error(StatusCode::NOT_FOUND, "Task not found"),
    }
}
