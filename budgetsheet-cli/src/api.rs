//! Web API - JSON endpoints over the ledger service
//!
//! Routes:
//! - POST /api/sheets/update-budget/  `{"amount": 5000}`
//! - POST /api/sheets/add-expense/    `{"date"?, "category", "description", "amount"}`
//! - GET  /api/sheets/sync/           whole ledger
//!
//! Every response is `{"status": "success" | "error", "message"?, "data"?}`.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use budgetsheet_core::{Error, Expense, LedgerService, OperationResult};

/// Shared state: one ledger, used by one request at a time
#[derive(Clone)]
pub struct AppState {
    ledger: Arc<Mutex<LedgerService>>,
}

impl AppState {
    pub fn new(ledger: Arc<Mutex<LedgerService>>) -> Self {
        Self { ledger }
    }

    /// Run an operation that is safe to repeat. After an auth failure the
    /// ledger reconnects and the operation runs once more.
    async fn run<T, F>(&self, op: F) -> Result<T, Error>
    where
        F: Fn(&mut LedgerService) -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        self.execute(true, op).await
    }

    /// Run an operation that must not be repeated within one request. An
    /// auth failure still drops the connection so the next request reconnects.
    async fn run_once<T, F>(&self, op: F) -> Result<T, Error>
    where
        F: Fn(&mut LedgerService) -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        self.execute(false, op).await
    }

    /// Run on the blocking pool, connecting first if the ledger is not
    /// authenticated yet
    async fn execute<T, F>(&self, retry: bool, op: F) -> Result<T, Error>
    where
        F: Fn(&mut LedgerService) -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        let ledger = Arc::clone(&self.ledger);
        tokio::task::spawn_blocking(move || {
            let mut ledger = ledger
                .lock()
                .map_err(|e| Error::Other(format!("Lock poisoned: {}", e)))?;
            if !ledger.is_authenticated() {
                ledger.authenticate()?;
            }

            match op(&mut ledger) {
                Err(Error::Auth(message)) => {
                    tracing::warn!(error = %message, "credentials rejected, reconnecting");
                    ledger.disconnect();
                    if !retry {
                        return Err(Error::Auth(message));
                    }
                    ledger.authenticate()?;
                    op(&mut ledger)
                }
                other => other,
            }
        })
        .await
        .map_err(|e| Error::Other(format!("Worker task failed: {}", e)))?
    }
}

#[derive(Debug, Deserialize)]
pub struct BudgetRequest {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ExpenseRequest {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub category: String,
    pub description: String,
    pub amount: Decimal,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let sheets_routes = Router::new()
        .route("/update-budget/", post(update_budget))
        .route("/add-expense/", post(add_expense))
        .route("/sync/", get(sync));

    Router::new()
        .nest("/api/sheets", sheets_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Auth(_) => StatusCode::UNAUTHORIZED,
        Error::Remote(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: Serialize>(result: Result<OperationResult<T>, Error>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => (
            status_for(&e),
            Json(OperationResult::<()>::fail(e.to_string())),
        )
            .into_response(),
    }
}

fn bad_request(rejection: JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(OperationResult::<()>::fail(rejection.body_text())),
    )
        .into_response()
}

fn with_message<T>(message: &str) -> OperationResult<T> {
    let mut result = OperationResult::done();
    result.message = Some(message.to_string());
    result
}

async fn update_budget(
    State(state): State<AppState>,
    payload: Result<Json<BudgetRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) => return bad_request(rejection),
    };

    let result = state
        .run(move |ledger| ledger.update_budget(request.amount))
        .await
        .map(|_| with_message::<()>("Budget updated successfully"));
    respond(result)
}

async fn add_expense(
    State(state): State<AppState>,
    payload: Result<Json<ExpenseRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) => return bad_request(rejection),
    };

    let expense = Expense::new(
        request.date.unwrap_or_else(|| Local::now().date_naive()),
        request.category,
        request.description,
        request.amount,
    );
    let result = state
        .run_once(move |ledger| ledger.add_expense(&expense))
        .await
        .map(|_| with_message::<()>("Expense added successfully"));
    respond(result)
}

async fn sync(State(state): State<AppState>) -> Response {
    let result = state
        .run(|ledger| ledger.get_all_data())
        .await
        .map(OperationResult::ok);
    respond(result)
}
