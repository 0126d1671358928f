use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::request::Parts,
    response::Json,
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use crate::{
    engine::BetEngine,
    models::{BetSlip, LedgerMovement, ProposedLeg, SettlementUpdate, SlipReceipt},
};

pub const USER_HEADER: &str = "x-user-id";
const DEFAULT_STATEMENT_LIMIT: usize = 50;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BetEngine>,
}

/// Create the API router
pub fn create_router(engine: Arc<BetEngine>) -> Router {
    let state = AppState { engine };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/slips", post(create_slip).get(list_slips))
        .route("/api/slips/:id", get(get_slip))
        .route("/api/settlement/run", post(run_settlement))
        .route("/api/balance", get(get_balance))
        .route("/api/statement", get(get_statement))
        .route("/api/deposit", post(deposit))
        .route("/api/withdraw", post(withdraw))
        .with_state(state)
}

/// Caller identity, set by the auth boundary in front of this service
pub struct UserId(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or(ApiError::Unauthorized)
    }
}

// ===== Route Handlers =====

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn create_slip(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(body): Json<CreateSlipRequest>,
) -> Result<Json<SlipReceipt>, ApiError> {
    let receipt = state
        .engine
        .create_slip(&user_id, body.stake, &body.legs)
        .await?;
    Ok(Json(receipt))
}

async fn list_slips(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<SlipsResponse>, ApiError> {
    let slips = state.engine.list_slips(&user_id)?;
    Ok(Json(SlipsResponse {
        count: slips.len(),
        slips,
    }))
}

async fn get_slip(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(slip_id): Path<String>,
) -> Result<Json<BetSlip>, ApiError> {
    Ok(Json(state.engine.get_slip(&user_id, &slip_id)?))
}

/// Settle the caller's pending slips now instead of waiting for the scheduler
async fn run_settlement(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<SettlementResponse>, ApiError> {
    let updates = state.engine.run_settlement_cycle(&user_id).await?;
    Ok(Json(SettlementResponse { updates }))
}

async fn get_balance(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.engine.get_balance(&user_id)?;
    Ok(Json(BalanceResponse { user_id, balance }))
}

async fn get_statement(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(params): Query<StatementQuery>,
) -> Result<Json<StatementResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_STATEMENT_LIMIT);
    let movements = state.engine.get_statement(&user_id, limit)?;
    Ok(Json(StatementResponse {
        count: movements.len(),
        movements,
    }))
}

async fn deposit(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(body): Json<AmountRequest>,
) -> Result<Json<LedgerMovement>, ApiError> {
    Ok(Json(state.engine.deposit(&user_id, body.amount).await?))
}

async fn withdraw(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(body): Json<AmountRequest>,
) -> Result<Json<LedgerMovement>, ApiError> {
    Ok(Json(state.engine.withdraw(&user_id, body.amount).await?))
}

// ===== Request/Response Types =====

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateSlipRequest {
    stake: Decimal,
    legs: Vec<ProposedLeg>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AmountRequest {
    amount: Decimal,
}

#[derive(Deserialize)]
struct StatementQuery {
    /// Clamped to 1..=1000 by the ledger
    limit: Option<usize>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct SlipsResponse {
    count: usize,
    slips: Vec<BetSlip>,
}

#[derive(Serialize)]
struct SettlementResponse {
    updates: Vec<SettlementUpdate>,
}

#[derive(Serialize)]
struct BalanceResponse {
    user_id: String,
    balance: Decimal,
}

#[derive(Serialize)]
struct StatementResponse {
    count: usize,
    movements: Vec<LedgerMovement>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        names::TeamAliases,
        results::{ResultResolver, StaticResultSource},
        storage::temp_db,
    };
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> (Router, tempfile::NamedTempFile) {
        let (db, temp) = temp_db();
        let source = StaticResultSource::new()
            .with_text("Premier League", "2024-08-17 Arsenal 2-1 Wolves\n");
        let resolver = ResultResolver::new(
            vec![Arc::new(source)],
            TeamAliases::default(),
            Duration::from_secs(72 * 3600),
        );
        let engine = Arc::new(BetEngine::new(db, Arc::new(resolver), Duration::from_secs(5)));
        (create_router(engine), temp)
    }

    fn request(method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn slip_body(stake: &str) -> Value {
        json!({
            "stake": stake,
            "legs": [{
                "competition": "Premier League",
                "home_team": "Arsenal",
                "away_team": "Wolves",
                "market": "1X2",
                "selection": "1",
                "odds": "1.80",
                "match_datetime": "2024-08-17T14:00:00Z"
            }]
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _temp) = app();
        let (status, body) = send(&app, request("GET", "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_missing_user_header_is_unauthorized() {
        let (app, _temp) = app();
        let (status, _) = send(&app, request("GET", "/api/balance", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_slip_lifecycle_over_http() {
        let (app, _temp) = app();

        let (status, _) = send(
            &app,
            request("POST", "/api/deposit", Some("alice"), Some(json!({ "amount": "50" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, receipt) = send(
            &app,
            request("POST", "/api/slips", Some("alice"), Some(slip_body("10"))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let slip_id = receipt["slip_id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            request("POST", "/api/settlement/run", Some("alice"), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updates"][0]["new_status"], "won");

        let (_, body) = send(&app, request("GET", "/api/balance", Some("alice"), None)).await;
        let balance: Decimal = body["balance"].as_str().unwrap().parse().unwrap();
        assert_eq!(balance, Decimal::from(58));

        let uri = format!("/api/slips/{}", slip_id);
        let (status, _) = send(&app, request("GET", &uri, Some("bob"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(
            &app,
            request("GET", "/api/statement?limit=2", Some("alice"), None),
        )
        .await;
        assert_eq!(body["count"], 2);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let (app, _temp) = app();

        let (status, _) = send(
            &app,
            request("POST", "/api/slips", Some("alice"), Some(slip_body("10"))),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &app,
            request("POST", "/api/withdraw", Some("alice"), Some(json!({ "amount": "-5" }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/deposit",
                Some("alice"),
                Some(json!({ "amount": "5", "note": "extra" })),
            ),
        )
        .await;
        assert!(status.is_client_error());
    }
}
