//! HTTP API: the transport surface over the engine.
//!
//! Every route maps 1:1 onto an engine operation and carries plain JSON
//! data; rendering (embeds, panels, mentions) is the caller's concern.
//! Engine errors map onto HTTP status codes so callers can branch without
//! parsing messages.

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use glyphmine_engine::engine::now_ms;
use glyphmine_engine::{auction, grumble, round, Engine};
use glyphmine_types::{GameError, Symbol};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

pub struct ApiError(GameError);

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GameError::Validation(_) => StatusCode::BAD_REQUEST,
            GameError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            GameError::NotFound(_) => StatusCode::NOT_FOUND,
            GameError::AlreadyEnded(_)
            | GameError::AlreadyPlaced
            | GameError::AlreadyActive
            | GameError::ResolutionInProgress
            | GameError::NoPacks
            | GameError::ClaimUnavailable(_) => StatusCode::CONFLICT,
            GameError::Inactive => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

async fn healthz() -> Response {
    Json(HealthzResponse { ok: true }).into_response()
}

async fn readyz(State(engine): State<Arc<Engine>>) -> Response {
    // The engine is ready once state is loaded, which start() guarantees.
    let active = engine.is_active().await;
    Json(json!({ "ready": true, "active": active })).into_response()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    current_block: u64,
    time_left_ms: u64,
    time_left: String,
    block_duration_sec: u64,
    base_reward: u64,
    total_rewards_per_block: u64,
    last_system_choice: Option<Symbol>,
    active: bool,
    grumble_active: bool,
    autorun_remaining_blocks: Option<u64>,
}

async fn status(State(engine): State<Arc<Engine>>) -> Json<StatusResponse> {
    let now = now_ms();
    let snapshot = engine.state_snapshot().await;
    let time_left_ms = snapshot.next_block_at.saturating_sub(now);
    Json(StatusResponse {
        current_block: snapshot.current_block,
        time_left_ms,
        time_left: round::format_duration(time_left_ms),
        block_duration_sec: snapshot.block_duration_sec,
        base_reward: snapshot.base_reward,
        total_rewards_per_block: snapshot.total_rewards_per_block,
        last_system_choice: snapshot.last_system_choice,
        active: engine.is_active().await,
        grumble_active: snapshot.grumble.as_ref().is_some_and(|g| g.is_active),
        autorun_remaining_blocks: engine.autorun_remaining().await,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChoiceRequest {
    user_id: String,
    symbol: Symbol,
}

async fn record_choice(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<ChoiceRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    engine.record_choice(&req.user_id, req.symbol).await?;
    Ok(Json(json!({ "recorded": true })))
}

async fn balance(
    State(engine): State<Arc<Engine>>,
    AxumPath(user): AxumPath<String>,
) -> Json<serde_json::Value> {
    let balance = engine.balance(&user).await;
    Json(json!({ "userId": user, "balance": balance }))
}

async fn last_summary(State(engine): State<Arc<Engine>>) -> Response {
    match engine.last_round_summary().await {
        Some(record) => Json(record).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn user_history(
    State(engine): State<Arc<Engine>>,
    AxumPath(user): AxumPath<String>,
) -> Json<Vec<round::UserRoundRecord>> {
    Json(engine.user_history(&user).await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeaderboardQuery {
    user_id: Option<String>,
}

async fn leaderboard(
    State(engine): State<Arc<Engine>>,
    Query(query): Query<LeaderboardQuery>,
) -> Json<glyphmine_engine::leaderboard::LeaderboardView> {
    Json(engine.leaderboard(query.user_id.as_deref(), now_ms()).await)
}

async fn user_bets(
    State(engine): State<Arc<Engine>>,
    AxumPath(user): AxumPath<String>,
) -> Json<glyphmine_engine::engine::UserBetInfo> {
    Json(engine.user_bet_info(&user).await)
}

// === Grumble ===

async fn grumble_state(State(engine): State<Arc<Engine>>) -> Json<serde_json::Value> {
    let state = engine.grumble_state().await;
    let time_left = engine.grumble_time_left_ms(now_ms()).await;
    Json(json!({ "grumble": state, "timeLeftMs": time_left }))
}

async fn grumble_start(State(engine): State<Arc<Engine>>) -> ApiResult<Json<glyphmine_types::GrumbleState>> {
    Ok(Json(engine.grumble_start().await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrumbleJoinRequest {
    user_id: String,
    symbol: Symbol,
    amount: u64,
}

async fn grumble_join(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<GrumbleJoinRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let pool = engine.grumble_join(&req.user_id, req.symbol, req.amount).await?;
    Ok(Json(json!({ "prizePool": pool })))
}

#[derive(Deserialize)]
struct GrumbleTimerRequest {
    seconds: u64,
}

async fn grumble_timer(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<GrumbleTimerRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let ends_at = engine.grumble_set_timer(req.seconds, now_ms()).await?;
    Ok(Json(json!({ "customTimerEndsAt": ends_at })))
}

async fn grumble_restart(State(engine): State<Arc<Engine>>) -> ApiResult<Json<serde_json::Value>> {
    engine.grumble_restart().await?;
    Ok(Json(json!({ "restarted": true })))
}

// === Market ===

async fn market_state(
    State(engine): State<Arc<Engine>>,
    AxumPath(user): AxumPath<String>,
) -> Json<glyphmine_engine::engine::MarketSnapshot> {
    Json(engine.market_snapshot(&user).await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRequest {
    user_id: String,
}

async fn pack_buy(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<UserRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let packs = engine.purchase_pack(&req.user_id).await?;
    Ok(Json(json!({ "packs": packs })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackOpenRequest {
    user_id: String,
    #[serde(default)]
    role_ids: Vec<String>,
}

async fn pack_open(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<PackOpenRequest>,
) -> ApiResult<Json<glyphmine_engine::market::PackOpenResult>> {
    Ok(Json(engine.open_pack(&req.user_id, &req.role_ids).await?))
}

async fn claim(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<UserRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let claimed = engine.claim_dollars(&req.user_id).await?;
    Ok(Json(json!({ "claimed": claimed })))
}

// === Auctions ===

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuctionCreateRequest {
    description: String,
    #[serde(default)]
    roles_to_tag: Vec<String>,
    end_time: u64,
    number_of_winners: u32,
}

async fn auction_create(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<AuctionCreateRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = engine
        .auction_create(
            &req.description,
            req.roles_to_tag,
            req.end_time,
            req.number_of_winners,
            now_ms(),
        )
        .await?;
    Ok(Json(json!({ "auctionId": id })))
}

async fn auctions_active(
    State(engine): State<Arc<Engine>>,
) -> Json<Vec<glyphmine_types::AuctionState>> {
    Json(engine.active_auctions(now_ms()).await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BidRequest {
    user_id: String,
    amount: u64,
}

async fn auction_bid(
    State(engine): State<Arc<Engine>>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<BidRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    engine.auction_bid(&id, &req.user_id, req.amount, now_ms()).await?;
    Ok(Json(json!({ "placed": true })))
}

/// A bidder's sealed view: their own bid and rank, never the full book.
async fn auction_rank(
    State(engine): State<Arc<Engine>>,
    AxumPath((id, user)): AxumPath<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let state = engine
        .auction_state(&id)
        .await
        .ok_or_else(|| GameError::NotFound(format!("auction {id}")))?;
    Ok(Json(json!({
        "bid": auction::user_bid(&state, &user),
        "rank": auction::user_rank(&state, &user),
        "numberOfWinners": state.number_of_winners,
        "endTime": state.end_time,
    })))
}

async fn auction_resolve(
    State(engine): State<Arc<Engine>>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let settlement = engine.auction_resolve(&id).await?;
    Ok(Json(json!({ "settlement": settlement })))
}

// === Admin ===

#[derive(Deserialize)]
struct SecondsRequest {
    seconds: u64,
}

async fn admin_duration(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<SecondsRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    engine.set_block_duration(req.seconds, now_ms()).await?;
    Ok(Json(json!({ "blockDurationSec": req.seconds })))
}

#[derive(Deserialize)]
struct BlockRequest {
    number: u64,
}

async fn admin_block(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<BlockRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    engine.set_current_block(req.number).await?;
    Ok(Json(json!({ "currentBlock": req.number })))
}

#[derive(Deserialize)]
struct AmountRequest {
    amount: u64,
}

async fn admin_base_reward(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<AmountRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    engine.set_base_reward(req.amount).await?;
    Ok(Json(json!({ "baseReward": req.amount })))
}

async fn admin_total_rewards(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<AmountRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    engine.set_total_rewards(req.amount).await?;
    Ok(Json(json!({ "totalRewardsPerBlock": req.amount })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceRequest {
    user_id: String,
    amount: u64,
}

async fn admin_balance(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<BalanceRequest>,
) -> Json<serde_json::Value> {
    let balance = engine.set_balance(&req.user_id, req.amount).await;
    Json(json!({ "userId": req.user_id, "balance": balance }))
}

async fn admin_reset_balances(State(engine): State<Arc<Engine>>) -> Json<serde_json::Value> {
    engine.reset_balances().await;
    Json(json!({ "reset": "balances" }))
}

async fn admin_reset_records(State(engine): State<Arc<Engine>>) -> Json<serde_json::Value> {
    engine.reset_records().await;
    Json(json!({ "reset": "records" }))
}

async fn admin_reset_all(State(engine): State<Arc<Engine>>) -> Json<serde_json::Value> {
    engine.reset_all(now_ms()).await;
    Json(json!({ "reset": "all" }))
}

#[derive(Deserialize)]
struct ActiveRequest {
    active: bool,
}

async fn admin_active(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<ActiveRequest>,
) -> Json<serde_json::Value> {
    engine.set_active(req.active).await;
    Json(json!({ "active": req.active }))
}

#[derive(Deserialize)]
struct AutorunRequest {
    blocks: Option<u64>,
}

async fn admin_autorun(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<AutorunRequest>,
) -> Json<serde_json::Value> {
    engine.set_autorun(req.blocks).await;
    Json(json!({ "autorunRemainingBlocks": req.blocks }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantPacksRequest {
    user_id: String,
    count: u64,
}

async fn admin_grant_packs(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<GrantPacksRequest>,
) -> Json<serde_json::Value> {
    let packs = engine.grant_packs(&req.user_id, req.count).await;
    Json(json!({ "userId": req.user_id, "packs": packs }))
}

#[derive(Deserialize)]
struct ClaimLimitRequest {
    limit: u64,
}

async fn admin_claim_limit(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<ClaimLimitRequest>,
) -> Json<serde_json::Value> {
    engine.set_claim_limit(req.limit).await;
    Json(json!({ "claimLimit": req.limit }))
}

#[derive(Deserialize)]
struct ClaimEnabledRequest {
    enabled: bool,
}

async fn admin_claim_enabled(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<ClaimEnabledRequest>,
) -> Json<serde_json::Value> {
    engine.set_claim_enabled(req.enabled).await;
    Json(json!({ "claimEnabled": req.enabled }))
}

async fn admin_reset_claims(State(engine): State<Arc<Engine>>) -> Json<serde_json::Value> {
    engine.reset_claim_counter().await;
    Json(json!({ "reset": "claims" }))
}

async fn admin_export(State(engine): State<Arc<Engine>>) -> Response {
    match engine.export().await {
        Ok((path, payload)) => Json(json!({
            "path": path.display().to_string(),
            "summary": payload.summary,
        }))
        .into_response(),
        Err(err) => {
            tracing::error!(%err, "export failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Platform hook: a guild member left.
async fn member_departed(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<UserRequest>,
) -> Json<serde_json::Value> {
    let outcome = engine.member_departed(&req.user_id).await;
    let reopened = matches!(outcome, grumble::DepartureOutcome::SessionReopened { .. });
    Json(json!({ "grumbleReopened": reopened }))
}

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/status", get(status))
        .route("/choice", post(record_choice))
        .route("/balance/:user", get(balance))
        .route("/summary/last", get(last_summary))
        .route("/history/:user", get(user_history))
        .route("/leaderboard", get(leaderboard))
        .route("/bets/:user", get(user_bets))
        .route("/grumble", get(grumble_state))
        .route("/grumble/start", post(grumble_start))
        .route("/grumble/join", post(grumble_join))
        .route("/grumble/timer", post(grumble_timer))
        .route("/grumble/restart", post(grumble_restart))
        .route("/market/:user", get(market_state))
        .route("/market/packs/buy", post(pack_buy))
        .route("/market/packs/open", post(pack_open))
        .route("/market/claim", post(claim))
        .route("/auctions", post(auction_create).get(auctions_active))
        .route("/auctions/:id/bid", post(auction_bid))
        .route("/auctions/:id/rank/:user", get(auction_rank))
        .route("/auctions/:id/resolve", post(auction_resolve))
        .route("/admin/duration", post(admin_duration))
        .route("/admin/block", post(admin_block))
        .route("/admin/base-reward", post(admin_base_reward))
        .route("/admin/total-rewards", post(admin_total_rewards))
        .route("/admin/balance", post(admin_balance))
        .route("/admin/reset/balances", post(admin_reset_balances))
        .route("/admin/reset/records", post(admin_reset_records))
        .route("/admin/reset/all", post(admin_reset_all))
        .route("/admin/active", post(admin_active))
        .route("/admin/autorun", post(admin_autorun))
        .route("/admin/packs/grant", post(admin_grant_packs))
        .route("/admin/claim-limit", post(admin_claim_limit))
        .route("/admin/claim-enabled", post(admin_claim_enabled))
        .route("/admin/reset/claims", post(admin_reset_claims))
        .route("/admin/export", post(admin_export))
        .route("/hooks/member-departed", post(member_departed))
        .with_state(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use glyphmine_engine::EngineConfig;
    use tower::ServiceExt;

    async fn test_router() -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            ..EngineConfig::default()
        };
        let engine = Engine::start(config).unwrap();
        (router(engine), dir)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let (app, _dir) = test_router().await;
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn test_choice_round_trip() {
        let (app, _dir) = test_router().await;

        let response = app
            .clone()
            .oneshot(
                Request::post("/choice")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"userId":"alice","symbol":"ᚹ"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/bets/alice").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["miningChoice"], "ᚹ");
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        let (app, _dir) = test_router().await;

        // Bidding on a missing auction is a 404.
        let response = app
            .clone()
            .oneshot(
                Request::post("/auctions/missing/bid")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"userId":"alice","amount":10}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Zero block duration is a validation failure.
        let response = app
            .oneshot(
                Request::post("/admin/duration")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"seconds":0}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_reports_block() {
        let (app, _dir) = test_router().await;
        let response = app
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["currentBlock"], 1);
        assert_eq!(body["active"], true);
    }
}
