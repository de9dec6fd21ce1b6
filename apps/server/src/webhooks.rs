//! Payment provider callbacks.
//!
//! Each provider expects its own reply shape and retries on anything else.
//! ```text
//! MoMo     POST /webhooks/momo     ok → 204            bad sig → 401
//! ZaloPay  POST /webhooks/zalopay  ok → return_code 1  bad sig → return_code -1
//!                                  other failure → return_code 0 (ZaloPay retries)
//! VietQR   POST /webhooks/vietqr   ok → {success: true} bad sig → 401 {success: false}
//! ```
//! Bodies are taken raw so signatures are checked over the exact bytes.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{info, warn};

use quan_core::payment::VIETQR_SIGNATURE_HEADER;
use quan_core::CoreError;
use quan_engine::EngineError;

use crate::error::ApiError;
use crate::AppState;

pub async fn momo(State(state): State<AppState>, body: Bytes) -> Response {
    match state.engine.payments.handle_momo(&body).await {
        Ok(resolution) => {
            info!(?resolution, "MoMo IPN handled");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            warn!(error = %e, "MoMo IPN rejected");
            ApiError::from(e).into_response()
        }
    }
}

pub async fn zalopay(State(state): State<AppState>, body: Bytes) -> Json<serde_json::Value> {
    let (code, message) = match state.engine.payments.handle_zalopay(&body).await {
        Ok(resolution) => {
            info!(?resolution, "ZaloPay callback handled");
            (1, "success".to_string())
        }
        Err(EngineError::Core(CoreError::InvalidSignature { .. })) => {
            warn!("ZaloPay callback with bad mac");
            (-1, "mac not equal".to_string())
        }
        Err(e) => {
            warn!(error = %e, "ZaloPay callback not applied");
            (0, e.to_string())
        }
    };
    Json(json!({ "return_code": code, "return_message": message }))
}

pub async fn vietqr(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = headers
        .get(VIETQR_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    match state.engine.payments.handle_vietqr(&body, signature).await {
        Ok(resolutions) => {
            info!(transfers = resolutions.len(), "VietQR webhook handled");
            Json(json!({ "success": true, "resolutions": resolutions })).into_response()
        }
        Err(e) => {
            warn!(error = %e, "VietQR webhook rejected");
            let status = ApiError::from(e).status;
            (status, Json(json!({ "success": false }))).into_response()
        }
    }
}
