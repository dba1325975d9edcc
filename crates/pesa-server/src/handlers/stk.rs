//! STK push routes.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use pesa_core::{EventKind, PaymentEvent};
use pesa_gateway::types::{StkCallbackEnvelope, StkPushRequest, StkPushResponse};
use serde_json::json;
use tracing::{info, warn};

use super::{json_body, publish};
use crate::errors::{ApiError, SuccessBody};
use crate::server::AppState;

/// `POST /api/v1/stk/initiate`
pub async fn initiate(
    State(state): State<AppState>,
    body: Result<Json<StkPushRequest>, JsonRejection>,
) -> Result<Json<StkPushResponse>, ApiError> {
    let request = json_body(body)?;
    info!(
        amount = request.amount,
        account_reference = %request.account_reference,
        "STK push requested"
    );
    let response = state.gateway.stk_push(&request).await?;
    Ok(Json(response))
}

/// `POST /api/v1/stk/callback`
///
/// Always answers 200 so the gateway does not retry; a body that fails to
/// decode is acknowledged with the decode error and nothing is broadcast.
pub async fn callback(
    State(state): State<AppState>,
    body: Bytes,
) -> Json<SuccessBody<serde_json::Value>> {
    let envelope: StkCallbackEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "malformed STK callback");
            return Json(SuccessBody::new(
                "Callback received",
                Some(json!({ "error": e.to_string() })),
            ));
        }
    };
    let callback = envelope.body.stk_callback;

    if callback.is_success() {
        info!(
            checkout_request_id = %callback.checkout_request_id,
            metadata = ?callback.metadata_map(),
            "STK push completed"
        );
    } else {
        info!(
            checkout_request_id = %callback.checkout_request_id,
            result_code = callback.result_code,
            result_desc = %callback.result_desc,
            "STK push failed"
        );
    }

    let event = PaymentEvent::new(EventKind::StkCallback)
        .with("result_code", callback.result_code)
        .with("checkout_request_id", &callback.checkout_request_id)
        .with("data", &callback);
    publish(&state.hub, event).await;

    Json(SuccessBody::new("Callback received successfully", None))
}
