//! B2C payout routes.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pesa_core::{EventKind, PaymentEvent};
use pesa_gateway::types::{B2cPaymentRequest, B2cPaymentResponse, B2cResult, B2cResultEnvelope};
use serde_json::json;
use tracing::{info, warn};

use super::{json_body, publish};
use crate::errors::{ApiError, SuccessBody};
use crate::server::AppState;

/// `POST /api/v1/b2c/payment`
pub async fn payment(
    State(state): State<AppState>,
    body: Result<Json<B2cPaymentRequest>, JsonRejection>,
) -> Result<Json<SuccessBody<B2cPaymentResponse>>, ApiError> {
    let request = json_body(body)?.normalized()?;
    let response = state.gateway.b2c_payment(&request).await?;

    let event = PaymentEvent::new(EventKind::B2cInitiated)
        .with("conversation_id", &response.conversation_id)
        .with("originator_conversation_id", &response.originator_conversation_id)
        .with("phone_number", &request.phone_number)
        .with("amount", request.amount)
        .with("command_id", request.command_id.unwrap_or_default().as_str());
    publish(&state.hub, event).await;

    Ok(Json(SuccessBody::new(
        "Payment initiated successfully",
        Some(response),
    )))
}

/// `POST /api/v1/b2c/result`
pub async fn result(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(result) = decode(&body, "B2C result") else {
        return invalid("Invalid callback data");
    };
    info!(
        conversation_id = %result.conversation_id,
        result_code = result.result_code,
        result_desc = %result.result_desc,
        "B2C result received"
    );

    let params = result.result_parameters_map();
    if result.is_success() {
        info!(
            transaction_id = %result.transaction_id,
            amount = ?params.get("TransactionAmount"),
            receipt = ?params.get("TransactionReceipt"),
            recipient = ?params.get("ReceiverPartyPublicName"),
            registered = ?params.get("B2CRecipientIsRegisteredCustomer"),
            "B2C payment completed"
        );
    } else {
        warn!(
            conversation_id = %result.conversation_id,
            result_code = result.result_code,
            result_desc = %result.result_desc,
            "B2C payment failed"
        );
    }

    let event = PaymentEvent::new(EventKind::B2cCallback)
        .with("conversation_id", &result.conversation_id)
        .with("originator_conversation_id", &result.originator_conversation_id)
        .with("transaction_id", &result.transaction_id)
        .with("result_code", result.result_code)
        .with("result_desc", &result.result_desc)
        .with("result_parameters", params);
    publish(&state.hub, event).await;

    accepted()
}

/// `POST /api/v1/b2c/timeout`
pub async fn timeout(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(result) = decode(&body, "B2C timeout") else {
        return invalid("Invalid timeout data");
    };
    warn!(
        conversation_id = %result.conversation_id,
        result_desc = %result.result_desc,
        "B2C request timed out in gateway queue"
    );

    let event = PaymentEvent::new(EventKind::B2cTimeout)
        .with("conversation_id", &result.conversation_id)
        .with("originator_conversation_id", &result.originator_conversation_id)
        .with("result_desc", &result.result_desc);
    publish(&state.hub, event).await;

    accepted()
}

fn decode(body: &[u8], what: &str) -> Option<B2cResult> {
    match serde_json::from_slice::<B2cResultEnvelope>(body) {
        Ok(envelope) => Some(envelope.result),
        Err(e) => {
            warn!(error = %e, "malformed {what} callback");
            None
        }
    }
}

fn invalid(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn accepted() -> Response {
    Json(json!({ "ResultCode": 0, "ResultDesc": "Accepted" })).into_response()
}
