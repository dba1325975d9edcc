//! HTTP route handlers.
//!
//! Webhook routes decode the gateway's callback, turn it into a
//! [`PaymentEvent`](pesa_core::PaymentEvent) and hand it to the hub. A hub
//! failure is logged and the gateway is still acknowledged, since it would
//! otherwise retry a callback the relay has no way to deliver.

pub mod b2c;
pub mod stk;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use pesa_core::PaymentEvent;
use tracing::warn;

use crate::errors::ApiError;
use crate::hub::HubHandle;

/// Unwrap a JSON body, mapping a rejection to `INVALID_REQUEST`.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|rejection| ApiError::invalid_request(rejection.body_text()))
}

/// Broadcast `event`, logging instead of failing when the hub is gone.
pub(crate) async fn publish(hub: &HubHandle, event: PaymentEvent) {
    let kind = event.kind;
    if let Err(e) = hub.broadcast(&event).await {
        warn!(event_type = %kind, error = %e, "failed to broadcast payment event");
    }
}
