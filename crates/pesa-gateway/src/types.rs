//! Request, response and callback models.
//!
//! Client-facing requests use `snake_case`. Everything exchanged with the
//! gateway keeps its PascalCase wire names (including the `Occassion` typo
//! the B2C API expects).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{GatewayError, Result};
use crate::phone::format_phone_number;

/// Longest account reference the STK API accepts.
pub const MAX_ACCOUNT_REFERENCE_LEN: usize = 12;
/// Longest transaction description the STK API accepts.
pub const MAX_TRANSACTION_DESC_LEN: usize = 13;
/// Longest B2C remarks / occasion text.
pub const MAX_REMARKS_LEN: usize = 100;

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(GatewayError::Validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(())
}

fn check_amount(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(GatewayError::Validation(
            "amount must be greater than 0".into(),
        ));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// STK push
// ─────────────────────────────────────────────────────────────────────────────

/// Client request to prompt a customer for payment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StkPushRequest {
    /// Customer phone number in any accepted format.
    pub phone_number: String,
    /// Amount in whole shillings.
    pub amount: i64,
    /// Account reference shown to the customer.
    pub account_reference: String,
    /// Short description shown to the customer.
    pub transaction_desc: String,
}

impl StkPushRequest {
    /// Check field presence and length limits.
    pub fn validate(&self) -> Result<()> {
        if self.phone_number.trim().is_empty() {
            return Err(GatewayError::Validation("phone_number is required".into()));
        }
        check_amount(self.amount)?;
        check_len(
            "account_reference",
            &self.account_reference,
            1,
            MAX_ACCOUNT_REFERENCE_LEN,
        )?;
        check_len(
            "transaction_desc",
            &self.transaction_desc,
            1,
            MAX_TRANSACTION_DESC_LEN,
        )
    }
}

/// STK push body sent to the gateway.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushPayload {
    /// Paybill / till number.
    pub business_short_code: String,
    /// Derived STK password.
    pub password: String,
    /// Timestamp used to derive the password.
    pub timestamp: String,
    /// Always `CustomerPayBillOnline`.
    pub transaction_type: &'static str,
    /// Amount in whole shillings.
    pub amount: i64,
    /// Paying MSISDN.
    pub party_a: String,
    /// Receiving short code.
    pub party_b: String,
    /// MSISDN that receives the prompt.
    pub phone_number: String,
    /// Result callback URL.
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    /// Account reference.
    pub account_reference: String,
    /// Transaction description.
    pub transaction_desc: String,
}

/// Gateway acknowledgement of an STK push.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StkPushResponse {
    /// Gateway merchant request id.
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    /// Id used to correlate the later callback.
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    /// `"0"` when accepted.
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    /// Human-readable status.
    #[serde(rename = "ResponseDescription")]
    pub response_description: String,
    /// Message suitable for the customer.
    #[serde(rename = "CustomerMessage")]
    pub customer_message: String,
}

/// Envelope the gateway posts to the STK callback URL.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StkCallbackEnvelope {
    /// Wrapper object.
    #[serde(rename = "Body")]
    pub body: StkCallbackBody,
}

/// `Body` of an STK callback.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StkCallbackBody {
    /// The callback itself.
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

/// Outcome of an STK push.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StkCallback {
    /// Gateway merchant request id.
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    /// Checkout request id from the initiating call.
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    /// `0` on success.
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    /// Human-readable result.
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
    /// Receipt, amount and phone on success.
    #[serde(rename = "CallbackMetadata", skip_serializing_if = "Option::is_none")]
    pub callback_metadata: Option<CallbackMetadata>,
}

impl StkCallback {
    /// Whether the customer completed the payment.
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    /// Metadata items keyed by name.
    pub fn metadata_map(&self) -> Map<String, Value> {
        self.callback_metadata
            .iter()
            .flat_map(|m| &m.item)
            .map(|item| (item.name.clone(), item.value.clone().unwrap_or(Value::Null)))
            .collect()
    }
}

/// STK callback metadata list.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CallbackMetadata {
    /// Name/value items.
    #[serde(rename = "Item", default)]
    pub item: Vec<CallbackMetadataItem>,
}

/// One STK callback metadata entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallbackMetadataItem {
    /// Item name (`Amount`, `MpesaReceiptNumber`, ...).
    #[serde(rename = "Name")]
    pub name: String,
    /// Item value; absent for some optional items.
    #[serde(rename = "Value", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// B2C
// ─────────────────────────────────────────────────────────────────────────────

/// B2C payout category.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandId {
    /// Salary disbursement.
    SalaryPayment,
    /// General business payout.
    #[default]
    BusinessPayment,
    /// Promotional payout.
    PromotionPayment,
}

impl CommandId {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SalaryPayment => "SalaryPayment",
            Self::BusinessPayment => "BusinessPayment",
            Self::PromotionPayment => "PromotionPayment",
        }
    }
}

/// Client request for a B2C payout.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct B2cPaymentRequest {
    /// Recipient phone number in any accepted format.
    pub phone_number: String,
    /// Amount in whole shillings.
    pub amount: i64,
    /// Payout category; defaults to `BusinessPayment`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<CommandId>,
    /// Free-text remarks; defaults to `Payment`.
    pub remarks: String,
    /// Optional occasion text.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub occasion: String,
    /// Caller-supplied correlation id; generated when empty.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub originator_conversation_id: String,
}

impl B2cPaymentRequest {
    /// Check field presence and length limits.
    pub fn validate(&self) -> Result<()> {
        if self.phone_number.trim().is_empty() {
            return Err(GatewayError::Validation("phone_number is required".into()));
        }
        check_amount(self.amount)?;
        check_len("remarks", &self.remarks, 0, MAX_REMARKS_LEN)?;
        check_len("occasion", &self.occasion, 0, MAX_REMARKS_LEN)
    }

    /// Validate, normalize the phone number and fill defaults.
    pub fn normalized(mut self) -> Result<Self> {
        self.validate()?;
        self.phone_number = format_phone_number(&self.phone_number)?;
        if self.originator_conversation_id.is_empty() {
            self.originator_conversation_id = uuid::Uuid::new_v4().to_string();
        }
        if self.command_id.is_none() {
            self.command_id = Some(CommandId::default());
        }
        if self.remarks.is_empty() {
            self.remarks = "Payment".to_owned();
        }
        Ok(self)
    }
}

/// B2C body sent to the gateway.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct B2cPayload {
    /// Caller correlation id.
    #[serde(rename = "OriginatorConversationID")]
    pub originator_conversation_id: String,
    /// Initiator username.
    pub initiator_name: String,
    /// Encrypted initiator password.
    pub security_credential: String,
    /// Payout category.
    #[serde(rename = "CommandID")]
    pub command_id: CommandId,
    /// Amount in whole shillings.
    pub amount: i64,
    /// Paying short code.
    pub party_a: String,
    /// Receiving MSISDN.
    pub party_b: String,
    /// Remarks.
    pub remarks: String,
    /// Where queue timeouts are posted.
    #[serde(rename = "QueueTimeOutURL")]
    pub queue_timeout_url: String,
    /// Where results are posted.
    #[serde(rename = "ResultURL")]
    pub result_url: String,
    /// Occasion (the API spells it with a double `s`).
    #[serde(rename = "Occassion")]
    pub occasion: String,
}

/// Gateway acknowledgement of a B2C request.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct B2cGatewayResponse {
    /// Gateway conversation id.
    #[serde(rename = "ConversationID")]
    pub conversation_id: String,
    /// Echoed correlation id.
    #[serde(rename = "OriginatorConversationID")]
    pub originator_conversation_id: String,
    /// `"0"` when accepted.
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    /// Human-readable status.
    #[serde(rename = "ResponseDescription")]
    pub response_description: String,
}

/// Client-facing B2C acknowledgement.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct B2cPaymentResponse {
    /// Gateway conversation id.
    pub conversation_id: String,
    /// Correlation id.
    pub originator_conversation_id: String,
    /// `"0"` when accepted.
    pub response_code: String,
    /// Human-readable status.
    pub response_description: String,
}

impl From<B2cGatewayResponse> for B2cPaymentResponse {
    fn from(r: B2cGatewayResponse) -> Self {
        Self {
            conversation_id: r.conversation_id,
            originator_conversation_id: r.originator_conversation_id,
            response_code: r.response_code,
            response_description: r.response_description,
        }
    }
}

/// Envelope the gateway posts to the B2C result and timeout URLs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct B2cResultEnvelope {
    /// The result itself.
    #[serde(rename = "Result")]
    pub result: B2cResult,
}

/// Outcome of a B2C payout.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct B2cResult {
    /// Result type (0 for a normal result).
    #[serde(rename = "ResultType")]
    pub result_type: i64,
    /// `0` on success.
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    /// Human-readable result.
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
    /// Caller correlation id.
    #[serde(rename = "OriginatorConversationID")]
    pub originator_conversation_id: String,
    /// Gateway conversation id.
    #[serde(rename = "ConversationID")]
    pub conversation_id: String,
    /// Gateway transaction id.
    #[serde(rename = "TransactionID")]
    pub transaction_id: String,
    /// Amount, receipt and recipient details on success.
    #[serde(rename = "ResultParameters", skip_serializing_if = "Option::is_none")]
    pub result_parameters: Option<ResultParameters>,
    /// Extra reference data.
    #[serde(rename = "ReferenceData", skip_serializing_if = "Option::is_none")]
    pub reference_data: Option<ReferenceData>,
}

impl B2cResult {
    /// Whether the payout succeeded.
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    /// Result parameters keyed by name. Later duplicates win.
    pub fn result_parameters_map(&self) -> Map<String, Value> {
        self.result_parameters
            .iter()
            .flat_map(|p| &p.result_parameter)
            .map(|p| (p.key.clone(), p.value.clone()))
            .collect()
    }
}

/// B2C result parameter list.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResultParameters {
    /// Key/value entries.
    #[serde(rename = "ResultParameter", default)]
    pub result_parameter: Vec<ResultParameter>,
}

/// One B2C result parameter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultParameter {
    /// Parameter name (`TransactionAmount`, `TransactionReceipt`, ...).
    #[serde(rename = "Key")]
    pub key: String,
    /// Parameter value.
    #[serde(rename = "Value", default)]
    pub value: Value,
}

/// B2C reference data.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReferenceData {
    /// Single reference item.
    #[serde(rename = "ReferenceItem", default)]
    pub reference_item: ReferenceItem,
}

/// One reference data entry.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceItem {
    /// Entry name.
    #[serde(rename = "Key")]
    pub key: String,
    /// Entry value.
    #[serde(rename = "Value")]
    pub value: Value,
}
