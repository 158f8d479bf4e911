//! # Payment Events
//!
//! The single internal shape every inbound provider event is folded into,
//! whatever wire format it arrived in.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What a provider event means for an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEventKind {
    /// Provider claims a charge succeeded (still re-verified before commit)
    ChargeSucceeded,
    /// Charge failed
    ChargeFailed,
    /// Refund finished on the provider side
    RefundCompleted,
    /// Anything else (acknowledged, logged, ignored)
    Unknown(String),
}

/// Which historical wire format an event arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireShape {
    /// `{ "type": ..., "data": { ... } }`
    Nested,
    /// Legacy flat body with the transaction fields at the root
    Flat,
}

/// Tokenized card reported alongside a successful charge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDetails {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp_month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp_year: Option<u32>,
}

/// Opaque metadata we attached when building the payment config
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

/// Transaction portion of an event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    /// Provider-assigned numeric transaction id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default)]
    pub meta: EventMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<CardDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_response: Option<String>,
}

/// A normalized, authenticated provider event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    /// Raw event type string as delivered
    pub event_type: String,
    pub kind: PaymentEventKind,
    pub transaction: TransactionPayload,
    pub shape: WireShape,
    pub received_at: DateTime<Utc>,
}

impl PaymentEvent {
    pub fn new(
        event_type: impl Into<String>,
        kind: PaymentEventKind,
        transaction: TransactionPayload,
        shape: WireShape,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            kind,
            transaction,
            shape,
            received_at: Utc::now(),
        }
    }

    /// Order this event refers to: explicit metadata first, otherwise the
    /// `<orderId>_<suffix>` transaction reference convention.
    pub fn order_id(&self) -> Option<String> {
        if let Some(order_id) = self
            .transaction
            .meta
            .order_id
            .as_deref()
            .filter(|id| !id.is_empty())
        {
            return Some(order_id.to_string());
        }

        order_id_from_tx_ref(self.transaction.tx_ref.as_deref()?).map(String::from)
    }
}

/// Build the transaction reference for an inline payment attempt
pub fn inline_tx_ref(order_id: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}", order_id, now.timestamp_millis())
}

/// Build the transaction reference for a saved-card charge
pub fn token_tx_ref(order_id: &str, now: DateTime<Utc>) -> String {
    format!("{}_token_{}", order_id, now.timestamp_millis())
}

/// Order id prefix of a `<orderId>_<suffix>` transaction reference
pub fn order_id_from_tx_ref(tx_ref: &str) -> Option<&str> {
    let (order_id, _) = tx_ref.split_once('_')?;
    (!order_id.is_empty()).then_some(order_id)
}
