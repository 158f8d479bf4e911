//! # Flutterwave Webhook Handling
//!
//! Authentication and normalization of Flutterwave webhook deliveries.
//!
//! Flutterwave has shipped two body shapes over time:
//!
//! ```text
//! v3:     { "type": "charge.completed", "data": { "id": 1, "tx_ref": ..., ... } }
//! legacy: { "event.type": "CARD_TRANSACTION", "id": 1, "txRef": ..., ... }
//! ```
//!
//! Both are parsed once into a [`WebhookEnvelope`] and folded into the core
//! [`PaymentEvent`]; nothing downstream looks at the raw JSON again.

use rust_decimal::Decimal;
use serde::Deserialize;
use shop_core::caller::constant_time_eq;
use shop_core::{
    CardDetails, PaymentEvent, PaymentEventKind, ShopError, ShopResult, TransactionPayload,
    WireShape,
};
use shop_core::event::EventMeta;
use tracing::{debug, warn};

/// Event types that report a finished refund
pub const REFUND_EVENT_TYPES: &[&str] = &[
    "refund.completed",
    "refund.successful",
    "refund.processed",
    "transaction.refund.completed",
    "card.refund.completed",
];

/// Legacy event type for a card charge
const LEGACY_CARD_TRANSACTION: &str = "CARD_TRANSACTION";

/// Check the `verif-hash` header against the configured secret hash
pub fn verify_signature(secret_hash: &str, signature: Option<&str>) -> ShopResult<()> {
    let secret = secret_hash.trim();
    if secret.is_empty() {
        return Err(ShopError::WebhookVerificationFailed(
            "webhook secret hash not configured".to_string(),
        ));
    }

    let incoming = signature.map(str::trim).unwrap_or_default();
    if !constant_time_eq(incoming, secret) {
        return Err(ShopError::WebhookVerificationFailed(
            "signature mismatch".to_string(),
        ));
    }
    Ok(())
}

/// Card block as Flutterwave reports it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlwCard {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "type")]
    pub brand: Option<String>,
    #[serde(default)]
    pub last_4digits: Option<String>,
    /// `MM/YY`
    #[serde(default)]
    pub expiry: Option<String>,
}

/// Metadata we attached to the payment config
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlwMeta {
    #[serde(default, alias = "order_id", rename = "orderId")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
}

/// Transaction fields common to both wire shapes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlwTransactionData {
    /// Numeric in practice; anything else is treated as missing
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub tx_ref: Option<String>,
    /// Legacy spelling; some bodies carry both
    #[serde(default, rename = "txRef")]
    pub tx_ref_legacy: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub meta: Option<FlwMeta>,
    #[serde(default)]
    pub card: Option<FlwCard>,
    #[serde(default)]
    pub processor_response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawWebhook {
    #[serde(default, rename = "type")]
    event_type: Option<String>,
    #[serde(default, rename = "event.type")]
    legacy_event_type: Option<String>,
    #[serde(default)]
    data: Option<FlwTransactionData>,
    #[serde(flatten)]
    root: FlwTransactionData,
}

/// A webhook body in one of the two known shapes
#[derive(Debug, Clone)]
pub enum WebhookEnvelope {
    Nested {
        event_type: String,
        data: FlwTransactionData,
    },
    Flat {
        event_type: String,
        data: FlwTransactionData,
    },
}

impl WebhookEnvelope {
    /// Parse a raw body. `None` when it is not JSON or carries no event type.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let raw: RawWebhook = match serde_json::from_slice(payload) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(error = %e, "Unparseable webhook body");
                return None;
            }
        };

        let event_type = raw
            .event_type
            .or(raw.legacy_event_type)
            .filter(|t| !t.is_empty())?;

        Some(match raw.data {
            Some(data) => WebhookEnvelope::Nested { event_type, data },
            None => WebhookEnvelope::Flat {
                event_type,
                data: raw.root,
            },
        })
    }

    pub fn event_type(&self) -> &str {
        match self {
            WebhookEnvelope::Nested { event_type, .. } | WebhookEnvelope::Flat { event_type, .. } => {
                event_type
            }
        }
    }

    pub fn data(&self) -> &FlwTransactionData {
        match self {
            WebhookEnvelope::Nested { data, .. } | WebhookEnvelope::Flat { data, .. } => data,
        }
    }

    pub fn shape(&self) -> WireShape {
        match self {
            WebhookEnvelope::Nested { .. } => WireShape::Nested,
            WebhookEnvelope::Flat { .. } => WireShape::Flat,
        }
    }

    /// Fold into the provider-neutral event
    pub fn into_event(self) -> PaymentEvent {
        let shape = self.shape();
        let kind = classify(self.event_type(), self.data().status.as_deref());
        let (event_type, data) = match self {
            WebhookEnvelope::Nested { event_type, data } | WebhookEnvelope::Flat { event_type, data } => {
                (event_type, data)
            }
        };

        let id = data.id.as_ref().and_then(serde_json::Value::as_u64);
        if id.is_none() && data.id.is_some() {
            warn!(event_type = %event_type, "Non-numeric transaction id in webhook");
        }
        let meta = data.meta.unwrap_or_default();

        let transaction = TransactionPayload {
            id,
            tx_ref: data.tx_ref.or(data.tx_ref_legacy),
            status: data.status,
            amount: data.amount,
            currency: data.currency,
            meta: EventMeta {
                order_id: meta.order_id,
                actor: meta.actor,
            },
            card: data.card.as_ref().and_then(extract_card_details),
            processor_response: data.processor_response,
        };

        PaymentEvent::new(event_type, kind, transaction, shape)
    }
}

/// Classify an event. Refund types win over everything, then failure,
/// then success.
pub fn classify(event_type: &str, status: Option<&str>) -> PaymentEventKind {
    if REFUND_EVENT_TYPES.contains(&event_type) {
        return PaymentEventKind::RefundCompleted;
    }
    let status = status.map(str::to_ascii_lowercase);
    if event_type == "charge.failed" || status.as_deref() == Some("failed") {
        return PaymentEventKind::ChargeFailed;
    }
    if event_type == "charge.completed"
        || event_type == LEGACY_CARD_TRANSACTION
        || status.as_deref() == Some("successful")
    {
        return PaymentEventKind::ChargeSucceeded;
    }
    PaymentEventKind::Unknown(event_type.to_string())
}

/// Card details worth saving; `None` without a token
pub fn extract_card_details(card: &FlwCard) -> Option<CardDetails> {
    let token = card.token.as_deref().map(str::trim).filter(|t| !t.is_empty())?;

    let (exp_month, exp_year) = match card.expiry.as_deref().and_then(|e| e.split_once('/')) {
        Some((mm, yy)) => (
            mm.trim().parse::<u32>().ok(),
            yy.trim().parse::<u32>().ok().map(|y| y + 2000),
        ),
        None => (None, None),
    };

    Some(CardDetails {
        token: token.to_string(),
        brand: card.brand.clone(),
        last4: card.last_4digits.clone(),
        exp_month,
        exp_year,
    })
}
