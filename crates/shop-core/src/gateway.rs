//! # Payment Gateway Trait
//!
//! Port through which the core talks to the card-payment provider.
//! Implementations live in their own crates (`shop-flutterwave`).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PaymentGateway (trait)                   │
//! │  ├── build_payment_config()   pure, no I/O                  │
//! │  ├── verify_transaction()     GET  provider                 │
//! │  ├── charge_token()           POST provider                 │
//! │  ├── refund()                 POST provider (idempotent)    │
//! │  └── parse_webhook()          authenticate + normalize      │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                  ┌─────────┴─────────┐
//!                  │ FlutterwaveGateway│
//!                  └───────────────────┘
//! ```
//!
//! A gateway never writes orders and never retries on its own; callers
//! decide what a failure means.

use crate::error::ShopResult;
use crate::event::{order_id_from_tx_ref, CardDetails, PaymentEvent};
use crate::money::Currency;
use crate::order::Order;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Comma-separated payment channels offered in the inline widget
pub const PAYMENT_OPTIONS: &str = "card,banktransfer,ussd,account";

/// Customer block of the inline payment config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PaymentCustomer {
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Metadata echoed back by the provider on webhooks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMeta {
    pub order_id: String,
    pub actor: String,
}

/// Widget branding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customizations {
    pub title: String,
    pub description: String,
}

/// Input for [`PaymentGateway::build_payment_config`]
#[derive(Debug, Clone)]
pub struct PaymentConfigRequest {
    pub order_id: String,
    pub order_number: String,
    pub tx_ref: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub customer: PaymentCustomer,
    /// `customer:<id>` or `guest:<deviceId>`
    pub actor: String,
}

impl PaymentConfigRequest {
    /// Request for paying `order` under transaction reference `tx_ref`
    pub fn for_order(order: &Order, tx_ref: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            tx_ref: tx_ref.into(),
            amount: order.amounts.total,
            currency: order.currency,
            customer: PaymentCustomer {
                email: order.email.clone(),
                name: order.shipping.full_name.clone(),
                phone_number: order
                    .phone
                    .clone()
                    .or_else(|| Some(order.shipping.phone.clone())),
            },
            actor: actor.into(),
        }
    }
}

/// Data the client-side payment widget needs to collect a payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PaymentConfig {
    pub public_key: String,
    pub tx_ref: String,
    /// JSON number, as the inline widget expects
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: Currency,
    pub payment_options: String,
    pub customer: PaymentCustomer,
    pub meta: PaymentMeta,
    pub customizations: Customizations,
}

/// Provider's authoritative view of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionVerification {
    pub transaction_id: u64,
    /// Provider status string, `successful` when captured
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<CardDetails>,
}

impl TransactionVerification {
    pub fn is_successful(&self) -> bool {
        self.status.eq_ignore_ascii_case("successful")
    }

    /// Reason this verification does not cover `order`, if any.
    ///
    /// The provider must report the transaction successful, in the order's
    /// currency, for at least the order total. A reported reference must
    /// belong to the order.
    pub fn mismatch_with(&self, order: &Order) -> Option<String> {
        if !self.is_successful() {
            return Some(format!("transaction status is {}", self.status));
        }
        if let Some(tx_ref) = &self.tx_ref {
            if order_id_from_tx_ref(tx_ref) != Some(order.id.as_str()) {
                return Some(format!("reference {tx_ref} does not belong to order {}", order.id));
            }
        }
        if !self.currency.eq_ignore_ascii_case(order.currency.as_str()) {
            return Some(format!(
                "currency {} does not match order currency {}",
                self.currency, order.currency
            ));
        }
        if self.amount < order.amounts.total {
            return Some(format!(
                "amount {} is below order total {}",
                self.amount, order.amounts.total
            ));
        }
        None
    }
}

/// Charge against a saved card token
#[derive(Debug, Clone)]
pub struct TokenCharge {
    pub token: String,
    pub currency: Currency,
    pub amount: Decimal,
    pub email: String,
    pub tx_ref: String,
    pub order_id: String,
    pub actor: String,
    pub narration: String,
}

/// Result of a tokenized charge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<u64>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<CardDetails>,
}

impl ChargeOutcome {
    pub fn is_successful(&self) -> bool {
        self.status.eq_ignore_ascii_case("successful")
    }
}

/// Refund submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRequest {
    pub transaction_id: String,
    pub amount: Decimal,
    pub reason: Option<String>,
    /// Forwarded so the provider deduplicates retries
    pub idempotency_key: String,
}

/// Provider's answer to a refund submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundDisposition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_id: Option<String>,
    pub status: String,
}

/// Core trait for payment provider implementations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Build the inline payment config for the client widget. Pure data.
    fn build_payment_config(&self, request: &PaymentConfigRequest) -> PaymentConfig;

    /// Fetch the provider's authoritative view of a transaction.
    async fn verify_transaction(&self, transaction_id: u64)
        -> ShopResult<TransactionVerification>;

    /// Charge a saved card token.
    async fn charge_token(&self, charge: &TokenCharge) -> ShopResult<ChargeOutcome>;

    /// Submit a refund, forwarding the idempotency key.
    async fn refund(&self, request: &RefundRequest) -> ShopResult<RefundDisposition>;

    /// Authenticate and normalize an inbound webhook.
    ///
    /// # Returns
    /// * `Err(WebhookVerificationFailed)` when the shared secret is missing or wrong
    /// * `Ok(None)` when the body is authentic but carries no usable event
    /// * `Ok(Some(event))` otherwise
    fn parse_webhook(&self, payload: &[u8], signature: Option<&str>)
        -> ShopResult<Option<PaymentEvent>>;

    /// Provider name (for logging and order records).
    fn provider_name(&self) -> &'static str;
}

/// Type alias for a shared payment gateway (dynamic dispatch)
pub type BoxedPaymentGateway = Arc<dyn PaymentGateway>;
