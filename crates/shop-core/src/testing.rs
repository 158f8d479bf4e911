//! Fixtures and recording doubles shared by the unit tests.

use crate::address::ShippingAddress;
use crate::config::ShopConfig;
use crate::error::{ShopError, ShopResult};
use crate::event::PaymentEvent;
use crate::gateway::{
    ChargeOutcome, Customizations, PaymentConfig, PaymentConfigRequest, PaymentGateway,
    PaymentMeta, RefundDisposition, RefundRequest, TokenCharge, TransactionVerification,
    PAYMENT_OPTIONS,
};
use crate::memory::InMemoryRepository;
use crate::money::{Currency, OrderAmounts};
use crate::notify::{Notification, Notifier};
use crate::order::{Fulfilment, Order, OrderStatus, PaymentStatus, Refund};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const WEBHOOK_HASH: &str = "test-hash";

pub fn shipping_fixture() -> ShippingAddress {
    ShippingAddress {
        full_name: "Ada Obi".to_string(),
        phone: "+15550001111".to_string(),
        street: "12 Main Street".to_string(),
        city: "Springfield".to_string(),
        state: Some("IL".to_string()),
        postal: Some("62701".to_string()),
        country: "United States".to_string(),
    }
}

/// A fresh pending order; not stored anywhere
pub fn order_fixture(subtotal: Decimal, shipping: Decimal, currency: Currency) -> Order {
    let now = Utc::now();
    let amounts = OrderAmounts::new(subtotal, shipping);
    Order {
        id: Uuid::new_v4().to_string(),
        order_number: format!("KBC-{}", &Uuid::new_v4().simple().to_string()[..8].to_uppercase()),
        customer_id: Some("c1".to_string()),
        cart_id: None,
        device_id: None,
        email: "ada@example.com".to_string(),
        phone: None,
        customer_note: None,
        shipping: shipping_fixture(),
        shipping_address_id: None,
        currency,
        amounts,
        amounts_base: amounts,
        exchange_rate: Decimal::ONE,
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Pending,
        payment_provider: "mock".to_string(),
        provider_status: "pending".to_string(),
        tx_ref: None,
        provider_transaction_id: None,
        paid_at: None,
        receipt_url: None,
        cancellation: None,
        fulfilment: Fulfilment::default(),
        refund: Refund::default(),
        created_at: now,
        updated_at: now,
        version: 0,
    }
}

/// Scriptable gateway that records every provider call
#[derive(Default)]
pub struct MockGateway {
    pub verifications: Mutex<HashMap<u64, TransactionVerification>>,
    pub charge: Mutex<Option<ChargeOutcome>>,
    pub refund_error: Mutex<Option<String>>,
    pub verify_calls: Mutex<Vec<u64>>,
    pub charge_calls: Mutex<Vec<TokenCharge>>,
    pub refund_calls: Mutex<Vec<RefundRequest>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `verify_transaction(id)` report a successful capture
    pub fn verifies(&self, id: u64, amount: Decimal, currency: Currency) {
        self.verifications.lock().unwrap().insert(
            id,
            TransactionVerification {
                transaction_id: id,
                status: "successful".to_string(),
                tx_ref: None,
                amount,
                currency: currency.to_string(),
                card: None,
            },
        );
    }

    pub fn charges(&self, outcome: ChargeOutcome) {
        *self.charge.lock().unwrap() = Some(outcome);
    }

    pub fn fails_refunds(&self, message: &str) {
        *self.refund_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn refund_calls(&self) -> Vec<RefundRequest> {
        self.refund_calls.lock().unwrap().clone()
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn build_payment_config(&self, request: &PaymentConfigRequest) -> PaymentConfig {
        PaymentConfig {
            public_key: "pk_test".to_string(),
            tx_ref: request.tx_ref.clone(),
            amount: request.amount,
            currency: request.currency,
            payment_options: PAYMENT_OPTIONS.to_string(),
            customer: request.customer.clone(),
            meta: PaymentMeta {
                order_id: request.order_id.clone(),
                actor: request.actor.clone(),
            },
            customizations: Customizations {
                title: "Order Payment".to_string(),
                description: format!("Payment for order {}", request.order_number),
            },
        }
    }

    async fn verify_transaction(
        &self,
        transaction_id: u64,
    ) -> ShopResult<TransactionVerification> {
        self.verify_calls.lock().unwrap().push(transaction_id);
        self.verifications
            .lock()
            .unwrap()
            .get(&transaction_id)
            .cloned()
            .ok_or_else(|| ShopError::Provider {
                provider: "mock".to_string(),
                message: format!("unknown transaction {transaction_id}"),
            })
    }

    async fn charge_token(&self, charge: &TokenCharge) -> ShopResult<ChargeOutcome> {
        self.charge_calls.lock().unwrap().push(charge.clone());
        self.charge
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ShopError::Network("no scripted charge".to_string()))
    }

    async fn refund(&self, request: &RefundRequest) -> ShopResult<RefundDisposition> {
        self.refund_calls.lock().unwrap().push(request.clone());
        match self.refund_error.lock().unwrap().clone() {
            Some(message) => Err(ShopError::Provider {
                provider: "mock".to_string(),
                message,
            }),
            None => Ok(RefundDisposition {
                refund_id: Some("rf_1".to_string()),
                status: "completed".to_string(),
            }),
        }
    }

    fn parse_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> ShopResult<Option<PaymentEvent>> {
        if signature.map(str::trim) != Some(WEBHOOK_HASH) {
            return Err(ShopError::WebhookVerificationFailed(
                "invalid signature".to_string(),
            ));
        }
        Ok(serde_json::from_slice(payload).ok())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Notifier that keeps everything it is handed
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent.lock().unwrap().iter().map(|n| n.kind()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), String> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

/// Wiring shared by the orchestrator tests
pub struct Harness {
    pub repo: Arc<InMemoryRepository>,
    pub gateway: Arc<MockGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub config: ShopConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            repo: Arc::new(InMemoryRepository::new()),
            gateway: Arc::new(MockGateway::new()),
            notifier: Arc::new(RecordingNotifier::default()),
            config: ShopConfig::new("https://shop.example"),
        }
    }
}
