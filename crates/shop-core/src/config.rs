//! Business settings injected into the orchestrators.
//!
//! Loaded once at startup by the application; nothing in the core reads
//! the environment.

use crate::pricing::ShippingTable;
use std::time::Duration;

/// Settings shared by checkout, payments, reconciliation and refunds
#[derive(Debug, Clone)]
pub struct ShopConfig {
    /// Public storefront URL, used for receipt and tracking links
    pub app_url: String,
    /// Mailbox that receives new-order notifications
    pub operator_email: String,
    /// Prefix of generated order numbers (`<prefix>-XXXXXXXX`)
    pub order_number_prefix: String,
    pub shipping: ShippingTable,
    /// Period of the refund sweep; zero disables it
    pub refund_sweep_interval: Duration,
    /// Submissions after which the sweep gives up on an order
    pub refund_max_attempts: u32,
}

impl ShopConfig {
    pub fn new(app_url: impl Into<String>) -> Self {
        Self {
            app_url: app_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Builder: set operator mailbox
    pub fn with_operator_email(mut self, email: impl Into<String>) -> Self {
        self.operator_email = email.into();
        self
    }

    /// Builder: set order number prefix
    pub fn with_order_number_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.order_number_prefix = prefix.into();
        self
    }

    /// Builder: set shipping table
    pub fn with_shipping(mut self, shipping: ShippingTable) -> Self {
        self.shipping = shipping;
        self
    }

    /// Builder: set refund sweep cadence and attempt ceiling
    pub fn with_refund_sweep(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.refund_sweep_interval = interval;
        self.refund_max_attempts = max_attempts;
        self
    }

    pub fn receipt_url(&self, order_number: &str) -> String {
        format!("{}/order/receipt/{}", self.app_url, order_number)
    }
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            app_url: "http://localhost:3000".to_string(),
            operator_email: "sales@kbcuniverse.org".to_string(),
            order_number_prefix: "KBC".to_string(),
            shipping: ShippingTable::default(),
            refund_sweep_interval: Duration::from_secs(900),
            refund_max_attempts: 5,
        }
    }
}
