//! # Cart Types
//!
//! A cart is owned by an authenticated customer or an anonymous device and is
//! consumed (not deleted) by checkout.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a cart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartStatus {
    /// Freely mutable
    Open,
    /// Claimed by a checkout; the order created from it has not been paid
    Locked,
    /// Payment for the order created from it was confirmed
    Cleared,
}

impl Default for CartStatus {
    fn default() -> Self {
        CartStatus::Open
    }
}

/// One cart line with the catalog price resolved in base currency
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: String,
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    pub title: String,
    pub quantity: u32,
    pub unit_price_usd: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl CartItem {
    pub fn new(
        product_id: impl Into<String>,
        title: impl Into<String>,
        unit_price_usd: Decimal,
        quantity: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            product_id: product_id.into(),
            variant_id: None,
            title: title.into(),
            quantity,
            unit_price_usd,
            image_url: None,
        }
    }

    /// Builder: set variant
    pub fn with_variant(mut self, variant_id: impl Into<String>) -> Self {
        self.variant_id = Some(variant_id.into());
        self
    }

    /// Builder: set image URL
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    /// Line total in base currency
    pub fn line_total_usd(&self) -> Decimal {
        self.unit_price_usd * Decimal::from(self.quantity)
    }
}

/// A shopping cart
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default)]
    pub status: CartStatus,
    #[serde(default)]
    pub items: Vec<CartItem>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Guest cart bound to a device
    pub fn for_device(device_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            customer_id: None,
            device_id: Some(device_id.into()),
            status: CartStatus::Open,
            items: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Cart owned by an authenticated customer
    pub fn for_customer(customer_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            customer_id: Some(customer_id.into()),
            device_id: None,
            status: CartStatus::Open,
            items: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Builder: add a line
    pub fn with_item(mut self, item: CartItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Only open carts accept new items or a new checkout
    pub fn is_open(&self) -> bool {
        self.status == CartStatus::Open
    }

    /// Total units across all lines
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}
