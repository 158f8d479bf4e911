//! Shipping snapshots and saved address-book entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Denormalized shipping address captured on an order.
///
/// Distinct from [`CustomerAddress`]: editing the address book never touches
/// an order's snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub full_name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal: Option<String>,
    pub country: String,
}

impl ShippingAddress {
    /// First word of the recipient's name, for notification greetings
    pub fn first_name(&self) -> &str {
        self.full_name.split_whitespace().next().unwrap_or("there")
    }

    /// Content hash used to deduplicate saved addresses
    pub fn content_hash(&self) -> String {
        address_hash(self)
    }
}

/// A customer's saved address-book entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerAddress {
    pub id: String,
    pub customer_id: String,
    pub address_hash: String,
    pub address: ShippingAddress,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Hex SHA-256 over the normalized street, city, state, postal code and country.
///
/// Case and punctuation differences hash identically, so "12 Main St." and
/// "12 main st" map to the same saved entry.
pub fn address_hash(address: &ShippingAddress) -> String {
    let joined = [
        address.street.as_str(),
        address.city.as_str(),
        address.state.as_deref().unwrap_or(""),
        address.postal.as_deref().unwrap_or(""),
        address.country.as_str(),
    ]
    .join("|")
    .to_lowercase();

    let normalized: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '|')
        .collect();

    hex::encode(Sha256::digest(normalized.as_bytes()))
}
