//! Saved cards.

use crate::event::CardDetails;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tokenized card a customer can pay with again
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPaymentMethod {
    pub id: String,
    pub customer_id: String,
    pub provider: String,
    /// Provider-side reference; unique per customer
    pub provider_ref: String,
    #[serde(skip_serializing)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp_month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp_year: Option<u32>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomerPaymentMethod {
    /// New card record from provider-reported details; `provider_ref` is the
    /// transaction the card was captured on.
    pub fn from_card(
        customer_id: impl Into<String>,
        provider: impl Into<String>,
        provider_ref: impl Into<String>,
        card: &CardDetails,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.into(),
            provider: provider.into(),
            provider_ref: provider_ref.into(),
            token: card.token.clone(),
            brand: card.brand.clone(),
            last4: card.last4.clone(),
            exp_month: card.exp_month,
            exp_year: card.exp_year,
            is_default: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_never_serialized() {
        let card = CardDetails {
            token: "flw-t1-secret".into(),
            brand: Some("VISA".into()),
            last4: Some("4242".into()),
            exp_month: Some(9),
            exp_year: Some(2031),
        };
        let method = CustomerPaymentMethod::from_card("c1", "flutterwave", "9001", &card);
        assert!(method.has_token());

        let json = serde_json::to_value(&method).unwrap();
        assert!(json.get("token").is_none());
        assert_eq!(json["last4"], "4242");
        assert_eq!(json["providerRef"], "9001");
    }
}
