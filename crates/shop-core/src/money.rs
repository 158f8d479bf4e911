//! # Money Types
//!
//! Currencies and fixed-point amounts for orderflow.
//! Every amount is a `Decimal`; USD is the base currency that catalog prices
//! and historical reporting are expressed in.

use crate::error::{ShopError, ShopResult};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported checkout currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    NGN,
    ZAR,
    EUR,
    GBP,
}

impl Currency {
    /// The currency all catalog prices are stored in
    pub const BASE: Currency = Currency::USD;

    /// Returns the ISO 4217 currency code
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::NGN => "NGN",
            Currency::ZAR => "ZAR",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
        }
    }

    /// Number of decimal places in the minor unit
    pub fn decimal_places(&self) -> u32 {
        2
    }

    /// Two-letter country the provider expects alongside this currency
    pub fn country_code(&self) -> &'static str {
        match self {
            Currency::USD => "US",
            Currency::EUR => "EU",
            Currency::GBP => "GB",
            Currency::NGN => "NG",
            Currency::ZAR => "ZA",
        }
    }

    /// Round an amount to this currency's minor unit
    pub fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.decimal_places(), RoundingStrategy::MidpointAwayFromZero)
    }

    /// Parse a caller-supplied code; unknown codes are never defaulted
    pub fn parse(code: &str) -> ShopResult<Self> {
        code.parse()
    }
}

impl FromStr for Currency {
    type Err = ShopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "NGN" => Ok(Currency::NGN),
            "ZAR" => Ok(Currency::ZAR),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            _ => Err(ShopError::UnsupportedCurrency {
                currency: s.to_string(),
            }),
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::BASE
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subtotal, shipping and total of an order in one currency.
///
/// `total` is derived exactly once, in [`OrderAmounts::new`]; there is no
/// setter, so it can never drift from `subtotal + shipping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAmounts {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

impl OrderAmounts {
    pub fn new(subtotal: Decimal, shipping: Decimal) -> Self {
        Self {
            subtotal,
            shipping,
            total: subtotal + shipping,
        }
    }

    /// Check the creation-time invariant
    pub fn is_consistent(&self) -> bool {
        self.total == self.subtotal + self.shipping
    }
}

/// Format an amount the way customer-facing messages show it (e.g. "USD30.00")
pub fn display_amount(currency: Currency, amount: Decimal) -> String {
    format!("{}{:.2}", currency, currency.round(amount))
}
