//! # Currency & Pricing Resolver
//!
//! Converts base-currency subtotals and shipping fees into the customer's
//! currency with a fixed-point exchange rate. Quoting is pure; the only I/O
//! is the rate lookup, which sits behind [`RateLookup`].
//!
//! Shipping fees and rates are loaded from `config/pricing.toml`:
//!
//! ```toml
//! base_currency = "USD"
//!
//! [shipping]
//! default_usd = "25"
//!
//! [shipping.by_country]
//! "United States" = "5"
//!
//! [rates]
//! NGN = "1550.25"
//! ```

use crate::cart::CartItem;
use crate::error::{ShopError, ShopResult};
use crate::money::{Currency, OrderAmounts};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Read-only exchange-rate source (units of `currency` per 1 USD)
#[async_trait]
pub trait RateLookup: Send + Sync {
    async fn rate_for(&self, currency: Currency) -> ShopResult<Option<Decimal>>;
}

/// Fixed rate table, typically loaded from configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticRates {
    rates: HashMap<Currency, Decimal>,
}

impl StaticRates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set a rate
    pub fn with_rate(mut self, currency: Currency, rate: Decimal) -> Self {
        self.rates.insert(currency, rate);
        self
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

#[async_trait]
impl RateLookup for StaticRates {
    async fn rate_for(&self, currency: Currency) -> ShopResult<Option<Decimal>> {
        Ok(self.rates.get(&currency).copied())
    }
}

/// Resolve the exchange rate for `currency`.
///
/// USD is always exactly 1. Any other currency must have a positive rate;
/// a missing rate is a validation failure, never a silent default.
pub async fn resolve_rate(currency: Currency, rates: &dyn RateLookup) -> ShopResult<Decimal> {
    if currency == Currency::BASE {
        return Ok(Decimal::ONE);
    }

    let rate = rates
        .rate_for(currency)
        .await?
        .ok_or_else(|| ShopError::UnsupportedCurrency {
            currency: currency.to_string(),
        })?;

    if rate <= Decimal::ZERO {
        return Err(ShopError::Configuration(format!(
            "exchange rate for {currency} must be positive, got {rate}"
        )));
    }

    Ok(rate)
}

/// Shipping fees in base currency keyed by destination country name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingTable {
    pub default_usd: Decimal,
    #[serde(default)]
    pub by_country: HashMap<String, Decimal>,
}

impl ShippingTable {
    pub fn new(default_usd: Decimal) -> Self {
        Self {
            default_usd,
            by_country: HashMap::new(),
        }
    }

    /// Builder: set a per-country fee
    pub fn with_country(mut self, country: impl Into<String>, fee_usd: Decimal) -> Self {
        self.by_country.insert(country.into(), fee_usd);
        self
    }

    /// Exact-match lookup with default fallback
    pub fn fee_for(&self, country: &str) -> Decimal {
        self.by_country
            .get(country)
            .copied()
            .unwrap_or(self.default_usd)
    }
}

impl Default for ShippingTable {
    fn default() -> Self {
        Self::new(Decimal::from(25))
            .with_country("United States", Decimal::from(5))
            .with_country("Canada", Decimal::from(10))
            .with_country("United Kingdom", Decimal::from(12))
            .with_country("Nigeria", Decimal::from(15))
            .with_country("South Africa", Decimal::from(18))
    }
}

/// Pricing configuration file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default)]
    pub base_currency: Currency,
    #[serde(default)]
    pub shipping: ShippingTable,
    #[serde(default)]
    pub rates: StaticRates,
}

impl PricingConfig {
    /// Load from a TOML string
    pub fn from_toml(toml_str: &str) -> ShopResult<Self> {
        let config: PricingConfig = toml::from_str(toml_str)
            .map_err(|e| ShopError::Configuration(format!("invalid pricing config: {e}")))?;

        if config.base_currency != Currency::BASE {
            return Err(ShopError::Configuration(format!(
                "base currency must be {}, got {}",
                Currency::BASE,
                config.base_currency
            )));
        }

        Ok(config)
    }
}

/// Result of pricing a cart for a destination and currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub currency: Currency,
    pub exchange_rate: Decimal,
    /// In `currency`
    pub local: OrderAmounts,
    /// In USD
    pub base: OrderAmounts,
    /// Per-line unit price in `currency`, same order as the input lines
    pub unit_prices_local: Vec<Decimal>,
}

/// Price cart lines: subtotal from quantity x base unit price, shipping from
/// the table, both converted with `rate` and rounded to the minor unit.
pub fn quote(
    lines: &[CartItem],
    country: &str,
    currency: Currency,
    rate: Decimal,
    shipping: &ShippingTable,
) -> PriceQuote {
    let subtotal_usd: Decimal = lines.iter().map(CartItem::line_total_usd).sum();
    let shipping_usd = shipping.fee_for(country);

    let subtotal_local = currency.round(subtotal_usd * rate);
    let shipping_local = currency.round(shipping_usd * rate);

    let unit_prices_local = lines
        .iter()
        .map(|line| currency.round(line.unit_price_usd * rate))
        .collect();

    PriceQuote {
        currency,
        exchange_rate: rate,
        local: OrderAmounts::new(subtotal_local, shipping_local),
        base: OrderAmounts::new(subtotal_usd, shipping_usd),
        unit_prices_local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn two_line_cart() -> Vec<CartItem> {
        vec![
            CartItem::new("p1", "Tee", dec!(10.00), 2),
            CartItem::new("p2", "Cap", dec!(5.00), 1),
        ]
    }

    #[test]
    fn test_quote_usd_united_states() {
        let q = quote(
            &two_line_cart(),
            "United States",
            Currency::USD,
            Decimal::ONE,
            &ShippingTable::default(),
        );

        assert_eq!(q.local.subtotal, dec!(25.00));
        assert_eq!(q.local.shipping, dec!(5.00));
        assert_eq!(q.local.total, dec!(30.00));
        assert_eq!(q.base, q.local);
        assert_eq!(q.currency, Currency::USD);
    }

    #[test]
    fn test_quote_converts_and_keeps_base() {
        let q = quote(
            &two_line_cart(),
            "Nigeria",
            Currency::NGN,
            dec!(1500.5),
            &ShippingTable::default(),
        );

        assert_eq!(q.base.subtotal, dec!(25));
        assert_eq!(q.base.shipping, dec!(15));
        assert_eq!(q.local.subtotal, dec!(37512.50));
        assert_eq!(q.local.shipping, dec!(22507.50));
        assert!(q.local.is_consistent());
        assert!(q.base.is_consistent());
        assert_eq!(q.unit_prices_local, vec![dec!(15005.00), dec!(7502.50)]);
    }

    #[test]
    fn test_unknown_country_uses_default_fee() {
        let table = ShippingTable::default();
        assert_eq!(table.fee_for("Atlantis"), dec!(25));
        assert_eq!(table.fee_for("Canada"), dec!(10));
    }

    #[tokio::test]
    async fn test_resolve_rate() {
        let rates = StaticRates::new().with_rate(Currency::EUR, dec!(0.92));

        assert_eq!(resolve_rate(Currency::USD, &rates).await.unwrap(), Decimal::ONE);
        assert_eq!(resolve_rate(Currency::EUR, &rates).await.unwrap(), dec!(0.92));
        assert!(matches!(
            resolve_rate(Currency::GBP, &rates).await,
            Err(ShopError::UnsupportedCurrency { .. })
        ));
    }

    #[tokio::test]
    async fn test_non_positive_rate_rejected() {
        let rates = StaticRates::new().with_rate(Currency::ZAR, Decimal::ZERO);
        assert!(matches!(
            resolve_rate(Currency::ZAR, &rates).await,
            Err(ShopError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_pricing_config_from_toml() {
        let config = PricingConfig::from_toml(
            r#"
base_currency = "USD"

[shipping]
default_usd = "30"

[shipping.by_country]
"Ghana" = "14"

[rates]
NGN = "1550.25"
"#,
        )
        .unwrap();

        assert_eq!(config.shipping.fee_for("Ghana"), dec!(14));
        assert_eq!(config.shipping.fee_for("Peru"), dec!(30));
        assert_eq!(
            config.rates.rate_for(Currency::NGN).await.unwrap(),
            Some(dec!(1550.25))
        );
    }
}
