//! # shop-flutterwave
//!
//! Flutterwave v3 adapter for the orderflow-rs payment port.
//!
//! This crate provides:
//! - `FlutterwaveGateway`, the `PaymentGateway` implementation
//!   - inline widget config (`card,banktransfer,ussd,account`)
//!   - transaction verification
//!   - tokenized charges against saved cards
//!   - refunds with a forwarded idempotency key
//! - `verif-hash` webhook authentication and payload normalization
//!   for both the nested (`type` + `data`) and legacy flat shapes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shop_flutterwave::FlutterwaveGateway;
//! use shop_core::PaymentGateway;
//!
//! // FLW_PUBLIC_KEY, FLW_SECRET_KEY, FLW_SECRET_HASH
//! let gateway = FlutterwaveGateway::from_env()?;
//!
//! // Authoritative status before trusting a webhook
//! let verification = gateway.verify_transaction(9001).await?;
//! assert!(verification.is_successful());
//! ```
//!
//! ## Webhook Handling
//!
//! ```rust,ignore
//! let event = gateway.parse_webhook(&body, headers.get("verif-hash"))?;
//! ```

pub mod config;
pub mod gateway;
pub mod webhook;

// Re-exports
pub use config::FlutterwaveConfig;
pub use gateway::FlutterwaveGateway;
pub use webhook::{classify, extract_card_details, verify_signature, WebhookEnvelope, REFUND_EVENT_TYPES};
