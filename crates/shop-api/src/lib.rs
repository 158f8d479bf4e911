//! # shop-api
//!
//! HTTP API layer for orderflow-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - REST endpoints for checkout, order tracking, admin and payments
//! - The Flutterwave webhook endpoint
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/orders/checkout/{cart_id}` | Create order from cart |
//! | GET | `/orders/track/{order_number}` | Public tracking |
//! | GET | `/orders/my` | Customer orders |
//! | GET | `/orders/my/{id}` | Customer or guest order |
//! | POST | `/orders/{id}/cancel` | Cancel order |
//! | GET | `/admin/orders` | Admin list (`?status=`) |
//! | GET | `/admin/orders/{id}` | Admin order with audit history |
//! | PATCH | `/admin/orders/{id}/status` | Status update / cancel with refund |
//! | PATCH | `/admin/orders/{id}/shipping` | Shipping correction |
//! | POST | `/payments/orders/{id}/pay` | Inline payment config |
//! | POST | `/payments/orders/{id}/pay-with-saved` | Charge a saved card |
//! | POST | `/payments/orders/{id}/retry` | Retry payment |
//! | GET | `/payments/methods` | Saved cards |
//! | PATCH | `/payments/methods/{id}/default` | Set default card |
//! | DELETE | `/payments/methods/{id}` | Remove card |
//! | POST | `/webhooks/flutterwave` | Flutterwave webhook |

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppConfig, AppState};
