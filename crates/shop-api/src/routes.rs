//! # Routes
//!
//! Axum router configuration for the order API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Orders:
///   - POST /orders/checkout/{cart_id} - Create an order from a cart
///   - GET  /orders/track/{order_number} - Public tracking
///   - GET  /orders/my - Customer order list
///   - GET  /orders/my/{id} - Customer or guest order
///   - POST /orders/{id}/cancel - Customer or guest cancel
///
/// - Admin (bearer token + x-admin-id):
///   - GET   /admin/orders - List, optional `?status=`
///   - GET   /admin/orders/{id}
///   - PATCH /admin/orders/{id}/status
///   - PATCH /admin/orders/{id}/shipping
///
/// - Payments:
///   - POST   /payments/orders/{order_id}/pay
///   - POST   /payments/orders/{order_id}/pay-with-saved
///   - POST   /payments/orders/{order_id}/retry
///   - GET    /payments/methods
///   - PATCH  /payments/methods/{id}/default
///   - DELETE /payments/methods/{id}
///
/// - Webhooks:
///   - POST /webhooks/flutterwave
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let order_routes = Router::new()
        .route("/checkout/{cart_id}", post(handlers::checkout))
        .route("/track/{order_number}", get(handlers::track_order))
        .route("/my", get(handlers::my_orders))
        .route("/my/{order_id}", get(handlers::my_order))
        .route("/{order_id}/cancel", post(handlers::cancel_order));

    let admin_routes = Router::new()
        .route("/orders", get(handlers::admin_list_orders))
        .route("/orders/{order_id}", get(handlers::admin_get_order))
        .route("/orders/{order_id}/status", patch(handlers::admin_update_status))
        .route("/orders/{order_id}/shipping", patch(handlers::admin_update_shipping));

    let payment_routes = Router::new()
        .route("/orders/{order_id}/pay", post(handlers::initiate_payment))
        .route("/orders/{order_id}/pay-with-saved", post(handlers::pay_with_saved))
        .route("/orders/{order_id}/retry", post(handlers::retry_payment))
        .route("/methods", get(handlers::list_payment_methods))
        .route("/methods/{method_id}", delete(handlers::delete_payment_method))
        .route("/methods/{method_id}/default", patch(handlers::set_default_payment_method));

    // Raw body; the provider does not send CORS preflights
    let webhook_routes = Router::new().route("/flutterwave", post(handlers::flutterwave_webhook));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/orders", order_routes)
        .nest("/admin", admin_routes)
        .nest("/payments", payment_routes)
        .nest("/webhooks", webhook_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
