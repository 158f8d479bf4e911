//! # Application State
//!
//! Shared state for the Axum application.
//! Wires the repository, payment gateway and notifier into the core services.

use shop_core::{
    BoxedPaymentGateway, CheckoutService, InMemoryRepository, LoggingNotifier, OrderLifecycle,
    PaymentService, PricingConfig, ReconciliationProcessor, RefundOrchestrator, RefundSweeper,
    SharedNotifier, SharedRepository, ShopConfig,
};
use shop_flutterwave::FlutterwaveGateway;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Public storefront URL, used in receipt and tracking links
    pub app_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// Bearer token required on `/admin/*`; admin routes reject everything when unset
    pub admin_api_key: Option<String>,
    pub operator_email: String,
    pub order_number_prefix: String,
    /// Zero disables the refund sweep
    pub refund_sweep_interval_secs: u64,
    pub refund_sweep_max_attempts: u32,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = ShopConfig::default();

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parsed_var("PORT").unwrap_or(8080),
            app_url: std::env::var("APP_URL").unwrap_or(defaults.app_url),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            admin_api_key: std::env::var("ADMIN_API_KEY")
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            operator_email: std::env::var("OPERATOR_EMAIL").unwrap_or(defaults.operator_email),
            order_number_prefix: std::env::var("ORDER_NUMBER_PREFIX")
                .unwrap_or(defaults.order_number_prefix),
            refund_sweep_interval_secs: parsed_var("REFUND_SWEEP_INTERVAL_SECS")
                .unwrap_or(defaults.refund_sweep_interval.as_secs()),
            refund_sweep_max_attempts: parsed_var("REFUND_SWEEP_MAX_ATTEMPTS")
                .unwrap_or(defaults.refund_max_attempts),
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid socket address {}:{}: {}", self.host, self.port, e))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Business settings handed to the core services
    pub fn shop_config(&self, pricing: &PricingConfig) -> ShopConfig {
        ShopConfig::new(&self.app_url)
            .with_operator_email(&self.operator_email)
            .with_order_number_prefix(&self.order_number_prefix)
            .with_shipping(pricing.shipping.clone())
            .with_refund_sweep(
                Duration::from_secs(self.refund_sweep_interval_secs),
                self.refund_sweep_max_attempts,
            )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub shop: ShopConfig,
    pub repo: SharedRepository,
    pub checkout: Arc<CheckoutService>,
    pub payments: Arc<PaymentService>,
    pub lifecycle: Arc<OrderLifecycle>,
    pub reconciler: Arc<ReconciliationProcessor>,
    pub refunds: Arc<RefundOrchestrator>,
    pub provider: &'static str,
}

impl AppState {
    /// Create the production state: Flutterwave gateway, in-memory store,
    /// logging notifier
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env();
        let pricing = load_pricing_config()?;

        let gateway = FlutterwaveGateway::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize Flutterwave: {}", e))?;
        if gateway.config().is_test_mode() {
            tracing::warn!("Flutterwave is running with sandbox keys");
        }

        Ok(Self::build(
            config,
            pricing,
            Arc::new(InMemoryRepository::new()),
            Arc::new(gateway),
            Arc::new(LoggingNotifier),
        ))
    }

    /// Assemble the services over explicit ports
    pub fn build(
        config: AppConfig,
        pricing: PricingConfig,
        repo: SharedRepository,
        gateway: BoxedPaymentGateway,
        notifier: SharedNotifier,
    ) -> Self {
        let shop = config.shop_config(&pricing);
        let provider = gateway.provider_name();

        let checkout = CheckoutService::new(repo.clone(), Arc::new(pricing.rates), shop.clone())
            .with_provider(provider);
        let payments = PaymentService::new(
            repo.clone(),
            gateway.clone(),
            notifier.clone(),
            shop.clone(),
        );
        let refunds = Arc::new(RefundOrchestrator::new(repo.clone(), gateway.clone()));
        let lifecycle = OrderLifecycle::new(
            repo.clone(),
            refunds.clone(),
            notifier.clone(),
            shop.clone(),
        );
        let reconciler = ReconciliationProcessor::new(
            repo.clone(),
            gateway,
            refunds.clone(),
            notifier,
            shop.clone(),
        );

        Self {
            config,
            shop,
            repo,
            checkout: Arc::new(checkout),
            payments: Arc::new(payments),
            lifecycle: Arc::new(lifecycle),
            reconciler: Arc::new(reconciler),
            refunds,
            provider,
        }
    }

    /// Background retry loop for refunds that never reached the provider
    pub fn refund_sweeper(&self) -> RefundSweeper {
        RefundSweeper::new(
            self.refunds.clone(),
            self.repo.clone(),
            self.shop.refund_sweep_interval,
            self.shop.refund_max_attempts,
        )
    }
}

/// Load pricing from config/pricing.toml, falling back to the built-in
/// shipping table and USD-only rates
pub fn load_pricing_config() -> anyhow::Result<PricingConfig> {
    let config_paths = [
        "config/pricing.toml",
        "../config/pricing.toml",
        "../../config/pricing.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let pricing = PricingConfig::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            tracing::info!("Loaded {} exchange rates from {}", pricing.rates.len(), path);
            return Ok(pricing);
        }
    }

    tracing::warn!("No pricing config found, using built-in shipping table and USD only");
    Ok(PricingConfig::default())
}
