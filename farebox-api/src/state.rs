use farebox_order::{BookingEngine, ReconciliationService};
use farebox_store::app_config::BusinessRules;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingEngine>,
    pub recon: Arc<ReconciliationService>,
    pub auth: AuthConfig,
    pub rules: BusinessRules,
}
