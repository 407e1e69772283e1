use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn, orm_from_pool},
    identity::TokenKeys,
    payments::{PaymentProcessor, WebhookVerifier},
    realtime::Notifier,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub tokens: TokenKeys,
    pub webhook: WebhookVerifier,
    pub processor: Arc<dyn PaymentProcessor>,
    pub notifier: Notifier,
    /// Currency for payment intents, lower-case ISO code.
    pub currency: String,
}

impl AppState {
    pub fn new(config: &AppConfig, pool: DbPool, processor: Arc<dyn PaymentProcessor>) -> Self {
        Self {
            orm: orm_from_pool(pool.clone()),
            pool,
            tokens: TokenKeys::new(&config.jwt_secret, config.jwt_ttl_hours),
            webhook: WebhookVerifier::new(&config.payments.webhook_secret),
            processor,
            notifier: Notifier::default(),
            currency: config.payments.currency.clone(),
        }
    }
}

impl FromRef<AppState> for Notifier {
    fn from_ref(state: &AppState) -> Self {
        state.notifier.clone()
    }
}
