use std::{env, time::Duration};

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub frontend_url: Option<String>,
    pub payments: PaymentConfig,
}

/// Settings for the external payment processor.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub api_base: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub currency: String,
    pub timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup, so tests don't have
    /// to touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).with_context(|| format!("{key} is not set"));

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;
        let host = lookup("APP_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = lookup("APP_PORT")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let jwt_ttl_hours = lookup("JWT_TTL_HOURS")
            .and_then(|h| h.parse::<i64>().ok())
            .filter(|h| *h > 0)
            .unwrap_or(24);
        let frontend_url = lookup("FRONTEND_URL").filter(|url| !url.is_empty());

        let payments = PaymentConfig {
            api_base: lookup("STRIPE_API_BASE")
                .unwrap_or_else(|| "https://api.stripe.com".to_string()),
            secret_key: required("STRIPE_SECRET_KEY")?,
            webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            currency: lookup("PAYMENT_CURRENCY")
                .map(|c| c.to_lowercase())
                .unwrap_or_else(|| "usd".to_string()),
            timeout: Duration::from_secs(
                lookup("PAYMENT_TIMEOUT_SECS")
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(10),
            ),
        };

        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            jwt_ttl_hours,
            frontend_url,
            payments,
        })
    }

    /// Only the database URL, for the migrate and seed binaries.
    pub fn database_url_from_env() -> anyhow::Result<String> {
        env::var("DATABASE_URL").context("DATABASE_URL is not set")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("DATABASE_URL", "postgres://localhost/shop"),
        ("JWT_SECRET", "secret"),
        ("STRIPE_SECRET_KEY", "sk_test"),
        ("STRIPE_WEBHOOK_SECRET", "whsec_test"),
    ];

    #[test]
    fn applies_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.jwt_ttl_hours, 24);
        assert_eq!(config.payments.currency, "usd");
        assert_eq!(config.payments.timeout, Duration::from_secs(10));
        assert_eq!(config.payments.api_base, "https://api.stripe.com");
        assert!(config.frontend_url.is_none());
    }

    #[test]
    fn reads_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("APP_PORT", "8080"),
            ("JWT_TTL_HOURS", "2"),
            ("PAYMENT_CURRENCY", "EUR"),
            ("PAYMENT_TIMEOUT_SECS", "3"),
            ("FRONTEND_URL", "http://localhost:5173"),
        ]);
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.jwt_ttl_hours, 2);
        assert_eq!(config.payments.currency, "eur");
        assert_eq!(config.payments.timeout, Duration::from_secs(3));
        assert_eq!(config.frontend_url.as_deref(), Some("http://localhost:5173"));
    }

    #[test]
    fn missing_secret_is_an_error() {
        let pairs: Vec<_> = REQUIRED
            .iter()
            .copied()
            .filter(|(k, _)| *k != "STRIPE_WEBHOOK_SECRET")
            .collect();
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(err.to_string().contains("STRIPE_WEBHOOK_SECRET"));
    }
}
