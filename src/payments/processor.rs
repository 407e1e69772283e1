use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRequest {
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    pub order_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("payment processor timed out")]
    Timeout,
    #[error("payment processor unavailable: {0}")]
    Unavailable(String),
    #[error("payment processor rejected the request: {0}")]
    Rejected(String),
}

impl From<ProcessorError> for AppError {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::Timeout => AppError::PaymentProcessorTimeout,
            ProcessorError::Unavailable(msg) => AppError::PaymentProcessorUnavailable(msg),
            ProcessorError::Rejected(msg) => AppError::BadRequest(msg),
        }
    }
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_payment_intent(
        &self,
        request: &IntentRequest,
    ) -> Result<PaymentIntent, ProcessorError>;
}

/// Stripe's payment intent API over HTTPS.
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(
        api_base: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn create_payment_intent(
        &self,
        request: &IntentRequest,
    ) -> Result<PaymentIntent, ProcessorError> {
        let params = [
            ("amount", request.amount.to_string()),
            ("currency", request.currency.clone()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("metadata[orderId]", request.order_id.to_string()),
            ("metadata[userId]", request.user_id.to_string()),
        ];

        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            // Retrying for the same order returns the same intent instead of a new charge.
            .header("Idempotency-Key", format!("order-{}", request.order_id))
            .form(&params)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ProcessorError::Timeout
                } else {
                    ProcessorError::Unavailable(err.to_string())
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ProcessorError::Unavailable(format!("status {status}")));
        }
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| format!("status {status}"));
            return Err(ProcessorError::Rejected(message));
        }

        response.json::<PaymentIntent>().await.map_err(|err| {
            if err.is_timeout() {
                ProcessorError::Timeout
            } else {
                ProcessorError::Unavailable(format!("malformed response: {err}"))
            }
        })
    }
}
