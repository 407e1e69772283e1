use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{error::AppError, models::Payment};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    #[serde(alias = "orderId")]
    pub order_id: Uuid,
    pub amount: i64,
    #[serde(alias = "paymentMethod")]
    pub payment_method: String,
}

impl CreatePaymentRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.amount < 0 {
            return Err(AppError::BadRequest("amount must not be negative".into()));
        }
        if self.payment_method.trim().is_empty() {
            return Err(AppError::BadRequest("payment_method is required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentIntentRequest {
    #[serde(alias = "orderId")]
    pub order_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentIntentResponse {
    pub client_secret: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentList {
    pub items: Vec<Payment>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}
