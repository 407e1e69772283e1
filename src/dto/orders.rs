use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{Order, OrderItem, Payment, ShippingAddress},
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OrderItemInput {
    #[serde(alias = "perfumeId")]
    pub perfume_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ShippingAddressInput {
    #[serde(alias = "fullName")]
    pub full_name: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub zone: String,
}

impl ShippingAddressInput {
    fn validate(&self) -> Result<(), AppError> {
        let fields = [
            ("full_name", &self.full_name),
            ("phone", &self.phone),
            ("address", &self.address),
            ("city", &self.city),
            ("zone", &self.zone),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(AppError::BadRequest(format!(
                    "shipping_address.{name} must not be empty"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemInput>,
    #[serde(alias = "shippingAddress")]
    pub shipping_address: ShippingAddressInput,
}

impl CreateOrderRequest {
    /// Validates the request and folds duplicate perfumes into one line.
    ///
    /// Lines come back sorted by perfume id, which is also the order rows are
    /// locked in, so two concurrent checkouts can never deadlock on each other.
    pub fn order_lines(&self) -> Result<Vec<(Uuid, i32)>, AppError> {
        if self.items.is_empty() {
            return Err(AppError::BadRequest("Order must contain at least one item".into()));
        }
        self.shipping_address.validate()?;

        let mut lines: BTreeMap<Uuid, i32> = BTreeMap::new();
        for item in &self.items {
            if item.quantity <= 0 {
                return Err(AppError::BadRequest(format!(
                    "Quantity for perfume {} must be positive",
                    item.perfume_id
                )));
            }
            let quantity = lines.entry(item.perfume_id).or_insert(0);
            *quantity = quantity
                .checked_add(item.quantity)
                .ok_or_else(|| AppError::BadRequest("Quantity is too large".into()))?;
        }
        Ok(lines.into_iter().collect())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub shipping_address: Option<ShippingAddress>,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
