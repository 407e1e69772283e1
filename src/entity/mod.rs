pub mod order_items;
pub mod orders;
pub mod payments;
pub mod processed_webhook_events;
pub mod products;
pub mod shipping_addresses;
pub mod users;

pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use payments::Entity as Payments;
pub use processed_webhook_events::Entity as ProcessedWebhookEvents;
pub use products::Entity as Products;
pub use shipping_addresses::Entity as ShippingAddresses;
pub use users::Entity as Users;
