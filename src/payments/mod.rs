//! Payment processor integration: outbound payment intents and inbound webhooks.

pub mod processor;
pub mod webhook;

pub use processor::{IntentRequest, PaymentIntent, PaymentProcessor, ProcessorError, StripeClient};
pub use webhook::{ProcessorEvent, WebhookEvent, WebhookVerifier};
