use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{AuthResponse, LoginRequest, RegisterRequest, UpdateProfileRequest},
        orders::{
            CreateOrderRequest, OrderItemInput, OrderList, OrderWithItems, ShippingAddressInput,
            UpdateOrderStatusRequest,
        },
        payments::{
            CreatePaymentRequest, PaymentIntentRequest, PaymentIntentResponse, PaymentList,
            WebhookAck,
        },
        products::{CreateProductRequest, ProductList, UpdateProductRequest},
    },
    identity::Role,
    models::{Order, OrderItem, Payment, Product, ShippingAddress, User},
    realtime::ws,
    response::{ApiResponse, Meta},
    routes::{admin, auth, health, orders, params, payments, products},
    status::{OrderStatus, PaymentStatus},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        ws::ws_handler,
        auth::register,
        auth::login,
        auth::profile,
        auth::update_profile,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::update_order_status,
        payments::create_payment,
        payments::list_payments,
        payments::get_payment,
        payments::create_payment_intent,
        payments::payment_webhook,
        admin::list_all_orders,
        admin::get_order_admin,
    ),
    components(
        schemas(
            User,
            Role,
            Product,
            Order,
            OrderItem,
            ShippingAddress,
            Payment,
            OrderStatus,
            PaymentStatus,
            RegisterRequest,
            LoginRequest,
            UpdateProfileRequest,
            AuthResponse,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            OrderItemInput,
            ShippingAddressInput,
            CreateOrderRequest,
            UpdateOrderStatusRequest,
            OrderList,
            OrderWithItems,
            CreatePaymentRequest,
            PaymentIntentRequest,
            PaymentIntentResponse,
            PaymentList,
            WebhookAck,
            params::SortOrder,
            params::ProductSortBy,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<Payment>,
            ApiResponse<AuthResponse>,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration, login and profile"),
        (name = "Perfumes", description = "Perfume catalog"),
        (name = "Orders", description = "Order placement and lifecycle"),
        (name = "Payments", description = "Payments, intents and processor webhooks"),
        (name = "Admin", description = "Admin order views"),
        (name = "Realtime", description = "WebSocket event stream"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
