use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::payments::{
        CreatePaymentRequest, PaymentIntentRequest, PaymentIntentResponse, PaymentList, WebhookAck,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::Payment,
    payments::webhook::SIGNATURE_HEADER,
    response::{ApiResponse, Created},
    routes::AppJson,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_payments).post(create_payment))
        .route("/intent", post(create_payment_intent))
        .route("/webhook", post(payment_webhook))
        .route("/{id}", get(get_payment))
}

#[utoipa::path(
    post,
    path = "/api/payments",
    request_body = CreatePaymentRequest,
    responses(
        (status = 201, description = "Payment recorded as PENDING", body = ApiResponse<Payment>),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_payment(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CreatePaymentRequest>,
) -> AppResult<Created<Payment>> {
    payment_service::create_payment(&state, &user, payload).await
}

#[utoipa::path(
    get,
    path = "/api/payments",
    responses(
        (status = 200, description = "Payments of the current user", body = ApiResponse<PaymentList>),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn list_payments(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<PaymentList>>> {
    let resp = payment_service::list_payments(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/payments/{id}",
    params(("id" = Uuid, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment", body = ApiResponse<Payment>),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let resp = payment_service::get_payment(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/intent",
    request_body = PaymentIntentRequest,
    responses(
        (status = 200, description = "Client secret for the new intent", body = ApiResponse<PaymentIntentResponse>),
        (status = 400, description = "Processor rejected the request"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order is not awaiting payment"),
        (status = 502, description = "Payment processor unavailable"),
        (status = 504, description = "Payment processor timed out"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<PaymentIntentRequest>,
) -> AppResult<Json<ApiResponse<PaymentIntentResponse>>> {
    let resp = payment_service::create_payment_intent(&state, &user, payload).await?;
    Ok(Json(resp))
}

/// The body is taken as raw bytes: the signature covers the exact payload.
#[utoipa::path(
    post,
    path = "/api/payments/webhook",
    request_body(content = String, description = "Raw processor event", content_type = "application/json"),
    params(("Stripe-Signature" = String, Header, description = "t=<unix>,v1=<hex hmac>")),
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Missing or invalid signature"),
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let ack = payment_service::handle_webhook(&state, signature, &body).await?;
    Ok(Json(ack))
}
