use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::payments::{
        CreatePaymentRequest, PaymentIntentRequest, PaymentIntentResponse, PaymentList,
        WebhookAck,
    },
    entity::{
        orders::{Column as OrderCol, Entity as Orders, Model as OrderModel},
        payments::{ActiveModel as PaymentActive, Column as PayCol, Entity as Payments},
        processed_webhook_events::{
            ActiveModel as ProcessedActive, Column as ProcessedCol,
            Entity as ProcessedWebhookEvents,
        },
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Payment,
    payments::{
        IntentRequest, ProcessorEvent, WebhookEvent,
        webhook::{PaymentIntentEvent, parse_event},
    },
    realtime::{OrderStatusChange, PaymentStatusChange, RealtimeEvent},
    response::{ApiResponse, Created, Meta},
    services::order_service::apply_transition,
    state::AppState,
    status::{OrderStatus, PaymentStatus},
};

async fn owned_order(state: &AppState, user: &AuthUser, order_id: Uuid) -> AppResult<OrderModel> {
    Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::Id.eq(order_id))
                .add(OrderCol::UserId.eq(user.user_id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn create_payment(
    state: &AppState,
    user: &AuthUser,
    payload: CreatePaymentRequest,
) -> AppResult<Created<Payment>> {
    payload.validate()?;
    let order = owned_order(state, user, payload.order_id).await?;

    let payment = PaymentActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        user_id: Set(user.user_id),
        amount: Set(payload.amount),
        payment_method: Set(payload.payment_method.trim().to_string()),
        status: Set(PaymentStatus::Pending.to_string()),
        processor_reference: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    let payment = Payment::try_from(payment)?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "payment_created",
        "payments",
        serde_json::json!({ "payment_id": payment.id, "order_id": order.id }),
    )
    .await;

    Ok(ApiResponse::success("Payment created", payment, Some(Meta::empty())).created())
}

pub async fn list_payments(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<PaymentList>> {
    let items = Payments::find()
        .filter(PayCol::UserId.eq(user.user_id))
        .order_by_desc(PayCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Payment::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let total = items.len() as i64;
    Ok(ApiResponse::success(
        "Payments",
        PaymentList { items },
        Some(Meta::new(1, total, total)),
    ))
}

pub async fn get_payment(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Payment>> {
    let payment = Payments::find()
        .filter(
            Condition::all()
                .add(PayCol::Id.eq(id))
                .add(PayCol::UserId.eq(user.user_id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(ApiResponse::success(
        "Payment",
        Payment::try_from(payment)?,
        Some(Meta::empty()),
    ))
}

/// Asks the processor for a payment intent covering the order total. Nothing
/// is stored locally; the outcome arrives later through the webhook.
pub async fn create_payment_intent(
    state: &AppState,
    user: &AuthUser,
    payload: PaymentIntentRequest,
) -> AppResult<ApiResponse<PaymentIntentResponse>> {
    let order = owned_order(state, user, payload.order_id).await?;
    let status: OrderStatus = order.status.parse().map_err(|_| {
        AppError::Internal(anyhow::anyhow!(
            "unexpected orders.status value in database: {}",
            order.status
        ))
    })?;
    if status != OrderStatus::Pending {
        return Err(AppError::InvalidTransition {
            from: status,
            to: OrderStatus::Paid,
        });
    }

    let request = IntentRequest {
        amount: order.total,
        currency: state.currency.clone(),
        order_id: order.id,
        user_id: user.user_id,
    };
    let intent = state
        .processor
        .create_payment_intent(&request)
        .await
        .inspect_err(|err| {
            tracing::warn!(order_id = %order.id, error = %err, "payment intent failed")
        })?;

    tracing::info!(order_id = %order.id, intent_id = %intent.id, "payment intent created");
    Ok(ApiResponse::success(
        "Payment intent created",
        PaymentIntentResponse {
            client_secret: intent.client_secret,
        },
        Some(Meta::empty()),
    ))
}

/// Entry point for processor deliveries.
///
/// Only a missing or bad signature is reported back. After verification every
/// delivery is acknowledged, and reconciliation problems are logged instead.
pub async fn handle_webhook(
    state: &AppState,
    signature: Option<&str>,
    body: &[u8],
) -> AppResult<WebhookAck> {
    state
        .webhook
        .verify(body, signature, Utc::now().timestamp())?;

    match parse_event(body) {
        Ok(event) => reconcile(state, event).await,
        Err(err) => tracing::warn!(error = %err, "undecodable webhook payload acknowledged"),
    }
    Ok(WebhookAck { received: true })
}

struct Settlement {
    order_id: Uuid,
    user_id: Uuid,
    from: OrderStatus,
    changed: bool,
    payments_updated: u64,
}

async fn reconcile(state: &AppState, event: WebhookEvent) {
    let event_type = event.kind.type_name().to_string();
    let (intent, order_status, payment_status) = match event.kind {
        ProcessorEvent::PaymentSucceeded(intent) => {
            (intent, OrderStatus::Paid, PaymentStatus::Succeeded)
        }
        ProcessorEvent::PaymentFailed(intent) => {
            (intent, OrderStatus::Failed, PaymentStatus::Failed)
        }
        ProcessorEvent::Unhandled { kind } => {
            tracing::info!(
                event_id = %event.id,
                kind = %kind,
                "unhandled webhook event acknowledged"
            );
            return;
        }
    };

    let settled = settle(
        state,
        &event.id,
        &event_type,
        &intent,
        order_status,
        payment_status,
    )
    .await;
    let outcome = match settled {
        Ok(Some(outcome)) => outcome,
        Ok(None) => {
            tracing::info!(event_id = %event.id, "duplicate webhook event skipped");
            return;
        }
        Err(err) => {
            tracing::error!(
                event_id = %event.id,
                event_type = %event_type,
                order_id = ?intent.order_id,
                error = ?err,
                "webhook reconciliation failed"
            );
            return;
        }
    };

    if !outcome.changed && outcome.payments_updated == 0 {
        tracing::info!(
            event_id = %event.id,
            order_id = %outcome.order_id,
            "payment event already reflected, nothing to update"
        );
        return;
    }

    tracing::info!(
        event_id = %event.id,
        order_id = %outcome.order_id,
        from = %outcome.from,
        to = %order_status,
        payments = outcome.payments_updated,
        "payment reconciled"
    );
    audit::record(
        &state.pool,
        Some(outcome.user_id),
        "payment_webhook",
        "payments",
        serde_json::json!({
            "event_id": event.id,
            "event_type": event_type,
            "order_id": outcome.order_id,
            "intent_id": intent.intent_id,
            "status": order_status,
        }),
    )
    .await;

    if outcome.changed {
        state
            .notifier
            .emit(RealtimeEvent::OrderStatusUpdated(OrderStatusChange {
                id: outcome.order_id,
                status: order_status,
            }));
    }
    state
        .notifier
        .emit(RealtimeEvent::PaymentUpdated(PaymentStatusChange {
            order_id: outcome.order_id,
            status: payment_status,
        }));
}

/// Applies one payment outcome. Returns `None` when the event id was already
/// processed; the marker row is written in the same transaction as the status
/// change, so a failed settlement leaves the event eligible again.
async fn settle(
    state: &AppState,
    event_id: &str,
    event_type: &str,
    intent: &PaymentIntentEvent,
    order_status: OrderStatus,
    payment_status: PaymentStatus,
) -> AppResult<Option<Settlement>> {
    let order_id = intent
        .order_id
        .ok_or_else(|| AppError::BadRequest("payment intent has no orderId metadata".into()))?;

    let txn = state.orm.begin().await?;

    let inserted = ProcessedWebhookEvents::insert(ProcessedActive {
        event_id: Set(event_id.to_string()),
        event_type: Set(event_type.to_string()),
        order_id: Set(Some(order_id)),
        received_at: NotSet,
    })
    .on_conflict(
        OnConflict::column(ProcessedCol::EventId)
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(&txn)
    .await?;
    if inserted == 0 {
        return Ok(None);
    }

    let order = Orders::find_by_id(order_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    if let Some(user_id) = intent.user_id
        && user_id != order.user_id
    {
        return Err(AppError::Conflict(format!(
            "payment intent user {user_id} does not own order {order_id}"
        )));
    }
    let user_id = order.user_id;

    let transition = apply_transition(&txn, order, order_status).await?;

    let payments_updated = Payments::update_many()
        .col_expr(PayCol::Status, Expr::value(payment_status.as_str()))
        .col_expr(PayCol::ProcessorReference, Expr::value(intent.intent_id.clone()))
        .col_expr(PayCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(PayCol::OrderId.eq(order_id))
        .filter(PayCol::Status.eq(PaymentStatus::Pending.as_str()))
        .exec(&txn)
        .await?
        .rows_affected;

    txn.commit().await?;

    Ok(Some(Settlement {
        order_id,
        user_id,
        from: transition.from,
        changed: transition.changed,
        payments_updated,
    }))
}
