use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{CreateOrderRequest, OrderList, OrderWithItems, UpdateOrderStatusRequest},
    entity::{
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        payments::{Column as PayCol, Entity as Payments},
        products::{Column as ProdCol, Entity as Products},
        shipping_addresses::{
            ActiveModel as AddressActive, Column as AddressCol, Entity as ShippingAddresses,
        },
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, Payment, ShippingAddress},
    realtime::{OrderStatusChange, RealtimeEvent},
    response::{ApiResponse, Created, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
    status::OrderStatus,
};

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<Created<OrderWithItems>> {
    let lines = payload.order_lines()?;
    let txn = state.orm.begin().await?;

    // Lines are sorted by id, so rows are always locked in the same order.
    let mut priced: Vec<(Uuid, i32, i64)> = Vec::with_capacity(lines.len());
    let mut total: i64 = 0;
    for (product_id, quantity) in lines {
        let product = Products::find_by_id(product_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or(AppError::PerfumeNotFound(product_id))?;

        if product.stock < quantity {
            return Err(AppError::InsufficientStock { product_id });
        }
        total = product
            .price
            .checked_mul(i64::from(quantity))
            .and_then(|line| total.checked_add(line))
            .ok_or_else(|| AppError::BadRequest("Order total is too large".into()))?;
        priced.push((product_id, quantity, product.price));
    }

    let now = Utc::now();
    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        total: Set(total),
        status: Set(OrderStatus::Pending.to_string()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    for (product_id, quantity, price) in &priced {
        OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(*product_id),
            quantity: Set(*quantity),
            price: Set(*price),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;

        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(*quantity))
            .col_expr(ProdCol::UpdatedAt, Expr::value(now))
            .filter(ProdCol::Id.eq(*product_id))
            .exec(&txn)
            .await?;
    }

    let address = payload.shipping_address;
    AddressActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        full_name: Set(address.full_name.trim().to_string()),
        phone: Set(address.phone.trim().to_string()),
        address: Set(address.address.trim().to_string()),
        city: Set(address.city.trim().to_string()),
        zone: Set(address.zone.trim().to_string()),
        created_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let details = load_details(&txn, order).await?;
    txn.commit().await?;

    tracing::info!(order_id = %details.order.id, total, "order created");
    audit::record(
        &state.pool,
        Some(user.user_id),
        "order_created",
        "orders",
        serde_json::json!({ "order_id": details.order.id, "total": total }),
    )
    .await;
    state.notifier.emit(RealtimeEvent::NewOrder(details.clone()));

    Ok(ApiResponse::success("Order created", details, Some(Meta::empty())).created())
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    list_scoped(state, Some(user.user_id), query).await
}

/// Lists orders, restricted to `owner` when given.
pub(crate) async fn list_scoped(
    state: &AppState,
    owner: Option<Uuid>,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let pagination = query.pagination();
    let mut condition = Condition::all();
    if let Some(owner) = owner {
        condition = condition.add(OrderCol::UserId.eq(owner));
    }
    if let Some(status) = query.status_filter()? {
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await?;
    let items = finder
        .limit(pagination.per_page as u64)
        .offset(pagination.offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ApiResponse::success(
        "Orders",
        OrderList { items },
        Some(Meta::for_page(pagination, total)),
    ))
}

/// Orders of other users are reported as missing, not forbidden.
pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let details = load_details(&state.orm, order).await?;
    Ok(ApiResponse::success("Order", details, Some(Meta::empty())))
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let target: OrderStatus = payload
        .status
        .trim()
        .parse()
        .map_err(|_| AppError::InvalidStatus(payload.status.clone()))?;

    let txn = state.orm.begin().await?;

    let mut condition = Condition::all().add(OrderCol::Id.eq(id));
    if !user.is_admin() {
        condition = condition.add(OrderCol::UserId.eq(user.user_id));
    }
    let order = Orders::find()
        .filter(condition)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if !user.is_admin() && target != OrderStatus::Cancelled {
        return Err(AppError::Forbidden);
    }

    let transition = apply_transition(&txn, order, target).await?;
    let details = load_details(&txn, transition.order).await?;
    txn.commit().await?;

    if transition.changed {
        tracing::info!(
            order_id = %id,
            from = %transition.from,
            to = %target,
            "order status changed"
        );
        audit::record(
            &state.pool,
            Some(user.user_id),
            "order_status_updated",
            "orders",
            serde_json::json!({
                "order_id": id,
                "from": transition.from,
                "to": target,
            }),
        )
        .await;
        state
            .notifier
            .emit(RealtimeEvent::OrderStatusUpdated(OrderStatusChange {
                id,
                status: target,
            }));
    }

    Ok(ApiResponse::success(
        "Order status updated",
        details,
        Some(Meta::empty()),
    ))
}

/// Outcome of moving a locked order to a new status.
pub(crate) struct Transition {
    pub order: OrderModel,
    pub from: OrderStatus,
    pub changed: bool,
}

/// Moves a row-locked `order` to `target` inside `txn`.
///
/// Requesting the current status is a no-op. Entering a stock-releasing
/// status puts every line's quantity back on the shelf.
pub(crate) async fn apply_transition(
    txn: &DatabaseTransaction,
    order: OrderModel,
    target: OrderStatus,
) -> AppResult<Transition> {
    let from: OrderStatus = order.status.parse().map_err(|_| {
        AppError::Internal(anyhow::anyhow!(
            "unexpected orders.status value in database: {}",
            order.status
        ))
    })?;

    if from == target {
        return Ok(Transition {
            order,
            from,
            changed: false,
        });
    }
    if !from.can_transition_to(target) {
        return Err(AppError::InvalidTransition { from, to: target });
    }

    if target.releases_stock() {
        restock(txn, order.id).await?;
    }

    let mut active: OrderActive = order.into();
    active.status = Set(target.to_string());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(txn).await?;

    Ok(Transition {
        order,
        from,
        changed: true,
    })
}

async fn restock(txn: &DatabaseTransaction, order_id: Uuid) -> AppResult<()> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .order_by_asc(OrderItemCol::ProductId)
        .all(txn)
        .await?;

    let now = Utc::now();
    for item in items {
        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(item.quantity))
            .col_expr(ProdCol::UpdatedAt, Expr::value(now))
            .filter(ProdCol::Id.eq(item.product_id))
            .exec(txn)
            .await?;
    }
    tracing::debug!(%order_id, "stock restored");
    Ok(())
}

/// Assembles an order with its lines, shipping address and payments.
pub(crate) async fn load_details<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
) -> AppResult<OrderWithItems> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::ProductId)
        .all(conn)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect();

    let shipping_address = ShippingAddresses::find()
        .filter(AddressCol::OrderId.eq(order.id))
        .one(conn)
        .await?
        .map(ShippingAddress::from);

    let payments = Payments::find()
        .filter(PayCol::OrderId.eq(order.id))
        .order_by_asc(PayCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(Payment::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(OrderWithItems {
        order: Order::try_from(order)?,
        items,
        shipping_address,
        payments,
    })
}
