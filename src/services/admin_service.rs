use sea_orm::EntityTrait;
use uuid::Uuid;

use crate::{
    dto::orders::{OrderList, OrderWithItems},
    entity::orders::Entity as Orders,
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    services::order_service::{list_scoped, load_details},
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    list_scoped(state, None, query).await
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let details = load_details(&state.orm, order).await?;
    Ok(ApiResponse::success("Order", details, Some(Meta::empty())))
}
