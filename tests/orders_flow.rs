mod support;

use perfume_shop_api::{
    dto::{orders::UpdateOrderStatusRequest, products::UpdateProductRequest},
    error::AppError,
    identity::Role,
    routes::params::OrderListQuery,
    services::{admin_service, order_service, product_service},
    status::OrderStatus,
};
use futures::future::join_all;
use uuid::Uuid;

use support::{create_perfume, create_user, order_request, setup, stock_of};

fn status(value: &str) -> UpdateOrderStatusRequest {
    UpdateOrderStatusRequest {
        status: value.into(),
    }
}

#[tokio::test]
async fn order_snapshots_price_and_reserves_stock() -> anyhow::Result<()> {
    let Some(app) = setup().await? else { return Ok(()) };
    let state = &app.state;
    let client = create_user(state, Role::Client).await?;
    let admin = create_user(state, Role::Admin).await?;
    let perfume = create_perfume(state, 2000, 5).await?;

    let created = order_service::create_order(state, &client, order_request(&[(perfume, 3)]))
        .await?
        .0
        .data
        .expect("order");
    assert_eq!(created.order.total, 6000);
    assert_eq!(created.order.status, OrderStatus::Pending);
    assert_eq!(created.items.len(), 1);
    assert_eq!(created.items[0].price, 2000);
    assert_eq!(stock_of(state, perfume).await?, 2);

    // A later price change does not touch the placed order.
    product_service::update_product(
        state,
        &admin,
        perfume,
        UpdateProductRequest {
            price: Some(9999),
            ..Default::default()
        },
    )
    .await?;
    let fetched = order_service::get_order(state, &client, created.order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(fetched.order.total, 6000);
    assert_eq!(fetched.items[0].price, 2000);

    // Only two left on the shelf.
    let err = order_service::create_order(state, &client, order_request(&[(perfume, 3)]))
        .await
        .err()
        .expect("insufficient stock");
    assert!(matches!(err, AppError::InsufficientStock { product_id } if product_id == perfume));
    assert_eq!(stock_of(state, perfume).await?, 2);
    Ok(())
}

#[tokio::test]
async fn create_then_get_round_trips() -> anyhow::Result<()> {
    let Some(app) = setup().await? else { return Ok(()) };
    let state = &app.state;
    let client = create_user(state, Role::Client).await?;
    let first = create_perfume(state, 1500, 10).await?;
    let second = create_perfume(state, 700, 10).await?;

    let created = order_service::create_order(
        state,
        &client,
        order_request(&[(first, 1), (second, 2), (first, 1)]),
    )
    .await?
    .0
    .data
    .expect("order");

    let fetched = order_service::get_order(state, &client, created.order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(fetched.order.total, 2 * 1500 + 2 * 700);
    assert_eq!(fetched.order.user_id, client.user_id);
    assert_eq!(fetched.items.len(), 2);
    let quantity_of = |id: Uuid| {
        fetched
            .items
            .iter()
            .find(|item| item.perfume_id == id)
            .map(|item| item.quantity)
    };
    assert_eq!(quantity_of(first), Some(2));
    assert_eq!(quantity_of(second), Some(2));

    let address = fetched.shipping_address.expect("shipping address");
    assert_eq!(address.order_id, created.order.id);
    assert_eq!(address.city, "Lima");
    assert!(fetched.payments.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_perfume_rolls_back_every_line() -> anyhow::Result<()> {
    let Some(app) = setup().await? else { return Ok(()) };
    let state = &app.state;
    let client = create_user(state, Role::Client).await?;
    let real = create_perfume(state, 1000, 4).await?;
    let missing = Uuid::new_v4();

    let err = order_service::create_order(state, &client, order_request(&[(real, 1), (missing, 1)]))
        .await
        .err()
        .expect("missing perfume");
    assert!(matches!(err, AppError::PerfumeNotFound(id) if id == missing));
    assert_eq!(stock_of(state, real).await?, 4);

    let listed = order_service::list_orders(state, &client, OrderListQuery::default())
        .await?
        .data
        .expect("orders");
    assert!(listed.items.is_empty());
    Ok(())
}

#[tokio::test]
async fn other_users_orders_are_not_found() -> anyhow::Result<()> {
    let Some(app) = setup().await? else { return Ok(()) };
    let state = &app.state;
    let owner = create_user(state, Role::Client).await?;
    let stranger = create_user(state, Role::Client).await?;
    let perfume = create_perfume(state, 1000, 5).await?;

    let order = order_service::create_order(state, &owner, order_request(&[(perfume, 1)]))
        .await?
        .0
        .data
        .expect("order");

    let err = order_service::get_order(state, &stranger, order.order.id)
        .await
        .err()
        .expect("hidden");
    assert!(matches!(err, AppError::NotFound));

    let err = order_service::update_order_status(state, &stranger, order.order.id, status("CANCELLED"))
        .await
        .err()
        .expect("hidden");
    assert!(matches!(err, AppError::NotFound));
    Ok(())
}

#[tokio::test]
async fn unknown_status_is_rejected_and_order_unchanged() -> anyhow::Result<()> {
    let Some(app) = setup().await? else { return Ok(()) };
    let state = &app.state;
    let admin = create_user(state, Role::Admin).await?;
    let perfume = create_perfume(state, 1000, 5).await?;
    let order = order_service::create_order(state, &admin, order_request(&[(perfume, 1)]))
        .await?
        .0
        .data
        .expect("order");

    let err = order_service::update_order_status(state, &admin, order.order.id, status("NOT_A_STATUS"))
        .await
        .err()
        .expect("invalid status");
    assert!(matches!(err, AppError::InvalidStatus(_)));

    let fetched = admin_service::get_order_admin(state, &admin, order.order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(fetched.order.status, OrderStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn admin_walks_the_lifecycle() -> anyhow::Result<()> {
    let Some(app) = setup().await? else { return Ok(()) };
    let state = &app.state;
    let client = create_user(state, Role::Client).await?;
    let admin = create_user(state, Role::Admin).await?;
    let perfume = create_perfume(state, 1000, 5).await?;
    let id = order_service::create_order(state, &client, order_request(&[(perfume, 2)]))
        .await?
        .0
        .data
        .expect("order")
        .order
        .id;

    let err = order_service::update_order_status(state, &admin, id, status("SHIPPING"))
        .await
        .err()
        .expect("pending cannot ship");
    assert!(matches!(
        err,
        AppError::InvalidTransition {
            from: OrderStatus::Pending,
            to: OrderStatus::Shipping
        }
    ));

    for next in ["PAID", "paid", "PROCESSING", "SHIPPING", "COMPLETED"] {
        let updated = order_service::update_order_status(state, &admin, id, status(next))
            .await?
            .data
            .expect("order");
        assert_eq!(updated.order.status.as_str(), next.to_uppercase());
    }

    let err = order_service::update_order_status(state, &admin, id, status("CANCELLED"))
        .await
        .err()
        .expect("completed is terminal");
    assert!(matches!(err, AppError::InvalidTransition { .. }));
    assert_eq!(stock_of(state, perfume).await?, 3);
    Ok(())
}

#[tokio::test]
async fn client_may_only_cancel_and_cancel_restocks() -> anyhow::Result<()> {
    let Some(app) = setup().await? else { return Ok(()) };
    let state = &app.state;
    let client = create_user(state, Role::Client).await?;
    let perfume = create_perfume(state, 1000, 5).await?;
    let id = order_service::create_order(state, &client, order_request(&[(perfume, 3)]))
        .await?
        .0
        .data
        .expect("order")
        .order
        .id;
    assert_eq!(stock_of(state, perfume).await?, 2);

    let err = order_service::update_order_status(state, &client, id, status("PAID"))
        .await
        .err()
        .expect("clients cannot mark paid");
    assert!(matches!(err, AppError::Forbidden));

    let cancelled = order_service::update_order_status(state, &client, id, status("CANCELLED"))
        .await?
        .data
        .expect("order");
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert_eq!(stock_of(state, perfume).await?, 5);

    // Repeating the request is a no-op and must not restock twice.
    order_service::update_order_status(state, &client, id, status("CANCELLED")).await?;
    assert_eq!(stock_of(state, perfume).await?, 5);
    Ok(())
}

#[tokio::test]
async fn admin_listing_is_role_gated_and_filters_by_status() -> anyhow::Result<()> {
    let Some(app) = setup().await? else { return Ok(()) };
    let state = &app.state;
    let client = create_user(state, Role::Client).await?;
    let admin = create_user(state, Role::Admin).await?;
    let perfume = create_perfume(state, 1000, 5).await?;
    let id = order_service::create_order(state, &client, order_request(&[(perfume, 1)]))
        .await?
        .0
        .data
        .expect("order")
        .order
        .id;
    order_service::update_order_status(state, &client, id, status("CANCELLED")).await?;

    let err = admin_service::list_all_orders(state, &client, OrderListQuery::default())
        .await
        .err()
        .expect("clients are not admins");
    assert!(matches!(err, AppError::Forbidden));

    let query = OrderListQuery {
        status: Some("cancelled".into()),
        per_page: Some(100),
        ..Default::default()
    };
    let listed = admin_service::list_all_orders(state, &admin, query)
        .await?
        .data
        .expect("orders");
    assert!(listed.items.iter().all(|o| o.status == OrderStatus::Cancelled));
    assert!(listed.items.iter().any(|o| o.id == id));
    Ok(())
}

#[tokio::test]
async fn concurrent_checkouts_never_oversell() -> anyhow::Result<()> {
    let Some(app) = setup().await? else { return Ok(()) };
    let state = &app.state;
    let perfume = create_perfume(state, 1000, 3).await?;
    let mut buyers = Vec::new();
    for _ in 0..8 {
        buyers.push(create_user(state, Role::Client).await?);
    }

    let results = join_all(buyers.iter().map(|buyer| {
        order_service::create_order(state, buyer, order_request(&[(perfume, 1)]))
    }))
    .await;

    let placed = results.iter().filter(|r| r.is_ok()).count();
    let sold_out = results
        .iter()
        .filter(|r| {
            matches!(r, Err(AppError::InsufficientStock { product_id }) if *product_id == perfume)
        })
        .count();
    assert_eq!(placed, 3);
    assert_eq!(sold_out, 5);
    assert_eq!(stock_of(state, perfume).await?, 0);
    Ok(())
}

#[tokio::test]
async fn opposite_line_order_does_not_deadlock() -> anyhow::Result<()> {
    let Some(app) = setup().await? else { return Ok(()) };
    let state = &app.state;
    let first = create_perfume(state, 1000, 50).await?;
    let second = create_perfume(state, 2500, 50).await?;
    let mut buyers = Vec::new();
    for _ in 0..8 {
        buyers.push(create_user(state, Role::Client).await?);
    }

    // Half the carts list the perfumes one way round, half the other.
    let results = join_all(buyers.iter().enumerate().map(|(i, buyer)| {
        let lines = if i % 2 == 0 {
            [(first, 1), (second, 2)]
        } else {
            [(second, 2), (first, 1)]
        };
        order_service::create_order(state, buyer, order_request(&lines))
    }))
    .await;

    for result in &results {
        assert!(result.is_ok(), "checkout failed: {:?}", result.as_ref().err());
    }
    assert_eq!(stock_of(state, first).await?, 50 - 8);
    assert_eq!(stock_of(state, second).await?, 50 - 16);
    Ok(())
}
