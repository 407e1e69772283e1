mod support;

use std::time::Duration;

use perfume_shop_api::{
    realtime::{
        CatalogAction, OrderStatusChange, ProductChange, RealtimeEvent,
        client::{CONNECT, ConnectionState, RealtimeClient},
    },
    routes::create_app,
    status::OrderStatus,
};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

async fn recv(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel open")
}

#[tokio::test]
async fn client_receives_broadcast_events() {
    let state = support::lazy_state();
    let notifier = state.notifier.clone();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, create_app(state)).await.unwrap();
    });

    let client = RealtimeClient::new(format!("ws://{addr}/ws"));
    let (connected_tx, mut connected) = mpsc::unbounded_channel();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    client.on(CONNECT, move |_| {
        let _ = connected_tx.send(Value::Null);
    });
    let status_tx = events_tx.clone();
    client.on("orderStatusUpdated", move |data| {
        let _ = status_tx.send(data.clone());
    });
    client.on("productsUpdate", move |data| {
        let _ = events_tx.send(data.clone());
    });

    client.connect();
    recv(&mut connected).await;
    assert_eq!(client.state(), ConnectionState::Connected);

    let order_id = Uuid::new_v4();
    notifier.emit(RealtimeEvent::OrderStatusUpdated(OrderStatusChange {
        id: order_id,
        status: OrderStatus::Shipping,
    }));
    let data = recv(&mut events).await;
    assert_eq!(data["id"], order_id.to_string());
    assert_eq!(data["status"], "SHIPPING");

    client.off("orderStatusUpdated");
    notifier.emit(RealtimeEvent::OrderStatusUpdated(OrderStatusChange {
        id: order_id,
        status: OrderStatus::Completed,
    }));
    let product_id = Uuid::new_v4();
    notifier.emit(RealtimeEvent::ProductsUpdate(ProductChange {
        action: CatalogAction::Deleted,
        id: product_id,
        product: None,
    }));
    // The status handler is gone, so the next thing seen is the catalog change.
    let data = recv(&mut events).await;
    assert_eq!(data["action"], "deleted");
    assert_eq!(data["id"], product_id.to_string());

    client.disconnect();
    server.abort();
}
