use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

use super::Notifier;

#[utoipa::path(
    get,
    path = "/ws",
    responses(
        (status = 101, description = "Switching to the realtime event stream"),
    ),
    tag = "Realtime"
)]
pub async fn ws_handler(ws: WebSocketUpgrade, State(notifier): State<Notifier>) -> Response {
    let events = notifier.subscribe();
    ws.on_upgrade(move |socket| client_session(socket, events))
}

/// Forwards broadcast frames to one client until either side goes away.
/// Inbound messages are ignored apart from close frames.
async fn client_session(socket: WebSocket, mut events: broadcast::Receiver<String>) {
    let (mut sender, mut receiver) = socket.split();
    tracing::debug!("realtime client connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(frame) => {
                    if sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "realtime client lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(error = %err, "realtime socket error");
                    break;
                }
            },
        }
    }

    tracing::debug!("realtime client disconnected");
}
