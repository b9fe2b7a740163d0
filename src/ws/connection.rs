//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands and forwarding the feeds of subscribed
//! events.

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};

use super::messages::{FeedPayload, WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::api::dto::SeatDto;
use crate::app_state::AppState;
use crate::domain::EventId;
use crate::error::InventoryError;
use crate::service::Notification;

type Outbound = SplitSink<WebSocket, Message>;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards snapshots and deltas of every subscribed event.
/// - Reports an interrupted feed as an `error` with code 503 and drops it;
///   the client resubscribes to start over from a snapshot.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text_message(&text, &mut subs, &state).await;
                        if !send(&mut ws_tx, &reply).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(error = %err, "ws read failed");
                        break;
                    }
                    _ => {}
                }
            }
            // Notification from a subscribed event
            Some((event_id, item)) = subs.next(), if !subs.is_empty() => {
                let msg = match item {
                    Ok(notification) => feed_message(&notification),
                    Err(err) => interrupted_message(event_id, &err),
                };
                if !send(&mut ws_tx, &msg).await {
                    break;
                }
            }
        }
    }

    tracing::debug!(subscriptions = subs.count(), "ws connection closed");
}

async fn send(ws_tx: &mut Outbound, msg: &WsMessage) -> bool {
    let Ok(json) = serde_json::to_string(msg) else {
        tracing::warn!("failed to encode ws message");
        return true;
    };
    ws_tx.send(Message::text(json)).await.is_ok()
}

fn feed_message(notification: &Notification) -> WsMessage {
    let payload = serde_json::to_value(FeedPayload::from(notification)).unwrap_or_default();
    WsMessage::event(payload)
}

fn interrupted_message(event_id: EventId, err: &InventoryError) -> WsMessage {
    tracing::warn!(%event_id, error = %err, "ws feed interrupted");
    WsMessage::new(
        uuid::Uuid::new_v4().to_string(),
        WsMessageType::Error,
        serde_json::json!({
            "code": 503,
            "event_id": event_id,
            "message": err.to_string(),
        }),
    )
}

/// Handles a text message from the client and builds the reply.
async fn handle_text_message(
    text: &str,
    subs: &mut SubscriptionManager,
    state: &AppState,
) -> WsMessage {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return WsMessage::error(String::new(), 400, "malformed JSON");
    };
    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload) else {
        return WsMessage::error(msg.id, 404, "unknown command");
    };

    match command {
        WsCommand::Subscribe { event_ids } => {
            let mut subscribed = Vec::new();
            let mut failed = Vec::new();
            for event_id in event_ids {
                match state.distributor.subscribe(event_id).await {
                    Ok(subscription) => {
                        subs.insert(event_id, subscription.into_stream());
                        subscribed.push(event_id);
                    }
                    Err(err) => {
                        tracing::debug!(%event_id, error = %err, "ws subscribe rejected");
                        failed.push(serde_json::json!({
                            "event_id": event_id,
                            "code": err.error_code(),
                            "message": err.to_string(),
                        }));
                    }
                }
            }
            WsMessage::new(
                msg.id,
                WsMessageType::Response,
                serde_json::json!({
                    "subscribed": subscribed,
                    "failed": failed,
                    "count": subs.count(),
                }),
            )
        }
        WsCommand::Unsubscribe { event_ids } => {
            let unsubscribed: Vec<EventId> =
                event_ids.into_iter().filter(|id| subs.remove(*id)).collect();
            WsMessage::new(
                msg.id,
                WsMessageType::Response,
                serde_json::json!({
                    "unsubscribed": unsubscribed,
                    "remaining_count": subs.count(),
                }),
            )
        }
        WsCommand::GetSeats { event_id } => match state.distributor.snapshot(event_id).await {
            Ok(seats) => {
                let seats: Vec<SeatDto> = seats.iter().map(|r| SeatDto::from(&r.seat)).collect();
                WsMessage::new(
                    msg.id,
                    WsMessageType::Response,
                    serde_json::json!({ "event_id": event_id, "seats": seats }),
                )
            }
            Err(err) => WsMessage::error(msg.id, err.status_code().as_u16(), err.to_string()),
        },
    }
}
