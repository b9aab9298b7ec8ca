use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use wetalk_types::events::{GatewayCommand, GatewayEvent, PresenceKind};
use wetalk_types::models;

use crate::relay::{ConnId, Relay, RelayError};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one live socket. The token was validated at the HTTP upgrade, so
/// `user_id` is the authenticated identity for every command on this socket.
pub async fn handle_connection(socket: WebSocket, relay: Relay, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut outbound) = relay.register(user_id);

    info!("{} connected to live channel (socket {})", user_id, conn_id);

    let connected = GatewayEvent::Connected { socket_id: conn_id };
    if send_event(&mut sender, &connected).await.is_err() {
        relay.unregister(conn_id).await;
        return;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = outbound.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout on socket {}, dropping connection", conn_id);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_relay = relay.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(text.as_str()) {
                    Ok(cmd) => handle_command(&recv_relay, conn_id, user_id, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            user_id,
                            e,
                            text.as_str().chars().take(200).collect::<String>()
                        );
                        recv_relay.send_to(
                            conn_id,
                            GatewayEvent::Error {
                                message: format!("Malformed command: {}", e),
                            },
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    relay.unregister(conn_id).await;
    info!("{} disconnected from live channel (socket {})", user_id, conn_id);
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).map_err(axum::Error::new)?;
    sender.send(Message::Text(text.into())).await
}

/// Apply one client command. Refusals go back to this socket as `error` events.
async fn handle_command(relay: &Relay, conn_id: ConnId, user_id: Uuid, cmd: GatewayCommand) {
    let result = match cmd {
        GatewayCommand::JoinRoom { room } => relay.join(conn_id, room).await,

        GatewayCommand::LeaveRoom { room } => {
            relay.leave(conn_id, room);
            Ok(())
        }

        GatewayCommand::SendMessageToRoom {
            room_id,
            sender,
            message,
            timestamp,
        } => {
            if sender != user_id {
                Err(impersonation(sender, user_id))
            } else {
                relay
                    .publish(room_id, models::Message::new(sender, message, timestamp))
                    .await
                    .map(|delivered| debug!("Relayed to {} sockets in room {}", delivered, room_id))
            }
        }

        GatewayCommand::UserLogin { user_id: claimed } => {
            presence(relay, user_id, claimed, PresenceKind::Login).await
        }

        GatewayCommand::UserLogout { user_id: claimed } => {
            presence(relay, user_id, claimed, PresenceKind::Logout).await
        }
    };

    if let Err(e) = result {
        warn!("{} command refused on socket {}: {}", user_id, conn_id, e);
        relay.send_to(
            conn_id,
            GatewayEvent::Error {
                message: e.to_string(),
            },
        );
    }
}

async fn presence(
    relay: &Relay,
    user_id: Uuid,
    claimed: Uuid,
    kind: PresenceKind,
) -> Result<(), RelayError> {
    if claimed != user_id {
        return Err(impersonation(claimed, user_id));
    }
    relay.presence(user_id, kind).await.map(|_| ())
}

fn impersonation(claimed: Uuid, actual: Uuid) -> RelayError {
    RelayError::Impersonation { claimed, actual }
}
