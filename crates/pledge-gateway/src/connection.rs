use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use uuid::Uuid;

use pledge_db::Database;
use pledge_types::events::{GatewayCommand, GatewayEvent};

use crate::chat::{self, Author};
use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// User a socket was opened for, resolved at the HTTP upgrade.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub id: Uuid,
    pub name: String,
}

/// Drive one WebSocket session until either side goes away.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user: Option<SessionUser>,
) {
    let session_id = Uuid::new_v4();
    let (mut sender, receiver) = socket.split();

    // Subscribe before announcing so nothing broadcast after `connect` is missed
    let broadcast_rx = dispatcher.subscribe();
    let connected = dispatcher.session_opened();
    let label = user.as_ref().map_or("anonymous", |u| u.name.as_str()).to_string();
    info!("connect: session {} ({}), {} connected", session_id, label, connected);

    let hello = GatewayEvent::Connect {
        session_id,
        user: user.as_ref().map(|u| u.name.clone()),
    };
    if send_event(&mut sender, &hello).await {
        run_connection_loop(sender, receiver, broadcast_rx, &dispatcher, db, user, session_id).await;
    }

    let remaining = dispatcher.session_closed();
    info!("disconnect: session {} ({}), {} connected", session_id, label, remaining);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut broadcast_rx: tokio::sync::broadcast::Receiver<Arc<str>>,
    dispatcher: &Dispatcher,
    db: Arc<Database>,
    user: Option<SessionUser>,
    session_id: Uuid,
) {
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward broadcasts -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let json = match result {
                        Ok(json) => json,
                        Err(RecvError::Lagged(n)) => {
                            warn!("Session {} lagged, skipped {} events", session_id, n);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };

                    if sender.send(Message::Text(json.as_ref().into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Session {} missed {} pongs, dropping", session_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let dispatcher_recv = dispatcher.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&dispatcher_recv, &db, user.as_ref(), cmd).await;
                    }
                    Err(e) => {
                        warn!(
                            "Session {} bad command: {} -- raw: {}",
                            session_id,
                            e,
                            text.chars().take(200).collect::<String>()
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

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    user: Option<&SessionUser>,
    cmd: GatewayCommand,
) {
    match cmd {
        GatewayCommand::SendMessage { text, sender } => {
            let author = match user {
                Some(u) => Author::User {
                    id: u.id,
                    name: u.name.clone(),
                },
                None => Author::Anonymous { label: sender },
            };

            // Failures are logged and the message dropped; the sender is not told
            match chat::publish(db, dispatcher, text, author).await {
                Ok(Some(_)) => {}
                Ok(None) => warn!("Ignoring empty chat message"),
                Err(e) => error!("Error inserting chat message: {:#}", e),
            }
        }
    }
}

/// Serialise and send one event. Returns `false` if the socket is gone.
async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialise gateway event: {}", e);
            return false;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
