use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::config::BroadcastScope;
use crate::state::AppState;
use crate::ws::error::SessionError;
use crate::ws::registry::{ConnectionHandle, OutboundSender};

/// Close code sent when history replay cannot be completed.
const CLOSE_INTERNAL_ERROR: u16 = 1011;
/// Close code sent when the peer stops answering pings.
const CLOSE_GOING_AWAY: u16 = 1001;

/// Run one authenticated chat session to completion.
///
/// The socket is split into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel.
///   All writes to the socket (history replay, live broadcasts, pongs) go
///   through this one channel, so frames can never interleave.
/// - This task: replays history, registers the connection, then runs the
///   blocking read loop until the peer goes away.
///
/// Lifecycle: replay → register → read ⇄ (persist → fan out) → closed.
pub async fn run_session(socket: WebSocket, state: AppState, user_id: String, chat_id: String) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    // Queue the backlog before the registry entry becomes visible to
    // broadcasters. The outbound channel is FIFO, so every live broadcast
    // lands behind the replayed history on the wire.
    if let Err(err) = replay_history(&state, &chat_id, &tx).await {
        tracing::warn!(
            user_id = %user_id,
            chat_id = %chat_id,
            error = %err,
            "History replay failed, closing session"
        );
        let _ = ws_sender
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_INTERNAL_ERROR,
                reason: "history unavailable".into(),
            })))
            .await;
        return;
    }

    state
        .registry
        .add(&user_id, ConnectionHandle::new(chat_id.clone(), tx.clone()));

    tracing::info!(user_id = %user_id, chat_id = %chat_id, "Chat session started");

    // Spawn writer task: forwards mpsc messages to the WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn keepalive task: periodic pings so dead peers (including
    // superseded connections nobody routes to anymore) get reaped instead
    // of idling forever.
    let ping_tx = tx.clone();
    let ping_every = Duration::from_secs(state.chat.ping_interval_secs);
    let pong_within = Duration::from_secs(state.chat.pong_timeout_secs);
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(ping_every);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            match timeout(pong_within, pong_rx.recv()).await {
                Ok(Some(())) => {
                    // Pong received, continue
                }
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: CLOSE_GOING_AWAY,
                        reason: "pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: each received frame is persisted and fanned out before
    // the next read, so one connection's messages stay in receipt order.
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    handle_frame(&state, &user_id, &chat_id, text.as_str()).await;
                }
                Message::Binary(_) => {
                    // The chat wire protocol is text frames only.
                    tracing::debug!(user_id = %user_id, "Ignoring binary frame");
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = %user_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                // Stream ended — client disconnected
                tracing::info!(user_id = %user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: abort writer and keepalive tasks, then drop the registry
    // entry, but only if it is still ours. A session superseded by a
    // reconnect must not evict its replacement.
    writer_handle.abort();
    ping_handle.abort();
    state.registry.remove_if_same(&user_id, &tx);

    tracing::info!(user_id = %user_id, chat_id = %chat_id, "Chat session ended");
}

/// Fetch the chat's backlog and queue it on the outbound channel, oldest
/// first. A store failure is fatal to the session: a connection that starts
/// live-only without its history would be silently degraded.
async fn replay_history(
    state: &AppState,
    chat_id: &str,
    tx: &OutboundSender,
) -> Result<(), SessionError> {
    let store = state.store.clone();
    let chat = chat_id.to_string();

    let backlog = tokio::task::spawn_blocking(move || store.messages_by_chat(&chat))
        .await
        .map_err(axum::Error::new)??;

    for message in backlog {
        if tx.send(Message::Text(message.content.into())).is_err() {
            break;
        }
    }

    Ok(())
}

/// Turn one received frame into a persisted, fanned-out message.
/// A persist failure or timeout drops the frame and keeps the session alive;
/// the sender gets no explicit NACK.
async fn handle_frame(state: &AppState, user_id: &str, chat_id: &str, text: &str) {
    let content = text.trim();
    if content.is_empty() {
        return;
    }
    if content.len() > state.chat.max_message_len {
        tracing::warn!(
            user_id = %user_id,
            len = content.len(),
            "Dropping oversized message"
        );
        return;
    }

    let store = state.store.clone();
    let chat = chat_id.to_string();
    let sender = user_id.to_string();
    let body = content.to_string();
    let persist = tokio::task::spawn_blocking(move || store.append_message(&chat, &sender, &body));

    let message = match timeout(Duration::from_secs(state.chat.persist_timeout_secs), persist).await
    {
        Ok(Ok(Ok(message))) => message,
        Ok(Ok(Err(err))) => {
            tracing::warn!(
                user_id = %user_id,
                chat_id = %chat_id,
                error = %err,
                "Failed to persist message, dropping frame"
            );
            return;
        }
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "Persist task failed, dropping frame");
            return;
        }
        Err(_) => {
            tracing::warn!(
                user_id = %user_id,
                chat_id = %chat_id,
                "Persist timed out, dropping frame"
            );
            return;
        }
    };

    match state.chat.broadcast_scope {
        BroadcastScope::Chat => state
            .registry
            .broadcast_chat(chat_id, user_id, &message.content),
        BroadcastScope::All => state.registry.broadcast_all(user_id, &message.content),
    }
}

/// Writer task: receives messages from the mpsc channel and forwards them to
/// the WebSocket sink. The sole writer to this connection.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}
