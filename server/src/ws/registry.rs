//! Connection registry: the process-wide directory of live WebSocket
//! connections, one entry per authenticated user.
//!
//! The registry is an explicitly constructed handle that is dependency-
//! injected through `AppState`, never a package-level singleton. Internally
//! it is a sharded concurrent map; per-peer broadcast writes are non-blocking
//! channel sends, so holding a shard lock during fan-out cannot stall
//! concurrent add/remove/get calls.

use axum::extract::ws::Message;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Sender half of a connection's outbound channel. The channel is drained by
/// exactly one writer task per connection, which is the only code that ever
/// touches the socket sink — broadcasters and the session itself all enqueue
/// here instead of writing to the socket.
pub type OutboundSender = mpsc::UnboundedSender<Message>;

/// Registry entry: the chat a connection was opened for, plus its outbound
/// sender. Cloning is cheap; the underlying channel is shared.
#[derive(Clone)]
pub struct ConnectionHandle {
    chat_id: String,
    tx: OutboundSender,
}

impl ConnectionHandle {
    pub fn new(chat_id: impl Into<String>, tx: OutboundSender) -> Self {
        Self {
            chat_id: chat_id.into(),
            tx,
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Enqueue a message for this connection. Fails only when the writer
    /// task is gone, i.e. the connection is already dead.
    pub fn send(&self, msg: Message) -> Result<(), mpsc::error::SendError<Message>> {
        self.tx.send(msg)
    }

    fn is_same_channel(&self, tx: &OutboundSender) -> bool {
        self.tx.same_channel(tx)
    }
}

/// Directory of active connections keyed by user id. At most one entry per
/// user: a reconnect replaces the previous entry without closing it (the
/// superseded session keeps running until its own keepalive or read loop
/// notices the peer is gone).
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<DashMap<String, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for a user. Never fails; a superseded
    /// handle becomes unreachable through the registry but is not closed.
    pub fn add(&self, user_id: &str, handle: ConnectionHandle) {
        self.inner.insert(user_id.to_string(), handle);
        tracing::debug!(
            user_id = %user_id,
            connections = self.inner.len(),
            "Connection registered"
        );
    }

    /// Delete the entry for a user if present; no-op otherwise.
    pub fn remove(&self, user_id: &str) {
        if self.inner.remove(user_id).is_some() {
            tracing::debug!(user_id = %user_id, "Connection unregistered");
        }
    }

    /// Delete the entry only if it still belongs to the given outbound
    /// channel. A superseded session calling this on teardown cannot evict
    /// the connection that replaced it.
    pub fn remove_if_same(&self, user_id: &str, tx: &OutboundSender) {
        if self
            .inner
            .remove_if(user_id, |_, handle| handle.is_same_channel(tx))
            .is_some()
        {
            tracing::debug!(user_id = %user_id, "Connection unregistered");
        }
    }

    /// Read-only lookup of a user's live connection.
    pub fn get(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.inner.get(user_id).map(|entry| entry.value().clone())
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Deliver a text payload to every registered connection except the
    /// sender's. Best-effort and independent per peer: a failed send is
    /// logged and does not abort delivery to the remaining peers.
    pub fn broadcast_all(&self, exclude_user: &str, payload: &str) {
        let msg = Message::Text(payload.to_string().into());
        for entry in self.inner.iter() {
            if entry.key() == exclude_user {
                continue;
            }
            if entry.value().send(msg.clone()).is_err() {
                tracing::warn!(
                    user_id = %entry.key(),
                    "Broadcast send failed, peer connection is closed"
                );
            }
        }
    }

    /// Same delivery policy as [`broadcast_all`](Self::broadcast_all), but
    /// restricted to connections bound to the given chat. Only the chat id
    /// captured at handshake is consulted — membership is never inspected.
    pub fn broadcast_chat(&self, chat_id: &str, exclude_user: &str, payload: &str) {
        let msg = Message::Text(payload.to_string().into());
        for entry in self.inner.iter() {
            if entry.key() == exclude_user || entry.value().chat_id() != chat_id {
                continue;
            }
            if entry.value().send(msg.clone()).is_err() {
                tracing::warn!(
                    user_id = %entry.key(),
                    chat_id = %chat_id,
                    "Broadcast send failed, peer connection is closed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};

    fn connection(chat_id: &str) -> (ConnectionHandle, UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(chat_id, tx), rx)
    }

    fn recv_text(rx: &mut UnboundedReceiver<Message>) -> String {
        match rx.try_recv().expect("expected a queued message") {
            Message::Text(text) => text.as_str().to_string(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn add_then_get_returns_the_handle() {
        let registry = ConnectionRegistry::new();
        let (handle, mut rx) = connection("c1");

        registry.add("alice", handle);
        let found = registry.get("alice").expect("alice is registered");
        found.send(Message::Text("hi".to_string().into())).unwrap();

        assert_eq!(recv_text(&mut rx), "hi");
        assert!(registry.get("bob").is_none());
    }

    #[test]
    fn remove_deletes_and_is_noop_when_absent() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = connection("c1");

        registry.add("alice", handle);
        registry.remove("alice");
        registry.remove("alice");

        assert!(registry.get("alice").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn add_replaces_without_closing_the_old_connection() {
        let registry = ConnectionRegistry::new();
        let (first, mut first_rx) = connection("c1");
        let (second, mut second_rx) = connection("c1");

        registry.add("alice", first.clone());
        registry.add("alice", second);

        // Lookups route to the replacement.
        registry
            .get("alice")
            .unwrap()
            .send(Message::Text("new".to_string().into()))
            .unwrap();
        assert_eq!(recv_text(&mut second_rx), "new");
        assert!(matches!(first_rx.try_recv(), Err(TryRecvError::Empty)));

        // The superseded handle is unreachable but still open.
        first.send(Message::Text("late".to_string().into())).unwrap();
        assert_eq!(recv_text(&mut first_rx), "late");
    }

    #[test]
    fn superseded_teardown_does_not_evict_replacement() {
        let registry = ConnectionRegistry::new();
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let (second, mut second_rx) = connection("c1");

        registry.add("alice", ConnectionHandle::new("c1", old_tx.clone()));
        registry.add("alice", second);

        // The old session tears down with its own channel: no effect.
        registry.remove_if_same("alice", &old_tx);
        assert!(registry.get("alice").is_some());

        registry
            .get("alice")
            .unwrap()
            .send(Message::Text("still here".to_string().into()))
            .unwrap();
        assert_eq!(recv_text(&mut second_rx), "still here");
    }

    #[test]
    fn broadcast_all_excludes_the_sender() {
        let registry = ConnectionRegistry::new();
        let (a, mut a_rx) = connection("c1");
        let (b, mut b_rx) = connection("c1");
        let (c, mut c_rx) = connection("c2");

        registry.add("alice", a);
        registry.add("bob", b);
        registry.add("carol", c);

        registry.broadcast_all("alice", "hello");

        assert!(matches!(a_rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(recv_text(&mut b_rx), "hello");
        assert_eq!(recv_text(&mut c_rx), "hello");
    }

    #[test]
    fn broadcast_chat_filters_by_bound_chat() {
        let registry = ConnectionRegistry::new();
        let (a, mut a_rx) = connection("c1");
        let (b, mut b_rx) = connection("c1");
        let (c, mut c_rx) = connection("c2");

        registry.add("alice", a);
        registry.add("bob", b);
        registry.add("carol", c);

        registry.broadcast_chat("c1", "alice", "hello");

        assert!(matches!(a_rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(recv_text(&mut b_rx), "hello");
        assert!(matches!(c_rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn one_dead_peer_does_not_block_the_rest() {
        let registry = ConnectionRegistry::new();
        let (a, _a_rx) = connection("c1");
        let (b, b_rx) = connection("c1");
        let (c, mut c_rx) = connection("c1");

        registry.add("alice", a);
        registry.add("bob", b);
        registry.add("carol", c);

        // Bob's writer task is gone.
        drop(b_rx);

        registry.broadcast_all("alice", "hello");
        assert_eq!(recv_text(&mut c_rx), "hello");
    }
}
