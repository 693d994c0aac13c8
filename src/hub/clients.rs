//! Live connection registry
//!
//! Maps connection ids to their outbound channels. The WebSocket handler
//! registers on upgrade and unregisters on close; the hub routes through
//! it. Sends to a connection that raced away are silently dropped.

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<Uuid, mpsc::UnboundedSender<ServerMsg>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, returning the receiving half its writer
    /// task drains.
    pub fn register(&self, conn: Uuid) -> mpsc::UnboundedReceiver<ServerMsg> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.insert(conn, tx);
        rx
    }

    pub fn unregister(&self, conn: Uuid) {
        self.clients.remove(&conn);
    }

    pub fn send_to(&self, conn: Uuid, msg: ServerMsg) {
        if let Some(tx) = self.clients.get(&conn) {
            let _ = tx.send(msg);
        }
    }

    pub fn broadcast(&self, msg: ServerMsg) {
        for entry in self.clients.iter() {
            let _ = entry.value().send(msg.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_connection_receives_direct_and_broadcast() {
        let registry = ClientRegistry::new();
        let conn = Uuid::new_v4();
        let mut rx = registry.register(conn);

        registry.send_to(conn, ServerMsg::SeaOpponentDisconnected);
        registry.broadcast(ServerMsg::OnlineList { user_ids: vec![] });

        assert!(matches!(
            rx.try_recv(),
            Ok(ServerMsg::SeaOpponentDisconnected)
        ));
        assert!(matches!(rx.try_recv(), Ok(ServerMsg::OnlineList { .. })));
    }

    #[test]
    fn sends_to_unknown_or_unregistered_connections_are_dropped() {
        let registry = ClientRegistry::new();
        let conn = Uuid::new_v4();
        let _rx = registry.register(conn);
        registry.unregister(conn);

        registry.send_to(conn, ServerMsg::SeaOpponentDisconnected);
        registry.send_to(Uuid::new_v4(), ServerMsg::SeaOpponentDisconnected);
        assert_eq!(registry.len(), 0);
    }
}
