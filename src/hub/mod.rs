//! The hub: single owner of all session and game state
//!
//! One task runs the event loop. Inbound client events, the snake tick and
//! the presence-broadcast flush all interleave here at event granularity,
//! so the presence set, the matchmaking queue, the match table and the
//! snake world are mutated from exactly one place and need no locks.

pub mod clients;

pub use clients::ClientRegistry;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info};
use uuid::Uuid;

use crate::games::sea::SeaPlayer;
use crate::games::snake::TICK_INTERVAL;
use crate::games::{Outbox, SeaBattle, SnakeWorld};
use crate::presence::{BroadcastThrottle, PresenceTracker};
use crate::store::results::ResultSink;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Events fed into the hub by the transport layer
#[derive(Debug)]
pub enum HubEvent {
    /// A parsed client message from a live connection
    Inbound { conn: Uuid, msg: ClientMsg },
    /// The transport saw this connection drop
    Disconnected { conn: Uuid },
}

/// Cloneable sender half for the transport layer
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubEvent>,
}

impl HubHandle {
    /// Forward a client message. Errors only if the hub task is gone.
    pub async fn send(&self, conn: Uuid, msg: ClientMsg) -> Result<(), ()> {
        self.tx
            .send(HubEvent::Inbound { conn, msg })
            .await
            .map_err(|_| ())
    }

    pub async fn disconnect(&self, conn: Uuid) {
        let _ = self.tx.send(HubEvent::Disconnected { conn }).await;
    }
}

/// Gauges the health endpoint reads without asking the hub
#[derive(Debug, Default)]
pub struct HubMetrics {
    pub online_users: AtomicUsize,
    pub snake_players: AtomicUsize,
    pub sea_matches: AtomicUsize,
    pub sea_queue: AtomicUsize,
}

/// Outbox over the live connection registry
struct RegistryOutbox<'a> {
    clients: &'a ClientRegistry,
}

impl Outbox for RegistryOutbox<'_> {
    fn send(&mut self, conn: Uuid, msg: ServerMsg) {
        self.clients.send_to(conn, msg);
    }

    fn broadcast(&mut self, msg: ServerMsg) {
        self.clients.broadcast(msg);
    }
}

pub struct Hub {
    events_rx: mpsc::Receiver<HubEvent>,
    clients: Arc<ClientRegistry>,
    presence: PresenceTracker,
    throttle: BroadcastThrottle,
    sea: SeaBattle,
    snake: SnakeWorld,
    results: ResultSink,
    metrics: Arc<HubMetrics>,
}

impl Hub {
    pub fn new(
        clients: Arc<ClientRegistry>,
        results: ResultSink,
        metrics: Arc<HubMetrics>,
    ) -> (Self, HubHandle) {
        let (tx, events_rx) = mpsc::channel(256);

        let hub = Self {
            events_rx,
            clients,
            presence: PresenceTracker::new(),
            throttle: BroadcastThrottle::default(),
            sea: SeaBattle::new(rand::random()),
            snake: SnakeWorld::new(rand::random()),
            results,
            metrics,
        };

        (hub, HubHandle { tx })
    }

    /// Run until every handle is dropped
    pub async fn run(mut self) {
        info!("hub started");

        let mut tick = interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            let flush_at = self.throttle.deadline();

            tokio::select! {
                event = self.events_rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = tick.tick() => {
                    let mut out = RegistryOutbox { clients: &self.clients };
                    self.snake.tick(&mut out, &self.results);
                    self.update_metrics();
                }
                _ = sleep_until_opt(flush_at), if flush_at.is_some() => {
                    if self.throttle.flush(Instant::now()) {
                        self.broadcast_online_list();
                    }
                }
            }
        }

        info!("hub stopped");
    }

    fn handle_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Inbound { conn, msg } => self.handle_inbound(conn, msg),
            HubEvent::Disconnected { conn } => self.handle_disconnect(conn),
        }
        self.update_metrics();
    }

    fn handle_inbound(&mut self, conn: Uuid, msg: ClientMsg) {
        match msg {
            ClientMsg::RegisterOnline { user_id } => {
                if self.presence.register(&user_id, conn) {
                    debug!(connection_id = %conn, user_id = %user_id, "presence registered");
                    self.presence_changed();
                }
            }
            ClientMsg::GetOnlineUsers => {
                self.clients.send_to(
                    conn,
                    ServerMsg::OnlineList {
                        user_ids: self.presence.online_user_ids(),
                    },
                );
            }
            ClientMsg::SnakeJoin { identity } => {
                let mut out = RegistryOutbox {
                    clients: &self.clients,
                };
                self.snake.join(conn, identity, &mut out);
            }
            ClientMsg::SnakeDir { dir } => {
                self.snake.set_direction(conn, dir);
            }
            ClientMsg::SeaFindMatch { identity } => {
                let mut out = RegistryOutbox {
                    clients: &self.clients,
                };
                self.sea.enqueue(SeaPlayer { conn, identity }, &mut out);
            }
            ClientMsg::SeaShot { match_id, cell } => {
                let mut out = RegistryOutbox {
                    clients: &self.clients,
                };
                self.sea.shoot(match_id, conn, cell, &mut out, &self.results);
            }
        }
    }

    /// Disconnect coordinator: reconcile every stateful component. The
    /// three cleanups are independent; none can abort another.
    fn handle_disconnect(&mut self, conn: Uuid) {
        if let Some(departure) = self.presence.disconnect(conn) {
            debug!(
                connection_id = %conn,
                user_id = %departure.user_id,
                went_offline = departure.went_offline,
                "presence disconnected"
            );
            self.presence_changed();
        }

        self.snake.remove(conn);

        let mut out = RegistryOutbox {
            clients: &self.clients,
        };
        self.sea.handle_disconnect(conn, &mut out);
    }

    fn presence_changed(&mut self) {
        if self.throttle.mark(Instant::now()) {
            self.broadcast_online_list();
        }
    }

    fn broadcast_online_list(&self) {
        self.clients.broadcast(ServerMsg::OnlineList {
            user_ids: self.presence.online_user_ids(),
        });
    }

    fn update_metrics(&self) {
        self.metrics
            .online_users
            .store(self.presence.online_count(), Ordering::Relaxed);
        self.metrics
            .snake_players
            .store(self.snake.player_count(), Ordering::Relaxed);
        self.metrics
            .sea_matches
            .store(self.sea.active_matches(), Ordering::Relaxed);
        self.metrics
            .sea_queue
            .store(self.sea.queue_len(), Ordering::Relaxed);
    }
}

/// Pending sleep when a flush is scheduled, forever otherwise; gated by
/// the `if` on the select arm.
async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(instant) => tokio::time::sleep_until(instant.into()).await,
        None => std::future::pending().await,
    }
}
