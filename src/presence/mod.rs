//! Presence tracking: logical users mapped to their live connections
//!
//! A user may hold any number of simultaneous connections (browser tabs).
//! Online status is derived: a user is online iff at least one connection
//! is registered and not yet disconnected. Broadcasts of the online list
//! are throttled through [`BroadcastThrottle`].

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use uuid::Uuid;

/// How often the online list may be broadcast at most
pub const BROADCAST_WINDOW: Duration = Duration::from_secs(2);

/// Result of removing a connection from the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub user_id: String,
    /// True if this was the user's last connection
    pub went_offline: bool,
}

/// User identity ↔ connection set mapping
#[derive(Debug, Default)]
pub struct PresenceTracker {
    /// connection → owning user. A connection is bound at most once.
    connections: HashMap<Uuid, String>,
    /// user → live connections. Entries are removed with their last
    /// connection; an empty set is never observable.
    online: HashMap<String, HashSet<Uuid>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to a user. Idempotent for the same pair; a
    /// connection already owned by another user is left untouched
    /// (returns false).
    pub fn register(&mut self, user_id: &str, conn: Uuid) -> bool {
        match self.connections.get(&conn) {
            Some(owner) if owner != user_id => false,
            _ => {
                self.connections.insert(conn, user_id.to_string());
                self.online
                    .entry(user_id.to_string())
                    .or_default()
                    .insert(conn);
                true
            }
        }
    }

    /// Remove a connection from whichever user owns it, dropping the user
    /// entry entirely when the last connection goes.
    pub fn disconnect(&mut self, conn: Uuid) -> Option<Departure> {
        let user_id = self.connections.remove(&conn)?;
        let went_offline = match self.online.get_mut(&user_id) {
            Some(conns) => {
                conns.remove(&conn);
                if conns.is_empty() {
                    self.online.remove(&user_id);
                    true
                } else {
                    false
                }
            }
            None => false,
        };
        Some(Departure {
            user_id,
            went_offline,
        })
    }

    /// Current set of online user ids
    pub fn online_user_ids(&self) -> Vec<String> {
        self.online.keys().cloned().collect()
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }
}

/// Coalesces presence-changed notifications so at most one broadcast goes
/// out per window. A change inside a closed window schedules a trailing
/// flush; the caller reads state at emission time, so the flushed list is
/// never stale.
#[derive(Debug)]
pub struct BroadcastThrottle {
    window: Duration,
    last_emit: Option<Instant>,
    pending: bool,
}

impl BroadcastThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emit: None,
            pending: false,
        }
    }

    /// Note a state change. Returns true if the caller should emit now;
    /// otherwise the change is held until [`deadline`](Self::deadline).
    pub fn mark(&mut self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.window => {
                self.pending = true;
                false
            }
            _ => {
                self.last_emit = Some(now);
                self.pending = false;
                true
            }
        }
    }

    /// When the pending flush is due, if any
    pub fn deadline(&self) -> Option<Instant> {
        if self.pending {
            self.last_emit.map(|t| t + self.window)
        } else {
            None
        }
    }

    /// Returns true if a held change is due and the caller should emit.
    pub fn flush(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(due) if now >= due => {
                self.last_emit = Some(now);
                self.pending = false;
                true
            }
            _ => false,
        }
    }
}

impl Default for BroadcastThrottle {
    fn default() -> Self {
        Self::new(BROADCAST_WINDOW)
    }
}
