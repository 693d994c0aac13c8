//! Game engines and their delivery seam

pub mod sea;
pub mod snake;

pub use sea::SeaBattle;
pub use snake::SnakeWorld;

use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

/// Delivery interface the engines emit through. The hub implements this
/// over the live connection registry; swapping in a room/topic model only
/// touches the implementation, never the engines.
pub trait Outbox {
    /// Deliver to a single connection
    fn send(&mut self, conn: Uuid, msg: ServerMsg);

    /// Deliver to every live connection
    fn broadcast(&mut self, msg: ServerMsg);
}
