//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Heading of a snake on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// The direct reverse of this heading
    pub fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// Grid delta for one step along this heading
    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }
}

/// One grid cell on the snake board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn step(self, dir: Direction) -> Self {
        let (dx, dy) = dir.delta();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Logical user identity as supplied by the chat client.
/// The core never owns authentication; this is display data keyed by the
/// external user store's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Bind this connection to a logical user for presence tracking
    RegisterOnline { user_id: String },

    /// Request the current online list on demand (direct reply, unthrottled)
    GetOnlineUsers,

    /// Join the snake world
    SnakeJoin { identity: PlayerIdentity },

    /// Change snake heading; reversals are ignored server-side
    SnakeDir { dir: Direction },

    /// Enter the sea-battle matchmaking queue
    SeaFindMatch { identity: PlayerIdentity },

    /// Fire at a cell of the opponent's board
    SeaShot { match_id: u64, cell: u32 },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// First message after upgrade; game events are keyed by connection id,
    /// so the client has to learn its own
    Welcome {
        connection_id: Uuid,
        server_time: u64,
    },

    /// User ids with at least one live connection
    OnlineList { user_ids: Vec<String> },

    /// Full snake world state (broadcast every tick while anyone is alive)
    SnakeUpdate {
        players: Vec<SnakeView>,
        food: Vec<Food>,
    },

    /// Sent to a connection whose snake just died
    SnakeDead { connection_id: Uuid },

    /// Match paired; each participant receives only their own layout
    SeaStart {
        match_id: u64,
        players: [SeaPlayerInfo; 2],
        starting_turn: Uuid,
        own_ships: Vec<u32>,
    },

    /// Result of a shot, sent to both participants
    SeaShotResult {
        shooter_id: Uuid,
        cell: u32,
        hit: bool,
    },

    /// Match decided, sent to both participants
    SeaWin { winner: Uuid },

    /// The other participant's connection dropped mid-match
    SeaOpponentDisconnected,

    /// Global notice that a game finished and its result was recorded
    GameOver { game: String, winner: String },
}

/// Public participant info for a sea-battle match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeaPlayerInfo {
    pub connection_id: Uuid,
    pub user_id: String,
    pub username: String,
    pub avatar: Option<String>,
}

/// Snake state in a world update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnakeView {
    pub connection_id: Uuid,
    pub user_id: String,
    pub username: String,
    pub avatar: Option<String>,
    /// Body cells, head first
    pub body: Vec<Cell>,
    pub dir: Direction,
    pub score: u32,
    pub color: String,
}

/// A food item on the snake board
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Food {
    pub cell: Cell,
    pub color: String,
}
