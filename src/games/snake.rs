//! Tick-based snake simulation
//!
//! One shared world updated on a fixed 150 ms interval. Moves are resolved
//! simultaneously: every head advances against the pre-tick bodies of all
//! players, so the outcome of a tick does not depend on iteration order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;
use uuid::Uuid;

use crate::store::results::{GameResult, ResultSink, GAME_SNAKE};
use crate::ws::protocol::{Cell, Direction, Food, PlayerIdentity, ServerMsg, SnakeView};

use super::Outbox;

/// Cells per board side
pub const BOARD_SIZE: i32 = 30;
/// World update interval
pub const TICK_INTERVAL: Duration = Duration::from_millis(150);

const START_LENGTH: usize = 3;
/// Spawns keep this many cells of clearance from the walls
const SPAWN_MARGIN: i32 = 5;
const FOOD_SCORE: u32 = 10;
/// Attempts at finding an unoccupied cell before settling for any
const PLACEMENT_ATTEMPTS: u32 = 16;

const SNAKE_COLORS: [&str; 7] = [
    "#ef4444", "#3b82f6", "#10b981", "#fbbf24", "#f472b6", "#a78bfa", "#2dd4bf",
];
const FOOD_COLORS: [&str; 4] = ["#ef4444", "#fbbf24", "#10b981", "#3b82f6"];

/// One live snake, keyed by its connection
#[derive(Debug)]
pub struct Snake {
    pub conn: Uuid,
    pub identity: PlayerIdentity,
    /// Head first
    pub body: VecDeque<Cell>,
    pub dir: Direction,
    pub score: u32,
    pub color: String,
}

impl Snake {
    fn head(&self) -> Cell {
        *self.body.front().expect("snake body is never empty")
    }

    fn view(&self) -> SnakeView {
        SnakeView {
            connection_id: self.conn,
            user_id: self.identity.id.clone(),
            username: self.identity.username.clone(),
            avatar: self.identity.avatar.clone(),
            body: self.body.iter().copied().collect(),
            dir: self.dir,
            score: self.score,
            color: self.color.clone(),
        }
    }
}

/// The shared snake world
pub struct SnakeWorld {
    players: HashMap<Uuid, Snake>,
    food: Vec<Food>,
    rng: ChaCha8Rng,
}

impl SnakeWorld {
    pub fn new(seed: u64) -> Self {
        Self {
            players: HashMap::new(),
            food: vec![Food {
                cell: Cell::new(10, 10),
                color: FOOD_COLORS[0].to_string(),
            }],
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Spawn a snake for this connection and push a world update so the
    /// joiner sees state before the next tick. A live snake on the same
    /// connection is replaced.
    pub fn join(&mut self, conn: Uuid, identity: PlayerIdentity, out: &mut impl Outbox) {
        let head = self.free_ish_cell(SPAWN_MARGIN);
        let body: VecDeque<Cell> = (0..START_LENGTH as i32)
            .map(|i| Cell::new(head.x - i, head.y))
            .collect();
        let color = SNAKE_COLORS[self.rng.gen_range(0..SNAKE_COLORS.len())].to_string();

        info!(connection_id = %conn, username = %identity.username, "snake join");
        self.players.insert(
            conn,
            Snake {
                conn,
                identity,
                body,
                dir: Direction::Right,
                score: 0,
                color,
            },
        );

        out.broadcast(self.world_update());
    }

    /// Update heading unless it reverses the current one. Applies on the
    /// next tick; unknown connections are ignored.
    pub fn set_direction(&mut self, conn: Uuid, dir: Direction) {
        if let Some(snake) = self.players.get_mut(&conn) {
            if dir != snake.dir.opposite() {
                snake.dir = dir;
            }
        }
    }

    /// Remove a snake without notification (disconnect path); absence from
    /// the next broadcast is the signal.
    pub fn remove(&mut self, conn: Uuid) -> bool {
        self.players.remove(&conn).is_some()
    }

    /// Advance the world one step: move every snake, resolve deaths against
    /// pre-tick positions, feed survivors, then broadcast if anyone lives.
    pub fn tick(&mut self, out: &mut impl Outbox, results: &ResultSink) {
        if self.players.is_empty() {
            return;
        }

        // Pre-tick occupancy. A head never re-enters its own cell after a
        // one-step move, so no per-snake exclusion is needed; tails count
        // even though they are about to vacate.
        let occupied: HashSet<Cell> = self
            .players
            .values()
            .flat_map(|snake| snake.body.iter().copied())
            .collect();

        let moves: Vec<(Uuid, Cell)> = self
            .players
            .values()
            .map(|snake| (snake.conn, snake.head().step(snake.dir)))
            .collect();

        for (conn, new_head) in &moves {
            let outside = new_head.x < 0
                || new_head.x >= BOARD_SIZE
                || new_head.y < 0
                || new_head.y >= BOARD_SIZE;
            let reason = if outside {
                Some("wall")
            } else if occupied.contains(new_head) {
                Some("collision")
            } else {
                None
            };

            if let Some(reason) = reason {
                self.kill(*conn, reason, out, results);
            }
        }

        for (conn, new_head) in moves {
            let Some(snake) = self.players.get_mut(&conn) else {
                continue; // died this tick
            };

            snake.body.push_front(new_head);
            if let Some(idx) = self.food.iter().position(|f| f.cell == new_head) {
                snake.score += FOOD_SCORE;
                self.food.swap_remove(idx);
                self.spawn_food();
            } else {
                snake.body.pop_back();
            }
        }

        if !self.players.is_empty() {
            out.broadcast(self.world_update());
        }
    }

    fn kill(&mut self, conn: Uuid, reason: &str, out: &mut impl Outbox, results: &ResultSink) {
        let Some(snake) = self.players.remove(&conn) else {
            return;
        };

        info!(
            connection_id = %conn,
            username = %snake.identity.username,
            score = snake.score,
            reason,
            "snake died"
        );
        out.send(conn, ServerMsg::SnakeDead { connection_id: conn });

        results.record(GameResult::new(
            GAME_SNAKE,
            snake.identity.id.clone(),
            vec![snake.identity.username.clone()],
            serde_json::json!({ "score": snake.score, "reason": reason }),
        ));
        out.broadcast(ServerMsg::GameOver {
            game: GAME_SNAKE.to_string(),
            winner: snake.identity.username,
        });
    }

    fn spawn_food(&mut self) {
        let cell = self.free_ish_cell(0);
        let color = FOOD_COLORS[self.rng.gen_range(0..FOOD_COLORS.len())].to_string();
        self.food.push(Food { cell, color });
    }

    /// A random cell at least `margin` from every wall, preferring ones
    /// not covered by a snake or food. Gives up after a bounded number of
    /// attempts rather than scanning the board.
    fn free_ish_cell(&mut self, margin: i32) -> Cell {
        let mut candidate = Cell::new(0, 0);
        for _ in 0..PLACEMENT_ATTEMPTS {
            candidate = Cell::new(
                self.rng.gen_range(margin..BOARD_SIZE - margin),
                self.rng.gen_range(margin..BOARD_SIZE - margin),
            );
            let taken = self
                .players
                .values()
                .any(|snake| snake.body.contains(&candidate))
                || self.food.iter().any(|f| f.cell == candidate);
            if !taken {
                break;
            }
        }
        candidate
    }

    fn world_update(&self) -> ServerMsg {
        ServerMsg::SnakeUpdate {
            players: self.players.values().map(Snake::view).collect(),
            food: self.food.clone(),
        }
    }

    #[cfg(test)]
    fn snake_mut(&mut self, conn: Uuid) -> Option<&mut Snake> {
        self.players.get_mut(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::testing::RecordingOutbox;

    fn identity(name: &str) -> PlayerIdentity {
        PlayerIdentity {
            id: format!("id-{name}"),
            username: name.to_string(),
            avatar: None,
        }
    }

    /// World with one snake placed at a known spot heading right
    fn world_with(conn: Uuid, head: Cell) -> SnakeWorld {
        let mut world = SnakeWorld::new(3);
        let mut out = RecordingOutbox::new();
        world.join(conn, identity("s1"), &mut out);
        place(&mut world, conn, head, Direction::Right);
        world
    }

    fn place(world: &mut SnakeWorld, conn: Uuid, head: Cell, dir: Direction) {
        let snake = world.snake_mut(conn).unwrap();
        snake.dir = dir;
        snake.body = (0..START_LENGTH as i32)
            .map(|i| match dir {
                Direction::Right => Cell::new(head.x - i, head.y),
                Direction::Left => Cell::new(head.x + i, head.y),
                Direction::Down => Cell::new(head.x, head.y - i),
                Direction::Up => Cell::new(head.x, head.y + i),
            })
            .collect();
    }

    fn died(out: &RecordingOutbox, conn: Uuid) -> bool {
        out.to(conn)
            .iter()
            .any(|msg| matches!(msg, ServerMsg::SnakeDead { connection_id } if *connection_id == conn))
    }

    #[test]
    fn join_spawns_three_cells_heading_right_and_broadcasts() {
        let mut world = SnakeWorld::new(1);
        let mut out = RecordingOutbox::new();
        let conn = Uuid::new_v4();
        world.join(conn, identity("s1"), &mut out);

        match out.broadcasts().first() {
            Some(ServerMsg::SnakeUpdate { players, food }) => {
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].body.len(), START_LENGTH);
                assert_eq!(players[0].dir, Direction::Right);
                assert_eq!(players[0].score, 0);
                assert_eq!(food.len(), 1);
            }
            other => panic!("expected snake_update, got {:?}", other),
        }
    }

    #[test]
    fn moves_one_cell_per_tick_at_constant_length() {
        let conn = Uuid::new_v4();
        let mut world = world_with(conn, Cell::new(10, 20));
        let mut out = RecordingOutbox::new();
        // steer the sole food item off the path
        world.food[0].cell = Cell::new(0, 0);

        world.tick(&mut out, &ResultSink::disabled());

        let snake = world.snake_mut(conn).unwrap();
        assert_eq!(snake.head(), Cell::new(11, 20));
        assert_eq!(snake.body.len(), START_LENGTH);
        assert_eq!(out.broadcasts().len(), 1);
    }

    #[test]
    fn wall_exit_kills_on_that_tick() {
        let conn = Uuid::new_v4();
        let mut world = world_with(conn, Cell::new(BOARD_SIZE - 1, 4));
        let mut out = RecordingOutbox::new();

        world.tick(&mut out, &ResultSink::disabled());

        assert!(died(&out, conn));
        assert_eq!(world.player_count(), 0);
        // nobody left, so no world broadcast followed the death
        assert!(!out
            .broadcasts()
            .iter()
            .any(|msg| matches!(msg, ServerMsg::SnakeUpdate { .. })));
    }

    #[test]
    fn collision_with_other_body_kills_only_the_mover() {
        let runner = Uuid::new_v4();
        let mut world = world_with(runner, Cell::new(10, 10));
        let mut out = RecordingOutbox::new();
        let blocker = Uuid::new_v4();
        world.join(blocker, identity("s2"), &mut out);
        // blocker's body lies across the runner's path
        place(&mut world, blocker, Cell::new(11, 9), Direction::Up);
        world.food[0].cell = Cell::new(0, 0);
        out.clear();

        world.tick(&mut out, &ResultSink::disabled());

        assert!(died(&out, runner));
        assert!(!died(&out, blocker));
        assert_eq!(world.player_count(), 1);
    }

    #[test]
    fn food_grows_snake_and_respawns() {
        let conn = Uuid::new_v4();
        let mut world = world_with(conn, Cell::new(10, 10));
        let mut out = RecordingOutbox::new();
        world.food[0].cell = Cell::new(11, 10);

        world.tick(&mut out, &ResultSink::disabled());

        let snake = world.snake_mut(conn).unwrap();
        assert_eq!(snake.score, FOOD_SCORE);
        assert_eq!(snake.body.len(), START_LENGTH + 1);
        assert_eq!(world.food.len(), 1);
        assert_ne!(world.food[0].cell, Cell::new(11, 10));
    }

    #[test]
    fn reversal_is_ignored_other_turns_apply() {
        let conn = Uuid::new_v4();
        let mut world = world_with(conn, Cell::new(10, 10));

        world.set_direction(conn, Direction::Left);
        assert_eq!(world.snake_mut(conn).unwrap().dir, Direction::Right);

        world.set_direction(conn, Direction::Up);
        assert_eq!(world.snake_mut(conn).unwrap().dir, Direction::Up);

        // unknown connection: ignored
        world.set_direction(Uuid::new_v4(), Direction::Down);
    }

    #[test]
    fn deaths_resolve_against_pre_tick_positions() {
        // chaser runs into a cell the leader vacates this same tick; the
        // pre-tick body still covers it, so the chaser dies
        let leader = Uuid::new_v4();
        let mut world = world_with(leader, Cell::new(12, 10));
        let mut out = RecordingOutbox::new();
        let chaser = Uuid::new_v4();
        world.join(chaser, identity("s2"), &mut out);
        place(&mut world, chaser, Cell::new(9, 10), Direction::Right);
        world.food[0].cell = Cell::new(0, 0);
        out.clear();

        world.tick(&mut out, &ResultSink::disabled());

        assert!(died(&out, chaser));
        assert!(!died(&out, leader));
    }

    #[test]
    fn remove_only_touches_the_given_connection() {
        let first = Uuid::new_v4();
        let mut world = world_with(first, Cell::new(10, 5));
        let mut out = RecordingOutbox::new();
        let second = Uuid::new_v4();
        world.join(second, identity("s2"), &mut out);

        assert!(!world.remove(Uuid::new_v4()));
        assert_eq!(world.player_count(), 2);
        assert!(world.remove(first));
        assert_eq!(world.player_count(), 1);
        assert!(world.snake_mut(second).is_some());
    }

    #[test]
    fn death_emits_result_with_reason_and_game_over() {
        let conn = Uuid::new_v4();
        let mut world = world_with(conn, Cell::new(BOARD_SIZE - 1, 4));
        let mut out = RecordingOutbox::new();

        // disabled sink: record is dropped, death handling unaffected
        world.tick(&mut out, &ResultSink::disabled());

        assert!(died(&out, conn));
        assert!(matches!(
            out.broadcasts().first(),
            Some(ServerMsg::GameOver { game, winner })
                if game == GAME_SNAKE && winner == "s1"
        ));
    }
}
