//! Turn-based sea-battle match engine
//!
//! Matchmaking is a plain FIFO pair-up: the two oldest queued connections
//! form a match. Each side gets a random 10-cell fleet on a 10×10 board;
//! a hit keeps the turn, a miss passes it, ten confirmed hits win.

use std::collections::{HashMap, HashSet, VecDeque};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::results::{GameResult, ResultSink, GAME_SEA_BATTLE};
use crate::util::time::unix_millis;
use crate::ws::protocol::{PlayerIdentity, SeaPlayerInfo, ServerMsg};

use super::Outbox;

/// Cells on the board (10×10, indexed 0..100)
pub const BOARD_CELLS: u32 = 100;
/// Ship cells per player; also the confirmed-hit count that wins
pub const FLEET_SIZE: usize = 10;

/// A connection waiting in the queue or seated in a match
#[derive(Debug, Clone)]
pub struct SeaPlayer {
    pub conn: Uuid,
    pub identity: PlayerIdentity,
}

impl SeaPlayer {
    fn info(&self) -> SeaPlayerInfo {
        SeaPlayerInfo {
            connection_id: self.conn,
            user_id: self.identity.id.clone(),
            username: self.identity.username.clone(),
            avatar: self.identity.avatar.clone(),
        }
    }
}

/// Explicit per-match state. Terminal phases are assigned before the match
/// leaves the table, so nothing can act on a match mid-teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchPhase {
    AwaitingShot { turn: Uuid },
    Finished { winner: Uuid },
    Abandoned,
}

/// One active match between two connections
#[derive(Debug)]
pub struct SeaMatch {
    pub id: u64,
    pub players: [SeaPlayer; 2],
    /// Ship layout per seat
    pub ships: [HashSet<u32>; 2],
    /// Every attempted shot per seat, duplicates included
    pub shots: [Vec<u32>; 2],
    pub phase: MatchPhase,
    pub started_at: u64,
}

impl SeaMatch {
    /// Seat index of a connection, if it participates
    fn seat(&self, conn: Uuid) -> Option<usize> {
        self.players.iter().position(|p| p.conn == conn)
    }

    /// Shots by `seat` that landed on the opponent's ships. Duplicate
    /// shots at a ship cell each count (known looseness, kept on purpose).
    fn confirmed_hits(&self, seat: usize) -> usize {
        let opponent_ships = &self.ships[1 - seat];
        self.shots[seat]
            .iter()
            .filter(|cell| opponent_ships.contains(cell))
            .count()
    }
}

/// Matchmaking queue plus the table of live matches
pub struct SeaBattle {
    queue: VecDeque<SeaPlayer>,
    matches: HashMap<u64, SeaMatch>,
    next_match_id: u64,
    rng: ChaCha8Rng,
}

impl SeaBattle {
    pub fn new(seed: u64) -> Self {
        Self {
            queue: VecDeque::new(),
            matches: HashMap::new(),
            next_match_id: 1,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    /// Add a connection to the queue, evicting any stale entry for the
    /// same connection first. Pairs up the two oldest entries when the
    /// queue reaches two.
    pub fn enqueue(&mut self, player: SeaPlayer, out: &mut impl Outbox) {
        self.queue.retain(|p| p.conn != player.conn);
        info!(
            connection_id = %player.conn,
            username = %player.identity.username,
            queue_len = self.queue.len() + 1,
            "sea battle queue join"
        );
        self.queue.push_back(player);

        if self.queue.len() >= 2 {
            if let (Some(first), Some(second)) = (self.queue.pop_front(), self.queue.pop_front()) {
                self.create_match(first, second, out);
            }
        }
    }

    fn create_match(&mut self, first: SeaPlayer, second: SeaPlayer, out: &mut impl Outbox) {
        let id = self.next_match_id;
        self.next_match_id += 1;

        let ships = [place_fleet(&mut self.rng), place_fleet(&mut self.rng)];
        let players_info = [first.info(), second.info()];
        let starting_turn = first.conn;

        let game = SeaMatch {
            id,
            players: [first, second],
            ships,
            shots: [Vec::new(), Vec::new()],
            phase: MatchPhase::AwaitingShot {
                turn: starting_turn,
            },
            started_at: unix_millis(),
        };

        info!(
            match_id = id,
            first = %players_info[0].username,
            second = %players_info[1].username,
            "sea battle match created"
        );

        // Each side sees only its own layout
        for seat in 0..2 {
            let mut own_ships: Vec<u32> = game.ships[seat].iter().copied().collect();
            own_ships.sort_unstable();
            out.send(
                game.players[seat].conn,
                ServerMsg::SeaStart {
                    match_id: id,
                    players: players_info.clone(),
                    starting_turn,
                    own_ships,
                },
            );
        }

        self.matches.insert(id, game);
    }

    /// Resolve a shot. Anything stale or out of turn is a silent no-op:
    /// an unknown match id, a non-participant, or a shooter who does not
    /// hold the turn reveals nothing.
    pub fn shoot(
        &mut self,
        match_id: u64,
        shooter: Uuid,
        cell: u32,
        out: &mut impl Outbox,
        results: &ResultSink,
    ) {
        let Some(game) = self.matches.get_mut(&match_id) else {
            return;
        };
        let turn = match game.phase {
            MatchPhase::AwaitingShot { turn } => turn,
            MatchPhase::Finished { .. } | MatchPhase::Abandoned => return,
        };
        if turn != shooter {
            return;
        }
        let Some(seat) = game.seat(shooter) else {
            return;
        };
        let opponent_seat = 1 - seat;

        // Duplicate and out-of-range cells are recorded as-is; membership
        // against the fleet decides hit/miss either way.
        game.shots[seat].push(cell);
        let hit = game.ships[opponent_seat].contains(&cell);

        debug!(match_id, shooter = %shooter, cell, hit, "sea battle shot");
        for player in &game.players {
            out.send(
                player.conn,
                ServerMsg::SeaShotResult {
                    shooter_id: shooter,
                    cell,
                    hit,
                },
            );
        }

        if game.confirmed_hits(seat) >= FLEET_SIZE {
            game.phase = MatchPhase::Finished { winner: shooter };
            for player in &game.players {
                out.send(player.conn, ServerMsg::SeaWin { winner: shooter });
            }

            let winner_name = game.players[seat].identity.username.clone();
            let participants: Vec<String> = game
                .players
                .iter()
                .map(|p| p.identity.username.clone())
                .collect();
            let duration_ms = unix_millis().saturating_sub(game.started_at);
            results.record(GameResult::new(
                GAME_SEA_BATTLE,
                winner_name.clone(),
                participants,
                serde_json::json!({ "score": FLEET_SIZE, "duration_ms": duration_ms }),
            ));
            out.broadcast(ServerMsg::GameOver {
                game: GAME_SEA_BATTLE.to_string(),
                winner: winner_name,
            });

            info!(match_id, winner = %shooter, "sea battle match finished");
            self.matches.remove(&match_id);
        } else if !hit {
            game.phase = MatchPhase::AwaitingShot {
                turn: game.players[opponent_seat].conn,
            };
        }
    }

    /// Drop a connection from the queue and walk over any match it was in.
    /// Walkovers write no result record.
    pub fn handle_disconnect(&mut self, conn: Uuid, out: &mut impl Outbox) {
        self.queue.retain(|p| p.conn != conn);

        let affected: Vec<u64> = self
            .matches
            .values()
            .filter(|game| game.seat(conn).is_some())
            .map(|game| game.id)
            .collect();

        for id in affected {
            if let Some(mut game) = self.matches.remove(&id) {
                game.phase = MatchPhase::Abandoned;
                if let Some(other) = game.players.iter().find(|p| p.conn != conn) {
                    out.send(other.conn, ServerMsg::SeaOpponentDisconnected);
                }
                info!(match_id = id, connection_id = %conn, "sea battle match abandoned");
            }
        }
    }

    #[cfg(test)]
    fn match_mut(&mut self, id: u64) -> Option<&mut SeaMatch> {
        self.matches.get_mut(&id)
    }
}

/// Draw a fleet of distinct random cells by rejection sampling. No shape
/// or adjacency constraints, distinctness only.
fn place_fleet(rng: &mut ChaCha8Rng) -> HashSet<u32> {
    let mut cells = HashSet::with_capacity(FLEET_SIZE);
    while cells.len() < FLEET_SIZE {
        cells.insert(rng.gen_range(0..BOARD_CELLS));
    }
    cells
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

    fn player(name: &str) -> SeaPlayer {
        SeaPlayer {
            conn: Uuid::new_v4(),
            identity: identity(name),
        }
    }

    /// Pair two players and return (engine, match id, conns in turn order)
    fn paired() -> (SeaBattle, u64, Uuid, Uuid) {
        let mut sea = SeaBattle::new(7);
        let mut out = RecordingOutbox::new();
        let (p1, p2) = (player("p1"), player("p2"));
        let (c1, c2) = (p1.conn, p2.conn);
        sea.enqueue(p1, &mut out);
        sea.enqueue(p2, &mut out);
        let id = match out.to(c1).first() {
            Some(ServerMsg::SeaStart { match_id, .. }) => *match_id,
            other => panic!("expected sea_start, got {:?}", other),
        };
        (sea, id, c1, c2)
    }

    fn turn_of(sea: &mut SeaBattle, id: u64) -> Uuid {
        match &sea.match_mut(id).unwrap().phase {
            MatchPhase::AwaitingShot { turn } => *turn,
            other => panic!("match not awaiting shot: {:?}", other),
        }
    }

    /// Replace the generated fleets with known layouts
    fn rig_ships(sea: &mut SeaBattle, id: u64, first: &[u32], second: &[u32]) {
        let game = sea.match_mut(id).unwrap();
        game.ships = [
            first.iter().copied().collect(),
            second.iter().copied().collect(),
        ];
    }

    #[test]
    fn placement_yields_ten_distinct_cells_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..50 {
            let fleet = place_fleet(&mut rng);
            assert_eq!(fleet.len(), FLEET_SIZE);
            assert!(fleet.iter().all(|&cell| cell < BOARD_CELLS));
        }
    }

    #[test]
    fn second_enqueue_pairs_immediately_with_first_turn_to_oldest() {
        let mut sea = SeaBattle::new(1);
        let mut out = RecordingOutbox::new();
        let (p1, p2) = (player("p1"), player("p2"));
        let (c1, c2) = (p1.conn, p2.conn);

        sea.enqueue(p1, &mut out);
        assert_eq!(sea.queue_len(), 1);
        assert_eq!(sea.active_matches(), 0);
        assert!(out.sent.is_empty());

        sea.enqueue(p2, &mut out);
        assert_eq!(sea.queue_len(), 0);
        assert_eq!(sea.active_matches(), 1);

        // both sides notified, oldest entry holds the turn, layouts private
        let (start1, start2) = (out.to(c1), out.to(c2));
        let (ships1, ships2) = match (start1.first(), start2.first()) {
            (
                Some(ServerMsg::SeaStart {
                    starting_turn: t1,
                    own_ships: s1,
                    players,
                    ..
                }),
                Some(ServerMsg::SeaStart {
                    starting_turn: t2,
                    own_ships: s2,
                    ..
                }),
            ) => {
                assert_eq!(*t1, c1);
                assert_eq!(*t2, c1);
                assert_eq!(players[0].connection_id, c1);
                assert_eq!(players[1].connection_id, c2);
                (s1.clone(), s2.clone())
            }
            other => panic!("expected two sea_start messages, got {:?}", other),
        };
        assert_eq!(ships1.len(), FLEET_SIZE);
        assert_eq!(ships2.len(), FLEET_SIZE);
    }

    #[test]
    fn duplicate_queue_entry_for_connection_is_evicted() {
        let mut sea = SeaBattle::new(1);
        let mut out = RecordingOutbox::new();
        let p1 = player("p1");
        sea.enqueue(p1.clone(), &mut out);
        sea.enqueue(p1, &mut out);
        // re-request replaced the stale entry instead of pairing with it
        assert_eq!(sea.queue_len(), 1);
        assert_eq!(sea.active_matches(), 0);
    }

    #[test]
    fn hit_keeps_turn_miss_passes_it() {
        let (mut sea, id, c1, c2) = paired();
        let mut out = RecordingOutbox::new();
        rig_ships(&mut sea, id, &[0, 1], &[10, 11]);
        let results = ResultSink::disabled();

        sea.shoot(id, c1, 10, &mut out, &results);
        assert_eq!(turn_of(&mut sea, id), c1);
        match out.to(c2).first() {
            Some(ServerMsg::SeaShotResult { shooter_id, cell, hit }) => {
                assert_eq!(*shooter_id, c1);
                assert_eq!(*cell, 10);
                assert!(*hit);
            }
            other => panic!("expected shot result, got {:?}", other),
        }

        out.clear();
        sea.shoot(id, c1, 5, &mut out, &results);
        assert_eq!(turn_of(&mut sea, id), c2);
        match out.to(c1).first() {
            Some(ServerMsg::SeaShotResult { hit, .. }) => assert!(!hit),
            other => panic!("expected shot result, got {:?}", other),
        }
    }

    #[test]
    fn out_of_turn_and_stale_shots_are_silent_noops() {
        let (mut sea, id, c1, c2) = paired();
        let mut out = RecordingOutbox::new();
        let results = ResultSink::disabled();

        // not c2's turn
        sea.shoot(id, c2, 0, &mut out, &results);
        assert!(out.sent.is_empty());
        assert_eq!(turn_of(&mut sea, id), c1);

        // outsider
        sea.shoot(id, Uuid::new_v4(), 0, &mut out, &results);
        assert!(out.sent.is_empty());

        // unknown match
        sea.shoot(id + 100, c1, 0, &mut out, &results);
        assert!(out.sent.is_empty());
    }

    #[test]
    fn win_at_ten_confirmed_hits_removes_match() {
        let (mut sea, id, c1, c2) = paired();
        let mut out = RecordingOutbox::new();
        let ships: Vec<u32> = (20..30).collect();
        rig_ships(&mut sea, id, &[0, 1], &ships);
        let results = ResultSink::disabled();

        for cell in 20..30 {
            sea.shoot(id, c1, cell, &mut out, &results);
        }

        let wins: Vec<_> = out
            .to(c2)
            .into_iter()
            .filter(|msg| matches!(msg, ServerMsg::SeaWin { winner } if *winner == c1))
            .collect();
        assert_eq!(wins.len(), 1);
        assert!(matches!(
            out.broadcasts().first(),
            Some(ServerMsg::GameOver { game, winner })
                if game == GAME_SEA_BATTLE && winner == "p1"
        ));
        assert_eq!(sea.active_matches(), 0);

        // further shots on the dead match go nowhere
        out.clear();
        sea.shoot(id, c1, 0, &mut out, &results);
        assert!(out.sent.is_empty());
    }

    #[test]
    fn duplicate_confirmed_hits_count_toward_the_win() {
        let (mut sea, id, c1, _c2) = paired();
        let mut out = RecordingOutbox::new();
        rig_ships(&mut sea, id, &[0, 1], &[50, 51]);
        let results = ResultSink::disabled();

        // ten shots at the same ship cell: each is recorded and confirmed
        for _ in 0..FLEET_SIZE {
            sea.shoot(id, c1, 50, &mut out, &results);
        }
        assert_eq!(sea.active_matches(), 0);
        assert!(out
            .sent
            .iter()
            .any(|(_, msg)| matches!(msg, ServerMsg::SeaWin { winner } if *winner == c1)));
    }

    #[test]
    fn disconnect_walks_over_match_and_clears_queue() {
        let (mut sea, _id, c1, c2) = paired();
        let mut out = RecordingOutbox::new();
        let waiting = player("p3");
        sea.enqueue(waiting.clone(), &mut out);

        sea.handle_disconnect(c1, &mut out);
        assert_eq!(sea.active_matches(), 0);
        assert!(matches!(
            out.to(c2).first(),
            Some(ServerMsg::SeaOpponentDisconnected)
        ));

        // queued third player untouched by the match teardown
        assert_eq!(sea.queue_len(), 1);
        sea.handle_disconnect(waiting.conn, &mut out);
        assert_eq!(sea.queue_len(), 0);
    }
}
