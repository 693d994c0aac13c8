//! Game-result persistence sink
//!
//! Results go to an external HTTP collaborator. Writes are fire-and-forget:
//! a failed write is logged and the in-memory game state is already final
//! by the time the record is emitted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

pub const GAME_SEA_BATTLE: &str = "sea_battle";
pub const GAME_SNAKE: &str = "snake";

/// One finished game
#[derive(Debug, Clone, Serialize)]
pub struct GameResult {
    pub game: String,
    pub winner: String,
    pub participants: Vec<String>,
    pub details: serde_json::Value,
    pub finished_at: DateTime<Utc>,
}

impl GameResult {
    pub fn new(
        game: &str,
        winner: impl Into<String>,
        participants: Vec<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            game: game.to_string(),
            winner: winner.into(),
            participants,
            details,
            finished_at: Utc::now(),
        }
    }
}

/// Sink for finished-game records
#[derive(Clone)]
pub struct ResultSink {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl ResultSink {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    /// Sink that drops every record
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Record a finished game. Never blocks the caller and never fails it.
    pub fn record(&self, result: GameResult) {
        debug!(game = %result.game, winner = %result.winner, "game finished");

        let Some(endpoint) = self.endpoint.clone() else {
            debug!(game = %result.game, "result sink unconfigured, dropping record");
            return;
        };

        let client = self.client.clone();
        tokio::spawn(async move {
            match client.post(&endpoint).json(&result).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(game = %result.game, "game result persisted");
                }
                Ok(resp) => {
                    warn!(
                        game = %result.game,
                        status = %resp.status(),
                        "result sink rejected record"
                    );
                }
                Err(e) => {
                    warn!(game = %result.game, error = %e, "failed to persist game result");
                }
            }
        });
    }
}
