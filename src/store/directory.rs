//! User identity lookup
//!
//! The external user store owns accounts; the core only resolves display
//! data from it. Lookups are advisory: a missing directory or unknown id
//! degrades to `None`, never to an error surfaced to the client.

use serde::Deserialize;
use tracing::{debug, warn};

/// Profile as served by the user store. Fields beyond what the core
/// displays are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub username: String,
}

/// Read-only client for the user store
#[derive(Clone)]
pub struct UserDirectory {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl UserDirectory {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Look up a user profile by id
    pub async fn lookup(&self, user_id: &str) -> Option<UserProfile> {
        let base = self.base_url.as_deref()?;
        let url = format!("{}/users/{}", base.trim_end_matches('/'), user_id);

        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json().await {
                Ok(profile) => Some(profile),
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "malformed profile from user store");
                    None
                }
            },
            Ok(resp) => {
                debug!(user_id = %user_id, status = %resp.status(), "user id not known to store");
                None
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "user store lookup failed");
                None
            }
        }
    }

    /// Display name for a user id, if the store knows it
    pub async fn display_name(&self, user_id: &str) -> Option<String> {
        self.lookup(user_id).await.map(|profile| profile.username)
    }
}
