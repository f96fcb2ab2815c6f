// src/core/players/mojang.rs

//! Client for the Mojang profile service.

use crate::core::errors::McAdminError;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

const PROFILE_URL: &str = "https://api.mojang.com/users/profiles/minecraft";

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    /// Dashless UUID.
    id: String,
    #[allow(dead_code)]
    name: String,
}

#[derive(Clone)]
pub struct MojangClient {
    http: reqwest::Client,
}

impl Default for MojangClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MojangClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Resolves a player name to its dashless UUID. Returns `Ok(None)` on
    /// 404 and 429 — the tracker is best-effort and simply drops the event.
    pub async fn fetch_uuid(&self, player_name: &str) -> Result<Option<String>, McAdminError> {
        let url = format!("{PROFILE_URL}/{player_name}");
        let response = self.http.get(&url).send().await?;

        match response.status().as_u16() {
            200 => {
                let profile: ProfileResponse = response.json().await?;
                Ok(Some(profile.id))
            }
            404 => {
                warn!("Player not found in Mojang API: {player_name}");
                Ok(None)
            }
            429 => {
                warn!("Mojang API rate limited for player: {player_name}");
                Ok(None)
            }
            status => Err(McAdminError::HttpClient(format!(
                "unexpected Mojang API response {status} for player {player_name}"
            ))),
        }
    }
}
