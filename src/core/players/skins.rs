// src/core/players/skins.rs

//! Fetches player skins from the Mojang session server and derives avatars.

use super::crud;
use crate::core::dynamic_config::DynamicConfigManager;
use crate::core::errors::McAdminError;
use crate::core::events::{EventDispatcher, EventHandler, PlayerSkinUpdateRequested};
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SESSION_SERVER_URL: &str = "https://sessionserver.mojang.com/session/minecraft/profile";

/// The face region on the skin texture: an 8x8 square at (8, 8).
const FACE_X: u32 = 8;
const FACE_Y: u32 = 8;
const FACE_SIZE: u32 = 8;

#[derive(Debug, Deserialize)]
struct SessionProfile {
    #[serde(default)]
    properties: Vec<ProfileProperty>,
}

#[derive(Debug, Deserialize)]
struct ProfileProperty {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct TexturesBlob {
    #[serde(default)]
    textures: TexturesEntry,
}

#[derive(Debug, Deserialize, Default)]
struct TexturesEntry {
    #[serde(rename = "SKIN")]
    skin: Option<TextureUrl>,
}

#[derive(Debug, Deserialize)]
struct TextureUrl {
    url: String,
}

/// Fetches skin and avatar PNGs for a player.
pub struct SkinFetcher {
    http: reqwest::Client,
    config: Arc<DynamicConfigManager>,
}

impl SkinFetcher {
    pub fn new(config: Arc<DynamicConfigManager>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Fetches the skin PNG and a cropped avatar for a dashless UUID.
    /// `Ok(None)` covers the transient cases (404, 429, no textures); the
    /// next join triggers another attempt.
    pub async fn fetch_player_skin(
        &self,
        uuid: &str,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, McAdminError> {
        let settings = self.config.players().skin_fetcher.clone();

        // Stay under the session server's rate ceiling.
        tokio::time::sleep(Duration::from_millis(settings.rate_limit_delay_ms)).await;

        let timeout = Duration::from_secs(settings.request_timeout_seconds);
        let uuid_clean = uuid.replace('-', "");
        let url = format!("{SESSION_SERVER_URL}/{uuid_clean}");
        let response = self.http.get(&url).timeout(timeout).send().await?;

        match response.status().as_u16() {
            200 => {}
            404 => {
                warn!("Player profile not found: {uuid_clean}");
                return Ok(None);
            }
            429 => {
                warn!("Rate limited by Mojang session server");
                return Ok(None);
            }
            status => {
                return Err(McAdminError::HttpClient(format!(
                    "session server returned {status} for {uuid_clean}"
                )));
            }
        }

        let profile: SessionProfile = response.json().await?;
        let Some(textures_b64) = profile
            .properties
            .into_iter()
            .find(|p| p.name == "textures")
            .map(|p| p.value)
        else {
            warn!("No textures found for player {uuid_clean}");
            return Ok(None);
        };

        let textures_json = base64::engine::general_purpose::STANDARD
            .decode(&textures_b64)
            .map_err(|e| McAdminError::HttpClient(format!("invalid textures blob: {e}")))?;
        let textures: TexturesBlob = serde_json::from_slice(&textures_json)?;
        let Some(skin_url) = textures.textures.skin.map(|s| s.url) else {
            warn!("No skin URL found for player {uuid_clean}");
            return Ok(None);
        };

        let skin_bytes = self
            .http
            .get(&skin_url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| McAdminError::HttpClient(format!("skin download failed: {e}")))?
            .bytes()
            .await?
            .to_vec();

        let avatar_bytes = extract_avatar(&skin_bytes)?;
        Ok(Some((skin_bytes, avatar_bytes)))
    }
}

/// Crops the face region out of a skin texture and re-encodes it as PNG.
pub fn extract_avatar(skin_bytes: &[u8]) -> Result<Vec<u8>, McAdminError> {
    let skin = image::load_from_memory(skin_bytes)
        .map_err(|e| McAdminError::Internal(format!("failed to decode skin PNG: {e}")))?;
    let avatar = skin.crop_imm(FACE_X, FACE_Y, FACE_SIZE, FACE_SIZE);

    let mut out = Cursor::new(Vec::new());
    avatar
        .write_to(&mut out, image::ImageFormat::Png)
        .map_err(|e| McAdminError::Internal(format!("failed to encode avatar PNG: {e}")))?;
    Ok(out.into_inner())
}

/// Applies requested skin updates to the database.
pub struct SkinUpdater {
    pool: SqlitePool,
    fetcher: SkinFetcher,
}

impl SkinUpdater {
    pub fn new(pool: SqlitePool, fetcher: SkinFetcher) -> Arc<Self> {
        Arc::new(Self { pool, fetcher })
    }

    pub fn register(self: &Arc<Self>, dispatcher: &EventDispatcher) {
        dispatcher.on_player_skin_update_requested(self.clone());
    }
}

#[async_trait]
impl EventHandler<PlayerSkinUpdateRequested> for SkinUpdater {
    fn name(&self) -> &'static str {
        "skins.update_requested"
    }

    async fn handle(&self, event: PlayerSkinUpdateRequested) -> Result<(), McAdminError> {
        debug!("Updating skin for player {} ({})", event.player_name, event.uuid);

        // No transaction is open while the API calls run.
        match self.fetcher.fetch_player_skin(&event.uuid).await {
            Ok(Some((skin_data, avatar_data))) => {
                crud::update_player_skin(
                    &self.pool,
                    event.player_db_id,
                    &skin_data,
                    &avatar_data,
                    Utc::now(),
                )
                .await?;
                info!("Updated skin for player {}", event.player_name);
            }
            Ok(None) => {
                warn!("Failed to fetch skin for player {}", event.player_name);
            }
            Err(e) => {
                // Transient upstream failure; the next join retries.
                warn!("Error fetching skin for player {}: {e}", event.player_name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};

    #[test]
    fn extracts_face_region_as_avatar() {
        // A 64x64 skin with a recognizable pixel inside the face region.
        let mut skin = RgbaImage::new(64, 64);
        skin.put_pixel(8, 8, image::Rgba([255, 0, 0, 255]));
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(skin)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();

        let avatar_bytes = extract_avatar(&buf.into_inner()).unwrap();
        let avatar = image::load_from_memory(&avatar_bytes).unwrap().to_rgba8();
        assert_eq!(avatar.dimensions(), (8, 8));
        assert_eq!(avatar.get_pixel(0, 0), &image::Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn rejects_garbage_skin_data() {
        assert!(extract_avatar(b"not a png").is_err());
    }
}
