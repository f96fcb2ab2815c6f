// src/core/instance/compose.rs

//! Compose file parsing.
//!
//! [`ComposeFile`] is a round-trip wrapper over the raw YAML document: fields
//! we do not understand pass through untouched when the file is written back.
//! [`McCompose`] is the validated Minecraft view extracted from it; once it
//! constructs successfully, every required field is present and typed.

use crate::core::errors::McAdminError;
use serde_yaml::Value;
use std::str::FromStr;
use strum_macros::{Display, EnumString};

/// The compose service every managed server must define.
pub const MC_SERVICE: &str = "mc";
/// Container port the game listens on inside the container.
const CONTAINER_GAME_PORT: u16 = 25565;
/// Container port RCON listens on inside the container.
const CONTAINER_RCON_PORT: u16 = 25575;

/// Server flavor, derived from the `TYPE` environment entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum ServerType {
    Vanilla,
    Paper,
    Spigot,
    Bukkit,
    Fabric,
    Forge,
    Neoforge,
    Custom,
    Unknown,
}

/// A parsed compose document that can be re-serialized without losing
/// anything the parser did not understand.
#[derive(Debug, Clone)]
pub struct ComposeFile {
    doc: Value,
}

impl ComposeFile {
    pub fn parse(yaml: &str) -> Result<Self, McAdminError> {
        let doc: Value = serde_yaml::from_str(yaml)?;
        if !doc.is_mapping() {
            return Err(McAdminError::InvalidCompose(
                "compose document must be a mapping".to_string(),
            ));
        }
        let file = Self { doc };
        if file.service(MC_SERVICE).is_none() {
            return Err(McAdminError::InvalidCompose(format!(
                "compose file must define a '{MC_SERVICE}' service"
            )));
        }
        Ok(file)
    }

    pub fn to_yaml(&self) -> Result<String, McAdminError> {
        Ok(serde_yaml::to_string(&self.doc)?)
    }

    fn service(&self, name: &str) -> Option<&Value> {
        self.doc.get("services")?.get(name)
    }

    fn mc_service(&self) -> &Value {
        // Presence is checked in `parse`.
        self.service(MC_SERVICE).unwrap_or(&Value::Null)
    }

    /// The declared `container_name` of the mc service.
    pub fn container_name(&self) -> Result<&str, McAdminError> {
        self.mc_service()
            .get("container_name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                McAdminError::InvalidCompose("missing container_name on mc service".to_string())
            })
    }

    /// The image reference of the mc service.
    pub fn image(&self) -> Result<&str, McAdminError> {
        self.mc_service()
            .get("image")
            .and_then(Value::as_str)
            .ok_or_else(|| McAdminError::InvalidCompose("missing image on mc service".to_string()))
    }

    /// Looks up an environment entry, supporting both the mapping and the
    /// `KEY=VALUE` list forms.
    pub fn environment(&self, key: &str) -> Option<String> {
        let env = self.mc_service().get("environment")?;
        match env {
            Value::Mapping(map) => map
                .get(Value::String(key.to_string()))
                .map(value_to_string),
            Value::Sequence(entries) => entries.iter().find_map(|entry| {
                let entry = entry.as_str()?;
                let (k, v) = entry.split_once('=')?;
                (k.trim() == key).then(|| v.trim().to_string())
            }),
            _ => None,
        }
    }

    /// Host ports published for the given container port, in declaration
    /// order. Supports the short string syntax and the long mapping syntax.
    pub fn published_port(&self, container_port: u16) -> Option<u16> {
        let ports = self.mc_service().get("ports")?.as_sequence()?;
        for entry in ports {
            match entry {
                Value::String(spec) => {
                    if let Some((host, target)) = parse_short_port(spec)
                        && target == container_port
                    {
                        return Some(host);
                    }
                }
                Value::Mapping(_) => {
                    let target = entry.get("target").and_then(Value::as_u64)? as u16;
                    if target == container_port {
                        let published = entry.get("published")?;
                        let published = match published {
                            Value::Number(n) => n.as_u64()? as u16,
                            Value::String(s) => s.parse().ok()?,
                            _ => return None,
                        };
                        return Some(published);
                    }
                }
                _ => continue,
            }
        }
        None
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
    }
}

/// Parses `[host_ip:]host:container[/protocol]` into `(host, container)`.
fn parse_short_port(spec: &str) -> Option<(u16, u16)> {
    let spec = spec.split('/').next()?;
    let parts: Vec<&str> = spec.split(':').collect();
    let (host, container) = match parts.as_slice() {
        [host, container] => (host, container),
        [_ip, host, container] => (host, container),
        _ => return None,
    };
    Some((host.parse().ok()?, container.parse().ok()?))
}

/// The validated Minecraft view over a compose file.
#[derive(Debug, Clone)]
pub struct McCompose {
    file: ComposeFile,
    server_name: String,
    java_version: u32,
    server_type: ServerType,
    game_version: String,
    max_memory_bytes: u64,
    game_port: u16,
    rcon_port: u16,
}

impl McCompose {
    pub fn new(file: ComposeFile) -> Result<Self, McAdminError> {
        let container_name = file.container_name()?.to_string();
        let server_name = container_name
            .strip_prefix("mc-")
            .ok_or_else(|| {
                McAdminError::InvalidCompose(format!(
                    "container_name must be mc-<server>, got '{container_name}'"
                ))
            })?
            .to_string();
        if server_name.is_empty() {
            return Err(McAdminError::InvalidCompose(
                "container_name must name a server after the mc- prefix".to_string(),
            ));
        }

        let java_version = parse_java_version(file.image()?);

        let max_memory_bytes = file
            .environment("MEMORY")
            .or_else(|| file.environment("MAX_MEMORY"))
            .ok_or_else(|| {
                McAdminError::InvalidCompose("missing MEMORY environment entry".to_string())
            })
            .and_then(|raw| parse_memory_bytes(&raw))?;

        let server_type = file
            .environment("TYPE")
            .map(|t| ServerType::from_str(&t).unwrap_or(ServerType::Custom))
            .unwrap_or(ServerType::Vanilla);

        let game_version = file.environment("VERSION").unwrap_or_else(|| "latest".to_string());

        let game_port = file.published_port(CONTAINER_GAME_PORT).ok_or_else(|| {
            McAdminError::InvalidCompose(format!(
                "no published port for game port {CONTAINER_GAME_PORT}"
            ))
        })?;
        let rcon_port = file.published_port(CONTAINER_RCON_PORT).ok_or_else(|| {
            McAdminError::InvalidCompose(format!(
                "no published port for RCON port {CONTAINER_RCON_PORT}"
            ))
        })?;

        if game_port == rcon_port {
            return Err(McAdminError::InvalidCompose(format!(
                "game port and RCON port must differ, both are {game_port}"
            )));
        }
        if game_port == 0 || rcon_port == 0 {
            return Err(McAdminError::InvalidCompose(
                "ports must be in 1-65535".to_string(),
            ));
        }

        Ok(Self {
            file,
            server_name,
            java_version,
            server_type,
            game_version,
            max_memory_bytes,
            game_port,
            rcon_port,
        })
    }

    pub fn parse(yaml: &str) -> Result<Self, McAdminError> {
        Self::new(ComposeFile::parse(yaml)?)
    }

    pub fn file(&self) -> &ComposeFile {
        &self.file
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn java_version(&self) -> u32 {
        self.java_version
    }

    pub fn server_type(&self) -> ServerType {
        self.server_type
    }

    pub fn game_version(&self) -> &str {
        &self.game_version
    }

    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_bytes
    }

    pub fn game_port(&self) -> u16 {
        self.game_port
    }

    pub fn rcon_port(&self) -> u16 {
        self.rcon_port
    }
}

/// Derives the Java major version from the image tag (`…:java21` and
/// variants like `java17-alpine`). Images without a java tag run the default
/// bundled Java 8.
fn parse_java_version(image: &str) -> u32 {
    let Some((_, tag)) = image.rsplit_once(':') else {
        return 8;
    };
    let Some(rest) = tag.strip_prefix("java") else {
        return 8;
    };
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(8)
}

/// Parses the itzg-style memory setting (`4G`, `2048M`, `512K`, plain bytes).
fn parse_memory_bytes(raw: &str) -> Result<u64, McAdminError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(McAdminError::InvalidCompose(
            "empty memory setting".to_string(),
        ));
    }
    let (number, multiplier) = match raw.chars().last() {
        Some('g') | Some('G') => (&raw[..raw.len() - 1], 1024 * 1024 * 1024),
        Some('m') | Some('M') => (&raw[..raw.len() - 1], 1024 * 1024),
        Some('k') | Some('K') => (&raw[..raw.len() - 1], 1024),
        _ => (raw, 1),
    };
    let value: u64 = number.trim().parse().map_err(|_| {
        McAdminError::InvalidCompose(format!("invalid memory setting '{raw}'"))
    })?;
    Ok(value * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
services:
  mc:
    image: itzg/minecraft-server:java21
    container_name: mc-survival
    environment:
      EULA: "TRUE"
      TYPE: PAPER
      VERSION: 1.20.4
      MEMORY: 4G
    ports:
      - "25565:25565"
      - "25575:25575"
    custom-extension:
      nested: value
"#;

    #[test]
    fn extracts_all_fields() {
        let compose = McCompose::parse(YAML).unwrap();
        assert_eq!(compose.server_name(), "survival");
        assert_eq!(compose.java_version(), 21);
        assert_eq!(compose.server_type(), ServerType::Paper);
        assert_eq!(compose.game_version(), "1.20.4");
        assert_eq!(compose.max_memory_bytes(), 4 * 1024 * 1024 * 1024);
        assert_eq!(compose.game_port(), 25565);
        assert_eq!(compose.rcon_port(), 25575);
    }

    #[test]
    fn round_trip_preserves_unknown_fields() {
        let compose = McCompose::parse(YAML).unwrap();
        let rendered = compose.file().to_yaml().unwrap();
        assert!(rendered.contains("custom-extension"));
        let reparsed = McCompose::parse(&rendered).unwrap();
        assert_eq!(reparsed.game_port(), 25565);
        assert_eq!(reparsed.rcon_port(), 25575);
        assert_eq!(reparsed.max_memory_bytes(), compose.max_memory_bytes());
    }

    #[test]
    fn rejects_equal_ports() {
        let yaml = YAML.replace("25575:25575", "25565:25575");
        assert!(McCompose::parse(&yaml).is_err());
    }

    #[test]
    fn env_list_form_is_supported() {
        let yaml = r#"
services:
  mc:
    image: itzg/minecraft-server
    container_name: mc-creative
    environment:
      - EULA=TRUE
      - MEMORY=2048M
    ports:
      - "25566:25565"
      - "25576:25575"
"#;
        let compose = McCompose::parse(yaml).unwrap();
        assert_eq!(compose.java_version(), 8);
        assert_eq!(compose.max_memory_bytes(), 2048 * 1024 * 1024);
        assert_eq!(compose.game_port(), 25566);
    }
}
