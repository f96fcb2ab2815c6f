// src/core/instance/query.rs

//! Minimal client for Minecraft's UDP Query protocol (handshake + full stat).
//!
//! Used to list online players without going through RCON when the server has
//! `enable-query` set. The whole exchange runs under one short deadline; any
//! failure makes the caller fall back to RCON.

use crate::core::errors::McAdminError;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const PACKET_TYPE_HANDSHAKE: u8 = 0x09;
const PACKET_TYPE_STAT: u8 = 0x00;
const SESSION_ID: u32 = 0x0001;

/// Runs handshake + full stat against `host:port` and returns the player
/// names from the stat response.
pub async fn query_players(
    host: &str,
    port: u16,
    deadline: Duration,
) -> Result<Vec<String>, McAdminError> {
    timeout(deadline, query_players_inner(host, port))
        .await
        .map_err(|_| McAdminError::Rcon(format!("query to {host}:{port} timed out")))?
}

async fn query_players_inner(host: &str, port: u16) -> Result<Vec<String>, McAdminError> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect((host, port)).await?;

    // Handshake: request a challenge token.
    let mut packet = vec![0xFE, 0xFD, PACKET_TYPE_HANDSHAKE];
    packet.extend_from_slice(&SESSION_ID.to_be_bytes());
    socket.send(&packet).await?;

    let mut buf = [0u8; 1024];
    let len = socket.recv(&mut buf).await?;
    let token = parse_challenge_token(&buf[..len])?;

    // Full stat: token plus four bytes of padding.
    let mut packet = vec![0xFE, 0xFD, PACKET_TYPE_STAT];
    packet.extend_from_slice(&SESSION_ID.to_be_bytes());
    packet.extend_from_slice(&token.to_be_bytes());
    packet.extend_from_slice(&[0u8; 4]);
    socket.send(&packet).await?;

    let mut buf = [0u8; 8192];
    let len = socket.recv(&mut buf).await?;
    parse_full_stat_players(&buf[..len])
}

fn parse_challenge_token(response: &[u8]) -> Result<i32, McAdminError> {
    // Type byte + 4-byte session id, then the token as an ASCII string.
    if response.len() < 6 || response[0] != PACKET_TYPE_HANDSHAKE {
        return Err(McAdminError::Rcon("malformed query handshake response".to_string()));
    }
    let token_str = read_cstring(&response[5..]).0;
    token_str
        .trim()
        .parse()
        .map_err(|_| McAdminError::Rcon(format!("invalid challenge token '{token_str}'")))
}

/// Extracts the player list from a full stat response.
pub(crate) fn parse_full_stat_players(response: &[u8]) -> Result<Vec<String>, McAdminError> {
    if response.len() < 5 || response[0] != PACKET_TYPE_STAT {
        return Err(McAdminError::Rcon("malformed query stat response".to_string()));
    }
    // Skip type + session id + the constant 11-byte "splitnum" padding.
    let mut rest = response
        .get(5 + 11..)
        .ok_or_else(|| McAdminError::Rcon("truncated query stat response".to_string()))?;

    // Key-value section ends at an empty key.
    loop {
        let (key, after_key) = read_cstring(rest);
        rest = after_key;
        if key.is_empty() {
            break;
        }
        let (_value, after_value) = read_cstring(rest);
        rest = after_value;
    }

    // 10-byte "\x01player_\x00\x00" marker precedes the names.
    rest = rest
        .get(10.min(rest.len())..)
        .ok_or_else(|| McAdminError::Rcon("truncated query player section".to_string()))?;

    let mut players = Vec::new();
    loop {
        let (name, after) = read_cstring(rest);
        rest = after;
        if name.is_empty() {
            break;
        }
        players.push(name);
    }
    Ok(players)
}

/// Reads a null-terminated string, returning it and the remaining bytes.
fn read_cstring(data: &[u8]) -> (String, &[u8]) {
    match data.iter().position(|&b| b == 0) {
        Some(end) => (
            String::from_utf8_lossy(&data[..end]).into_owned(),
            &data[end + 1..],
        ),
        None => (String::from_utf8_lossy(data).into_owned(), &[]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_player_names_from_stat_response() {
        let mut response = vec![0x00];
        response.extend_from_slice(&SESSION_ID.to_be_bytes());
        response.extend_from_slice(b"splitnum\x00\x80\x00");
        response.extend_from_slice(b"hostname\x00A server\x00numplayers\x002\x00\x00");
        response.extend_from_slice(b"\x01player_\x00\x00");
        response.extend_from_slice(b"Alice\x00Bob\x00\x00");

        let players = parse_full_stat_players(&response).unwrap();
        assert_eq!(players, vec!["Alice".to_string(), "Bob".to_string()]);
    }

    #[test]
    fn empty_player_section_yields_no_players() {
        let mut response = vec![0x00];
        response.extend_from_slice(&SESSION_ID.to_be_bytes());
        response.extend_from_slice(b"splitnum\x00\x80\x00");
        response.extend_from_slice(b"numplayers\x000\x00\x00");
        response.extend_from_slice(b"\x01player_\x00\x00\x00");

        let players = parse_full_stat_players(&response).unwrap();
        assert!(players.is_empty());
    }
}
