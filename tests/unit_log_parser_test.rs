// tests/unit_log_parser_test.rs

use mc_admin::core::db;
use mc_admin::core::dynamic_config::DynamicConfigManager;
use mc_admin::core::log_monitor::parser::{LogParser, ParsedLine};
use std::sync::Arc;

async fn parser() -> LogParser {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let config = Arc::new(DynamicConfigManager::initialize(pool).await.unwrap());
    LogParser::new(config)
}

#[tokio::test]
async fn parses_uuid_discovery_and_strips_dashes() {
    let parser = parser().await;
    let line = "[12:00:01] [User Authenticator #1/INFO]: UUID of player Alice is 11111111-2222-3333-4444-555555555555";
    assert_eq!(
        parser.parse_line(line),
        Some(ParsedLine::UuidDiscovered {
            player_name: "Alice".to_string(),
            uuid: "11111111222233334444555555555555".to_string(),
        })
    );
}

#[tokio::test]
async fn parses_join_line() {
    let parser = parser().await;
    let line = "[12:00:02] [Server thread/INFO]: Alice[/1.2.3.4:51731] logged in with entity id 261";
    assert_eq!(
        parser.parse_line(line),
        Some(ParsedLine::Joined {
            player_name: "Alice".to_string(),
        })
    );
}

#[tokio::test]
async fn parses_leave_line_with_reason() {
    let parser = parser().await;
    let line = "[12:30:00] [Server thread/INFO]: Alice lost connection: Disconnected";
    assert_eq!(
        parser.parse_line(line),
        Some(ParsedLine::Left {
            player_name: "Alice".to_string(),
            reason: "Disconnected".to_string(),
        })
    );
}

#[tokio::test]
async fn parses_chat_with_and_without_not_secure_marker() {
    let parser = parser().await;

    let line = "[12:10:00] [Server thread/INFO]: <Alice> hello world";
    assert_eq!(
        parser.parse_line(line),
        Some(ParsedLine::Chat {
            player_name: "Alice".to_string(),
            message: "hello world".to_string(),
        })
    );

    let line = "[12:10:05] [Server thread/INFO]: [Not Secure] <Bob> hi";
    assert_eq!(
        parser.parse_line(line),
        Some(ParsedLine::Chat {
            player_name: "Bob".to_string(),
            message: "hi".to_string(),
        })
    );
}

#[tokio::test]
async fn parses_both_achievement_flavors() {
    let parser = parser().await;

    let line = "[12:20:00] [Server thread/INFO]: Alice has made the advancement [Stone Age]";
    assert_eq!(
        parser.parse_line(line),
        Some(ParsedLine::Achievement {
            player_name: "Alice".to_string(),
            achievement_name: "Stone Age".to_string(),
        })
    );

    let line = "[12:20:30] Bob has just earned the achievement [Taking Inventory]";
    assert_eq!(
        parser.parse_line(line),
        Some(ParsedLine::Achievement {
            player_name: "Bob".to_string(),
            achievement_name: "Taking Inventory".to_string(),
        })
    );
}

#[tokio::test]
async fn parses_server_stop() {
    let parser = parser().await;
    let line = "[13:00:00] [Server thread/INFO]: Stopping server";
    assert_eq!(parser.parse_line(line), Some(ParsedLine::ServerStopping));
}

#[tokio::test]
async fn chat_lines_cannot_spoof_other_events() {
    let parser = parser().await;

    // A player quoting a join line in chat must parse as chat, not a join.
    let line = "[12:11:00] [Server thread/INFO]: <Mallory> Alice[/1.2.3.4:1] logged in with entity";
    assert_eq!(
        parser.parse_line(line),
        Some(ParsedLine::Chat {
            player_name: "Mallory".to_string(),
            message: "Alice[/1.2.3.4:1] logged in with entity".to_string(),
        })
    );

    let line = "[12:11:30] [Server thread/INFO]: <Mallory> Stopping server";
    assert!(matches!(parser.parse_line(line), Some(ParsedLine::Chat { .. })));
}

#[tokio::test]
async fn unmatched_lines_produce_no_event() {
    let parser = parser().await;
    assert_eq!(parser.parse_line("[12:00:00] [Server thread/INFO]: Done (3.14s)!"), None);
    assert_eq!(parser.parse_line(""), None);
}
