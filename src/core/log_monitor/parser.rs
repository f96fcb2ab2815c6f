// src/core/log_monitor/parser.rs

//! Turns raw log lines into parsed events using the hot-reloadable pattern
//! bank from dynamic config.

use crate::core::dynamic_config::{DynamicConfigManager, LogParserConfig};
use fancy_regex::Regex;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// A line successfully matched against the pattern bank. The monitor attaches
/// the server id and timestamp when it dispatches.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    UuidDiscovered { player_name: String, uuid: String },
    Joined { player_name: String },
    Left { player_name: String, reason: String },
    Chat { player_name: String, message: String },
    Achievement { player_name: String, achievement_name: String },
    ServerStopping,
}

/// The compiled form of one [`LogParserConfig`] snapshot.
struct CompiledBank {
    source: Arc<LogParserConfig>,
    uuid_patterns: Vec<Regex>,
    join_pattern: Option<Regex>,
    leave_pattern: Option<Regex>,
    chat_pattern: Option<Regex>,
    achievement_patterns: Vec<Regex>,
    server_stop_pattern: Option<Regex>,
}

impl CompiledBank {
    fn compile(source: Arc<LogParserConfig>) -> Self {
        let compile_one = |pattern: &str| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!("Skipping invalid log parser pattern '{pattern}': {e}");
                None
            }
        };
        let compile_list =
            |patterns: &[String]| patterns.iter().filter_map(|p| compile_one(p)).collect();

        Self {
            uuid_patterns: compile_list(&source.uuid_patterns),
            join_pattern: compile_one(&source.join_pattern),
            leave_pattern: compile_one(&source.leave_pattern),
            chat_pattern: compile_one(&source.chat_pattern),
            achievement_patterns: compile_list(&source.achievement_patterns),
            server_stop_pattern: compile_one(&source.server_stop_pattern),
            source,
        }
    }
}

/// Parses log lines. Recompiles its pattern bank whenever the dynamic config
/// snapshot changes.
pub struct LogParser {
    config: Arc<DynamicConfigManager>,
    bank: Mutex<Option<Arc<CompiledBank>>>,
}

impl LogParser {
    pub fn new(config: Arc<DynamicConfigManager>) -> Self {
        Self {
            config,
            bank: Mutex::new(None),
        }
    }

    fn current_bank(&self) -> Arc<CompiledBank> {
        let snapshot = self.config.log_parser();
        let mut cached = self.bank.lock();
        if let Some(bank) = cached.as_ref()
            && Arc::ptr_eq(&bank.source, &snapshot)
        {
            return bank.clone();
        }
        let bank = Arc::new(CompiledBank::compile(snapshot));
        *cached = Some(bank.clone());
        bank
    }

    /// Matches a line against the bank in fixed order (UUID, join, leave,
    /// chat, achievement, stop), returning at the first match.
    pub fn parse_line(&self, line: &str) -> Option<ParsedLine> {
        let bank = self.current_bank();

        for pattern in &bank.uuid_patterns {
            if let Ok(Some(captures)) = pattern.captures(line)
                && let (Some(name), Some(uuid)) = (captures.get(1), captures.get(2))
            {
                return Some(ParsedLine::UuidDiscovered {
                    player_name: name.as_str().to_string(),
                    uuid: uuid.as_str().replace('-', ""),
                });
            }
        }

        if let Some(pattern) = &bank.join_pattern
            && let Ok(Some(captures)) = pattern.captures(line)
            && let Some(name) = captures.get(1)
        {
            return Some(ParsedLine::Joined {
                player_name: name.as_str().to_string(),
            });
        }

        if let Some(pattern) = &bank.leave_pattern
            && let Ok(Some(captures)) = pattern.captures(line)
            && let Some(name) = captures.get(1)
        {
            return Some(ParsedLine::Left {
                player_name: name.as_str().to_string(),
                reason: captures.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
            });
        }

        if let Some(pattern) = &bank.chat_pattern
            && let Ok(Some(captures)) = pattern.captures(line)
        {
            // Capture 1 is the optional `[Not Secure] ` marker and is ignored.
            if let (Some(name), Some(message)) = (captures.get(2), captures.get(3)) {
                return Some(ParsedLine::Chat {
                    player_name: name.as_str().to_string(),
                    message: message.as_str().to_string(),
                });
            }
        }

        for pattern in &bank.achievement_patterns {
            if let Ok(Some(captures)) = pattern.captures(line)
                && let (Some(name), Some(achievement)) = (captures.get(1), captures.get(2))
            {
                return Some(ParsedLine::Achievement {
                    player_name: name.as_str().to_string(),
                    achievement_name: achievement.as_str().to_string(),
                });
            }
        }

        if let Some(pattern) = &bank.server_stop_pattern
            && matches!(pattern.is_match(line), Ok(true))
        {
            debug!("Parsed server stopping line");
            return Some(ParsedLine::ServerStopping);
        }

        None
    }
}
