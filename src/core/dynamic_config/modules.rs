// src/core/dynamic_config/modules.rs

//! The typed config structs for each hot-reloadable module.

use super::schema::ConfigModule;
use crate::core::errors::McAdminError;
use serde::{Deserialize, Serialize};

/// Regex bank used by the log parser. Patterns can be edited at runtime
/// through the config API; the parser recompiles on the next line it sees a
/// new snapshot.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LogParserConfig {
    /// Patterns that announce a player's UUID. Capture 1: name, capture 2:
    /// dashed UUID.
    #[serde(default = "default_uuid_patterns")]
    pub uuid_patterns: Vec<String>,
    /// Capture 1: player name.
    #[serde(default = "default_join_pattern")]
    pub join_pattern: String,
    /// Capture 1: player name, capture 2: disconnect reason.
    #[serde(default = "default_leave_pattern")]
    pub leave_pattern: String,
    /// Capture 1: optional `[Not Secure] ` marker, capture 2: player name,
    /// capture 3: message.
    #[serde(default = "default_chat_pattern")]
    pub chat_pattern: String,
    /// Capture 1: player name, capture 2: achievement name.
    #[serde(default = "default_achievement_patterns")]
    pub achievement_patterns: Vec<String>,
    #[serde(default = "default_server_stop_pattern")]
    pub server_stop_pattern: String,
}

fn default_uuid_patterns() -> Vec<String> {
    vec![
        r"^(?!.*<).*UUID of player (\S+) is (\S{8}-\S{4}-\S{4}-\S{4}-\S{12})".to_string(),
        r"^(?!.*<).*config to (\S+) \((\S{8}-\S{4}-\S{4}-\S{4}-\S{12})\)".to_string(),
    ]
}
fn default_join_pattern() -> String {
    r"^(?!.*<).* (\S+)\[/.*?\] logged in with entity".to_string()
}
fn default_leave_pattern() -> String {
    r"^(?!.*<).* (\S+) lost connection: (.*)".to_string()
}
fn default_chat_pattern() -> String {
    r": (\[Not Secure\] )?<(\S+)> (.*)".to_string()
}
fn default_achievement_patterns() -> Vec<String> {
    vec![
        r"^(?!.*<).*\]: (.+) has made the advancement \[(.*)\]".to_string(),
        r"^(?!.*<).* (\S+) has just earned the achievement \[(.*)\]".to_string(),
    ]
}
fn default_server_stop_pattern() -> String {
    r"^(?!.*<).*Stopping server".to_string()
}

impl Default for LogParserConfig {
    fn default() -> Self {
        Self {
            uuid_patterns: default_uuid_patterns(),
            join_pattern: default_join_pattern(),
            leave_pattern: default_leave_pattern(),
            chat_pattern: default_chat_pattern(),
            achievement_patterns: default_achievement_patterns(),
            server_stop_pattern: default_server_stop_pattern(),
        }
    }
}

impl ConfigModule for LogParserConfig {
    const MODULE_NAME: &'static str = "log_parser";
}

/// Heartbeat and crash recovery tuning.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HeartbeatConfig {
    /// The system is considered crashed when the last heartbeat is at least
    /// this old at boot.
    #[serde(default = "default_crash_threshold_minutes")]
    pub crash_threshold_minutes: u64,
    #[serde(default = "default_heartbeat_interval_seconds")]
    pub heartbeat_interval_seconds: u64,
}

fn default_crash_threshold_minutes() -> u64 {
    5
}
fn default_heartbeat_interval_seconds() -> u64 {
    60
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            crash_threshold_minutes: default_crash_threshold_minutes(),
            heartbeat_interval_seconds: default_heartbeat_interval_seconds(),
        }
    }
}

/// RCON online-set reconciliation tuning.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RconReconcileConfig {
    #[serde(default = "default_reconcile_interval_seconds")]
    pub interval_seconds: u64,
}

fn default_reconcile_interval_seconds() -> u64 {
    60
}

impl Default for RconReconcileConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_reconcile_interval_seconds(),
        }
    }
}

/// Skin fetcher tuning. The delay keeps us under the profile service's rate
/// ceiling.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SkinFetcherConfig {
    #[serde(default = "default_skin_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
}

fn default_skin_request_timeout_seconds() -> u64 {
    10
}
fn default_rate_limit_delay_ms() -> u64 {
    1000
}

impl Default for SkinFetcherConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_skin_request_timeout_seconds(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
        }
    }
}

/// UDP query protocol tuning for player listing.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QueryConfig {
    /// Timeout for the whole handshake + stat exchange.
    #[serde(default = "default_query_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_query_timeout_ms() -> u64 {
    250
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_query_timeout_ms(),
        }
    }
}

/// Player system configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PlayersConfig {
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub rcon_reconcile: RconReconcileConfig,
    #[serde(default)]
    pub skin_fetcher: SkinFetcherConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

impl ConfigModule for PlayersConfig {
    const MODULE_NAME: &'static str = "players";
}

/// Which DNS provider to talk to, with its credentials.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DnsProviderConfig {
    Dnspod {
        domain: String,
        id: String,
        key: String,
    },
    Huawei {
        domain: String,
        ak: String,
        sk: String,
        region: String,
    },
}

impl Default for DnsProviderConfig {
    fn default() -> Self {
        DnsProviderConfig::Dnspod {
            domain: "example.com".to_string(),
            id: "id".to_string(),
            key: "key".to_string(),
        }
    }
}

impl DnsProviderConfig {
    pub fn domain(&self) -> &str {
        match self {
            DnsProviderConfig::Dnspod { domain, .. } => domain,
            DnsProviderConfig::Huawei { domain, .. } => domain,
        }
    }
}

/// How a configured address resolves to a concrete record value and port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AddressSource {
    /// A fixed record value.
    Manual {
        record_type: RecordType,
        value: String,
        port: u16,
    },
    /// Resolved from the natmap monitor at reconcile time, keyed by the
    /// server-side internal port.
    Natmap { internal_port: u16 },
}

/// Record types an address entry may carry.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
    #[serde(rename = "CNAME")]
    Cname,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
        }
    }
}

/// One named address entry. The name `*` denotes the bare managed sub-domain.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AddressConfig {
    pub name: String,
    #[serde(flatten)]
    pub source: AddressSource,
}

/// Natmap monitor endpoint used to resolve natmap-sourced addresses.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NatmapMonitorConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_natmap_base_url")]
    pub base_url: String,
}

fn default_natmap_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

impl Default for NatmapMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_natmap_base_url(),
        }
    }
}

/// DNS and router reconciler configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DnsConfig {
    /// Master switch; when false, `update()` is a no-op.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub dns: DnsProviderConfig,
    /// The sub-domain all reconciled records live under, e.g. `mc`.
    #[serde(default = "default_managed_sub_domain")]
    pub managed_sub_domain: String,
    #[serde(default = "default_dns_ttl")]
    pub dns_ttl: u32,
    #[serde(default = "default_mc_router_base_url")]
    pub mc_router_base_url: String,
    #[serde(default)]
    pub natmap_monitor: NatmapMonitorConfig,
    #[serde(default)]
    pub addresses: Vec<AddressConfig>,
}

fn default_managed_sub_domain() -> String {
    "mc".to_string()
}
fn default_dns_ttl() -> u32 {
    15
}
fn default_mc_router_base_url() -> String {
    "http://127.0.0.1:26666".to_string()
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dns: DnsProviderConfig::default(),
            managed_sub_domain: default_managed_sub_domain(),
            dns_ttl: default_dns_ttl(),
            mc_router_base_url: default_mc_router_base_url(),
            natmap_monitor: NatmapMonitorConfig::default(),
            addresses: Vec::new(),
        }
    }
}

impl ConfigModule for DnsConfig {
    const MODULE_NAME: &'static str = "dns";

    fn validate(&self) -> Result<(), McAdminError> {
        if self.managed_sub_domain.is_empty() {
            return Err(McAdminError::Validation(
                "managed_sub_domain must not be empty".to_string(),
            ));
        }
        for address in &self.addresses {
            if address.name.is_empty() {
                return Err(McAdminError::Validation(
                    "address name must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}
