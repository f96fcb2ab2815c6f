// src/core/dns/mod.rs

//! The DNS / router reconciler.
//!
//! Single entry point [`DnsManager::update`]: compute the target record and
//! route sets from the live instance list plus the configured addresses, diff
//! against the provider, and converge with minimal mutations. A mutex
//! serializes concurrent triggers; a hash over the client-affecting config
//! fields rebuilds the provider/router clients transparently when the
//! dynamic config changes.

pub mod providers;
pub mod router;
pub mod types;

use crate::core::dynamic_config::modules::{AddressSource, DnsConfig, DnsProviderConfig};
use crate::core::dynamic_config::DynamicConfigManager;
use crate::core::errors::McAdminError;
use crate::core::events::{EventHandler, ServerCreated, ServerRemoved};
use crate::core::instance::DockerMcManager;
use async_trait::async_trait;
use providers::{DnsProvider, dnspod::DnspodProvider, huawei::HuaweiProvider};
use router::{McRouterClient, RouteDiff, Routes};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use types::{AddRecord, RecordDiff, diff_dns_records};

/// A configured address resolved to a concrete record value and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub name: String,
    pub record_type: String,
    pub value: String,
    pub port: u16,
}

/// What `update()` would do right now, for the status API.
#[derive(Debug, Clone, Default)]
pub struct DnsStatus {
    pub enabled: bool,
    pub dns_diff: Option<RecordDiff>,
    pub router_diff: Option<RouteDiff>,
    pub errors: Vec<String>,
}

struct Clients {
    provider: Arc<dyn DnsProvider>,
    router: McRouterClient,
    config_hash: String,
}

pub struct DnsManager {
    docker: Arc<DockerMcManager>,
    config: Arc<DynamicConfigManager>,
    clients: Mutex<Option<Clients>>,
    update_lock: Mutex<()>,
    http: reqwest::Client,
}

impl DnsManager {
    pub fn new(docker: Arc<DockerMcManager>, config: Arc<DynamicConfigManager>) -> Arc<Self> {
        Arc::new(Self {
            docker,
            config,
            clients: Mutex::new(None),
            update_lock: Mutex::new(()),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
        })
    }

    /// Reconciles DNS records and router routes with the current instance
    /// set. Serialized; a no-op while disabled.
    pub async fn update(&self) -> Result<(), McAdminError> {
        let dns_config = self.config.dns();
        if !dns_config.enabled {
            info!("DNS manager is disabled in configuration");
            return Ok(());
        }

        let _guard = self.update_lock.lock().await;
        info!("Starting DNS update...");

        let provider = self.ensure_clients(&dns_config).await?;
        let domain = provider.domain().to_string();

        let servers = self.current_servers().await?;
        let addresses = self.resolve_addresses(&dns_config).await;
        if servers.is_empty() || addresses.is_empty() {
            warn!("No addresses or servers found, skipping DNS update");
            return Ok(());
        }
        info!("Found {} servers and {} addresses", servers.len(), addresses.len());

        let target_records = generate_dns_records(
            &addresses,
            &servers,
            &dns_config.managed_sub_domain,
            dns_config.dns_ttl,
            &domain,
        );
        let target_routes =
            generate_routes(&addresses, &servers, &dns_config.managed_sub_domain, &domain);

        let current_records = provider
            .list_relevant_records(&dns_config.managed_sub_domain)
            .await?;
        let diff = diff_dns_records(&current_records, &target_records);
        apply_record_diff(provider.as_ref(), &diff).await?;

        let clients = self.clients.lock().await;
        if let Some(clients) = clients.as_ref() {
            clients.router.override_routes(&target_routes).await?;
        }

        info!("DNS update completed successfully");
        Ok(())
    }

    /// Read-only view of the pending diff. Never mutates provider or router.
    pub async fn get_current_diff(&self) -> DnsStatus {
        let dns_config = self.config.dns();
        let mut status = DnsStatus {
            enabled: dns_config.enabled,
            ..Default::default()
        };
        if !dns_config.enabled {
            return status;
        }

        let provider = match self.ensure_clients(&dns_config).await {
            Ok(provider) => provider,
            Err(e) => {
                status.errors.push(format!("client initialization failed: {e}"));
                return status;
            }
        };
        let domain = provider.domain().to_string();

        let servers = match self.current_servers().await {
            Ok(servers) => servers,
            Err(e) => {
                status.errors.push(format!("server listing failed: {e}"));
                return status;
            }
        };
        let addresses = self.resolve_addresses(&dns_config).await;
        if servers.is_empty() || addresses.is_empty() {
            status
                .errors
                .push("no addresses or servers found for diff calculation".to_string());
            return status;
        }

        let target_records = generate_dns_records(
            &addresses,
            &servers,
            &dns_config.managed_sub_domain,
            dns_config.dns_ttl,
            &domain,
        );
        match provider
            .list_relevant_records(&dns_config.managed_sub_domain)
            .await
        {
            Ok(current) => status.dns_diff = Some(diff_dns_records(&current, &target_records)),
            Err(e) => status.errors.push(format!("DNS diff calculation failed: {e}")),
        }

        let target_routes =
            generate_routes(&addresses, &servers, &dns_config.managed_sub_domain, &domain);
        let clients = self.clients.lock().await;
        if let Some(clients) = clients.as_ref() {
            match clients.router.get_routes_diff(&target_routes).await {
                Ok(diff) => status.router_diff = Some(diff),
                Err(e) => status
                    .errors
                    .push(format!("router diff calculation failed: {e}")),
            }
        }

        status
    }

    /// Rebuilds provider and router clients when the client-affecting config
    /// fields changed since the last call.
    async fn ensure_clients(
        &self,
        dns_config: &DnsConfig,
    ) -> Result<Arc<dyn DnsProvider>, McAdminError> {
        let hash = client_config_hash(dns_config);
        let mut clients = self.clients.lock().await;

        if let Some(existing) = clients.as_ref()
            && existing.config_hash == hash
        {
            return Ok(existing.provider.clone());
        }

        info!("DNS configuration changed, (re)initializing clients");
        let provider: Arc<dyn DnsProvider> = match &dns_config.dns {
            DnsProviderConfig::Dnspod { domain, id, key } => Arc::new(DnspodProvider::new(
                domain.clone(),
                id.clone(),
                key.clone(),
            )),
            DnsProviderConfig::Huawei {
                domain,
                ak,
                sk,
                region,
            } => Arc::new(HuaweiProvider::new(
                domain.clone(),
                ak.clone(),
                sk.clone(),
                region.clone(),
            )),
        };
        let router = McRouterClient::new(&dns_config.mc_router_base_url);

        *clients = Some(Clients {
            provider: provider.clone(),
            router,
            config_hash: hash,
        });
        Ok(provider)
    }

    /// `server name → game port` for every valid instance.
    async fn current_servers(&self) -> Result<BTreeMap<String, u16>, McAdminError> {
        Ok(self
            .docker
            .get_all_server_info()
            .await?
            .into_iter()
            .map(|info| (info.name, info.game_port))
            .collect())
    }

    /// Resolves address entries; natmap-sourced entries are queried live and
    /// skipped (with a warning) when unavailable.
    async fn resolve_addresses(&self, dns_config: &DnsConfig) -> Vec<ResolvedAddress> {
        let mut resolved = Vec::new();
        let mut natmap_mappings: Option<NatmapMappings> = None;

        for address in &dns_config.addresses {
            match &address.source {
                AddressSource::Manual {
                    record_type,
                    value,
                    port,
                } => resolved.push(ResolvedAddress {
                    name: address.name.clone(),
                    record_type: record_type.as_str().to_string(),
                    value: value.clone(),
                    port: *port,
                }),
                AddressSource::Natmap { internal_port } => {
                    if !dns_config.natmap_monitor.enabled {
                        warn!("Address '{}' needs the natmap monitor, which is disabled", address.name);
                        continue;
                    }
                    if natmap_mappings.is_none() {
                        natmap_mappings = self
                            .fetch_natmap_mappings(&dns_config.natmap_monitor.base_url)
                            .await
                            .map_err(|e| warn!("Natmap monitor unavailable: {e}"))
                            .ok();
                    }
                    let Some(mappings) = &natmap_mappings else {
                        continue;
                    };
                    let key = format!("tcp:{internal_port}");
                    match mappings.get(&key) {
                        Some(mapping) => resolved.push(ResolvedAddress {
                            name: address.name.clone(),
                            record_type: "A".to_string(),
                            value: mapping.ip.clone(),
                            port: mapping.port,
                        }),
                        None => {
                            warn!("Port {internal_port} not found in natmap mappings");
                        }
                    }
                }
            }
        }
        resolved
    }

    async fn fetch_natmap_mappings(&self, base_url: &str) -> Result<NatmapMappings, McAdminError> {
        let url = format!("{}/all_mappings", base_url.trim_end_matches('/'));
        let response = self.http.get(&url).send().await?;
        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct NatmapMapping {
    ip: String,
    port: u16,
}

type NatmapMappings = std::collections::HashMap<String, NatmapMapping>;

/// Applies a diff in remove → add → update order so duplicate-key transient
/// states cannot arise. Providers without batch update get remove-then-add.
pub async fn apply_record_diff(
    provider: &dyn DnsProvider,
    diff: &RecordDiff,
) -> Result<(), McAdminError> {
    if !diff.to_remove.is_empty() {
        provider.remove_records(&diff.to_remove).await?;
    }
    if !diff.to_add.is_empty() {
        provider.add_records(&diff.to_add).await?;
    }
    if diff.to_update.is_empty() {
        return Ok(());
    }

    if provider.supports_batch_update() {
        provider.update_records_batch(&diff.to_update).await
    } else {
        let ids: Vec<String> = diff
            .to_update
            .iter()
            .map(|record| record.record_id.clone())
            .collect();
        provider.remove_records(&ids).await?;
        let adds: Vec<AddRecord> = diff
            .to_update
            .iter()
            .map(|record| AddRecord {
                sub_domain: record.sub_domain.clone(),
                record_type: record.record_type.clone(),
                value: record.value.clone(),
                ttl: record.ttl,
            })
            .collect();
        provider.add_records(&adds).await
    }
}

fn sub_domain_base(address_name: &str, managed_sub_domain: &str) -> String {
    if address_name == "*" {
        managed_sub_domain.to_string()
    } else {
        format!("{address_name}.{managed_sub_domain}")
    }
}

/// The complete target record set: one wildcard per address plus one SRV per
/// (address, server).
pub fn generate_dns_records(
    addresses: &[ResolvedAddress],
    servers: &BTreeMap<String, u16>,
    managed_sub_domain: &str,
    ttl: u32,
    domain: &str,
) -> Vec<AddRecord> {
    let mut records = Vec::new();
    for address in addresses {
        let base = sub_domain_base(&address.name, managed_sub_domain);

        records.push(AddRecord {
            sub_domain: format!("*.{base}"),
            record_type: address.record_type.clone(),
            value: address.value.clone(),
            ttl,
        });

        for server_name in servers.keys() {
            records.push(AddRecord {
                sub_domain: format!("_minecraft._tcp.{server_name}.{base}"),
                record_type: "SRV".to_string(),
                value: format!("0 5 {} {server_name}.{base}.{domain}", address.port),
                ttl,
            });
        }
    }
    records
}

/// The complete target route set: every (address, server) pair maps its
/// public name to the local game port.
pub fn generate_routes(
    addresses: &[ResolvedAddress],
    servers: &BTreeMap<String, u16>,
    managed_sub_domain: &str,
    domain: &str,
) -> Routes {
    let mut routes = Routes::new();
    for (server_name, game_port) in servers {
        for address in addresses {
            let base = sub_domain_base(&address.name, managed_sub_domain);
            routes.insert(
                format!("{server_name}.{base}.{domain}"),
                format!("localhost:{game_port}"),
            );
        }
    }
    routes
}

/// Hash over the config fields that require rebuilding clients when changed.
fn client_config_hash(dns_config: &DnsConfig) -> String {
    let key = serde_json::json!({
        "enabled": dns_config.enabled,
        "dns": serde_json::to_value(&dns_config.dns).unwrap_or_default(),
        "mc_router_base_url": dns_config.mc_router_base_url,
    });
    hex::encode(Sha256::digest(key.to_string().as_bytes()))
}

/// Triggers a reconcile whenever an instance appears.
pub struct ReconcileOnServerCreated {
    pub dns: Arc<DnsManager>,
}

#[async_trait]
impl EventHandler<ServerCreated> for ReconcileOnServerCreated {
    fn name(&self) -> &'static str {
        "dns.reconcile_on_created"
    }

    async fn handle(&self, _event: ServerCreated) -> Result<(), McAdminError> {
        let dns = self.dns.clone();
        tokio::spawn(async move {
            if let Err(e) = dns.update().await {
                error!("DNS update after server creation failed: {e}");
            }
        });
        Ok(())
    }
}

/// Triggers a reconcile whenever an instance disappears.
pub struct ReconcileOnServerRemoved {
    pub dns: Arc<DnsManager>,
}

#[async_trait]
impl EventHandler<ServerRemoved> for ReconcileOnServerRemoved {
    fn name(&self) -> &'static str {
        "dns.reconcile_on_removed"
    }

    async fn handle(&self, _event: ServerRemoved) -> Result<(), McAdminError> {
        let dns = self.dns.clone();
        tokio::spawn(async move {
            if let Err(e) = dns.update().await {
                error!("DNS update after server removal failed: {e}");
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(name: &str, value: &str, port: u16) -> ResolvedAddress {
        ResolvedAddress {
            name: name.to_string(),
            record_type: "A".to_string(),
            value: value.to_string(),
            port,
        }
    }

    #[test]
    fn generates_wildcard_and_srv_records() {
        let addresses = vec![address("*", "1.2.3.4", 25565)];
        let servers = BTreeMap::from([("survival".to_string(), 25565)]);
        let records = generate_dns_records(&addresses, &servers, "mc", 15, "ex.com");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sub_domain, "*.mc");
        assert_eq!(records[0].record_type, "A");
        assert_eq!(records[0].value, "1.2.3.4");
        assert_eq!(records[0].ttl, 15);
        assert_eq!(records[1].sub_domain, "_minecraft._tcp.survival.mc");
        assert_eq!(records[1].record_type, "SRV");
        assert_eq!(records[1].value, "0 5 25565 survival.mc.ex.com");
    }

    #[test]
    fn named_address_nests_under_managed_sub_domain() {
        let addresses = vec![address("home", "9.9.9.9", 25566)];
        let servers = BTreeMap::from([("creative".to_string(), 25570)]);
        let records = generate_dns_records(&addresses, &servers, "mc", 15, "ex.com");

        assert_eq!(records[0].sub_domain, "*.home.mc");
        assert_eq!(records[1].sub_domain, "_minecraft._tcp.creative.home.mc");
        assert_eq!(records[1].value, "0 5 25566 creative.home.mc.ex.com");
    }

    #[test]
    fn generates_routes_for_every_pair() {
        let addresses = vec![address("*", "1.2.3.4", 25565), address("home", "9.9.9.9", 1)];
        let servers = BTreeMap::from([
            ("survival".to_string(), 25565),
            ("creative".to_string(), 25570),
        ]);
        let routes = generate_routes(&addresses, &servers, "mc", "ex.com");

        assert_eq!(routes.len(), 4);
        assert_eq!(
            routes.get("survival.mc.ex.com").map(String::as_str),
            Some("localhost:25565")
        );
        assert_eq!(
            routes.get("creative.home.mc.ex.com").map(String::as_str),
            Some("localhost:25570")
        );
    }

    #[test]
    fn config_hash_ignores_addresses() {
        let mut config = DnsConfig::default();
        let base = client_config_hash(&config);
        config.addresses.push(crate::core::dynamic_config::modules::AddressConfig {
            name: "*".to_string(),
            source: AddressSource::Manual {
                record_type: crate::core::dynamic_config::modules::RecordType::A,
                value: "1.2.3.4".to_string(),
                port: 25565,
            },
        });
        assert_eq!(client_config_hash(&config), base);

        config.mc_router_base_url = "http://other:26666".to_string();
        assert_ne!(client_config_hash(&config), base);
    }
}
