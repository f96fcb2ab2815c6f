// src/core/dns/providers/huawei.rs

//! Huawei Cloud DNS provider (AK/SK request signing, recordset API).
//!
//! Supports in-place recordset updates, so the reconciler uses the batch
//! update path instead of remove-then-add.

use super::DnsProvider;
use crate::core::dns::types::{AddRecord, DnsRecord, RecordId, is_under_managed_sub_domain};
use crate::core::errors::McAdminError;
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

const SIGNING_ALGORITHM: &str = "SDK-HMAC-SHA256";

#[derive(Debug, Deserialize)]
struct ZoneListResponse {
    #[serde(default)]
    zones: Vec<ZoneEntry>,
}

#[derive(Debug, Deserialize)]
struct ZoneEntry {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RecordSetListResponse {
    #[serde(default)]
    recordsets: Vec<RecordSetEntry>,
}

#[derive(Debug, Deserialize)]
struct RecordSetEntry {
    id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    #[serde(default)]
    records: Vec<String>,
    #[serde(default)]
    ttl: Option<u32>,
    #[serde(default)]
    default: bool,
}

pub struct HuaweiProvider {
    domain: String,
    access_key: String,
    secret_key: String,
    endpoint: String,
    host: String,
    http: reqwest::Client,
    zone_id: OnceCell<String>,
}

impl HuaweiProvider {
    pub fn new(domain: String, ak: String, sk: String, region: String) -> Self {
        let host = format!("dns.{region}.myhuaweicloud.com");
        Self {
            domain,
            access_key: ak,
            secret_key: sk,
            endpoint: format!("https://{host}"),
            host,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            zone_id: OnceCell::new(),
        }
    }

    /// Builds the `Authorization` header for one request per Huawei's
    /// SDK-HMAC-SHA256 scheme.
    fn sign(
        &self,
        method: &str,
        path: &str,
        query: &str,
        body: &str,
        timestamp: &str,
    ) -> Result<String, McAdminError> {
        let canonical_uri = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        let canonical_headers = format!("host:{}\nx-sdk-date:{timestamp}\n", self.host);
        let signed_headers = "host;x-sdk-date";
        let body_hash = hex::encode(Sha256::digest(body.as_bytes()));

        let canonical_request = format!(
            "{method}\n{canonical_uri}\n{query}\n{canonical_headers}\n{signed_headers}\n{body_hash}"
        );
        let request_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = format!("{SIGNING_ALGORITHM}\n{timestamp}\n{request_hash}");

        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| McAdminError::DnsProvider(format!("invalid secret key: {e}")))?;
        mac.update(string_to_sign.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!(
            "{SIGNING_ALGORITHM} Access={}, SignedHeaders={signed_headers}, Signature={signature}",
            self.access_key
        ))
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<T, McAdminError> {
        let body_str = body
            .as_ref()
            .map(|b| b.to_string())
            .unwrap_or_default();
        let query_string = query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let authorization =
            self.sign(method.as_str(), path, &query_string, &body_str, &timestamp)?;

        debug!("Huawei DNS {} {path}", method.as_str());
        let mut request = self
            .http
            .request(method, format!("{}{path}", self.endpoint))
            .header("X-Sdk-Date", &timestamp)
            .header("Authorization", authorization);
        if !query.is_empty() {
            request = request.query(query);
        }
        if body.is_some() {
            request = request
                .header("Content-Type", "application/json")
                .body(body_str);
        }

        let response = request
            .send()
            .await
            .map_err(|e| McAdminError::DnsProvider(format!("Huawei DNS request failed: {e}")))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(McAdminError::DnsProvider(format!(
                "Huawei DNS returned {status}: {text}"
            )));
        }
        if text.is_empty() {
            // DELETE responses may be empty; synthesize a null for unit-ish
            // deserialization targets.
            return serde_json::from_str("null").map_err(|e| {
                McAdminError::DnsProvider(format!("Huawei DNS response invalid: {e}"))
            });
        }
        serde_json::from_str(&text)
            .map_err(|e| McAdminError::DnsProvider(format!("Huawei DNS response invalid: {e}")))
    }

    async fn zone_id(&self) -> Result<&str, McAdminError> {
        self.zone_id
            .get_or_try_init(|| async {
                let response: ZoneListResponse = self
                    .request(
                        reqwest::Method::GET,
                        "/v2/zones",
                        &[("name", self.domain.as_str())],
                        None,
                    )
                    .await?;
                let wanted = format!("{}.", self.domain);
                response
                    .zones
                    .into_iter()
                    .find(|zone| zone.name == wanted || zone.name == self.domain)
                    .map(|zone| zone.id)
                    .ok_or_else(|| {
                        McAdminError::DnsProvider(format!(
                            "zone for domain '{}' not found",
                            self.domain
                        ))
                    })
            })
            .await
            .map(String::as_str)
    }

    /// `survival.mc.example.com.` → `survival.mc`, if under our domain.
    fn sub_domain_of(&self, fqdn: &str) -> Option<String> {
        let name = fqdn.strip_suffix('.').unwrap_or(fqdn);
        let stripped = name.strip_suffix(&self.domain)?;
        let sub = stripped.strip_suffix('.')?;
        (!sub.is_empty()).then(|| sub.to_string())
    }

    fn fqdn_of(&self, sub_domain: &str) -> String {
        format!("{sub_domain}.{}.", self.domain)
    }
}

#[async_trait]
impl DnsProvider for HuaweiProvider {
    fn domain(&self) -> &str {
        &self.domain
    }

    fn supports_batch_update(&self) -> bool {
        true
    }

    async fn list_relevant_records(
        &self,
        managed_sub_domain: &str,
    ) -> Result<Vec<DnsRecord>, McAdminError> {
        let zone_id = self.zone_id().await?.to_string();
        let response: RecordSetListResponse = self
            .request(
                reqwest::Method::GET,
                &format!("/v2/zones/{zone_id}/recordsets"),
                &[("limit", "500")],
                None,
            )
            .await?;

        let mut records = Vec::new();
        for entry in response.recordsets {
            // The zone's NS/SOA sets are flagged as default and never ours.
            if entry.default {
                continue;
            }
            let Some(sub_domain) = self.sub_domain_of(&entry.name) else {
                continue;
            };
            if !is_under_managed_sub_domain(&sub_domain, managed_sub_domain) {
                continue;
            }
            let Some(value) = entry.records.into_iter().next() else {
                continue;
            };
            records.push(DnsRecord {
                sub_domain,
                record_type: entry.record_type,
                value,
                ttl: entry.ttl.unwrap_or(300),
                record_id: entry.id,
            });
        }
        Ok(records)
    }

    async fn add_records(&self, records: &[AddRecord]) -> Result<(), McAdminError> {
        let zone_id = self.zone_id().await?.to_string();
        for record in records {
            let _: serde_json::Value = self
                .request(
                    reqwest::Method::POST,
                    &format!("/v2/zones/{zone_id}/recordsets"),
                    &[],
                    Some(json!({
                        "name": self.fqdn_of(&record.sub_domain),
                        "type": record.record_type,
                        "ttl": record.ttl,
                        "records": [record.value],
                    })),
                )
                .await?;
        }
        Ok(())
    }

    async fn remove_records(&self, record_ids: &[RecordId]) -> Result<(), McAdminError> {
        let zone_id = self.zone_id().await?.to_string();
        for record_id in record_ids {
            let _: serde_json::Value = self
                .request(
                    reqwest::Method::DELETE,
                    &format!("/v2/zones/{zone_id}/recordsets/{record_id}"),
                    &[],
                    None,
                )
                .await?;
        }
        Ok(())
    }

    async fn update_records_batch(&self, records: &[DnsRecord]) -> Result<(), McAdminError> {
        let zone_id = self.zone_id().await?.to_string();
        for record in records {
            let _: serde_json::Value = self
                .request(
                    reqwest::Method::PUT,
                    &format!("/v2/zones/{zone_id}/recordsets/{}", record.record_id),
                    &[],
                    Some(json!({
                        "name": self.fqdn_of(&record.sub_domain),
                        "type": record.record_type,
                        "ttl": record.ttl,
                        "records": [record.value],
                    })),
                )
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> HuaweiProvider {
        HuaweiProvider::new(
            "example.com".to_string(),
            "ak".to_string(),
            "sk".to_string(),
            "cn-south-1".to_string(),
        )
    }

    #[test]
    fn fqdn_round_trip() {
        let p = provider();
        assert_eq!(p.fqdn_of("*.mc"), "*.mc.example.com.");
        assert_eq!(p.sub_domain_of("*.mc.example.com.").as_deref(), Some("*.mc"));
        assert_eq!(
            p.sub_domain_of("_minecraft._tcp.survival.mc.example.com").as_deref(),
            Some("_minecraft._tcp.survival.mc")
        );
        assert_eq!(p.sub_domain_of("other.org."), None);
        assert_eq!(p.sub_domain_of("example.com."), None);
    }

    #[test]
    fn signature_is_deterministic() {
        let p = provider();
        let a = p
            .sign("GET", "/v2/zones", "name=example.com", "", "20240101T000000Z")
            .unwrap();
        let b = p
            .sign("GET", "/v2/zones", "name=example.com", "", "20240101T000000Z")
            .unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("SDK-HMAC-SHA256 Access=ak, SignedHeaders=host;x-sdk-date, Signature="));
    }
}
