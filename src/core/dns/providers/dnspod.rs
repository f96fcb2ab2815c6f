// src/core/dns/providers/dnspod.rs

//! DNSPod provider (legacy dnsapi.cn form API, login_token auth).
//!
//! DNSPod has no batch update endpoint we use, so updates go through the
//! reconciler's remove-then-add fallback.

use super::DnsProvider;
use crate::core::dns::types::{AddRecord, DnsRecord, RecordId, is_under_managed_sub_domain};
use crate::core::errors::McAdminError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const API_BASE: &str = "https://dnsapi.cn";

#[derive(Debug, Deserialize)]
struct ApiStatus {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RecordListResponse {
    status: ApiStatus,
    #[serde(default)]
    records: Vec<RecordEntry>,
}

#[derive(Debug, Deserialize)]
struct RecordEntry {
    id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    value: String,
    ttl: String,
}

#[derive(Debug, Deserialize)]
struct StatusOnlyResponse {
    status: ApiStatus,
}

pub struct DnspodProvider {
    domain: String,
    login_token: String,
    http: reqwest::Client,
}

impl DnspodProvider {
    pub fn new(domain: String, id: String, key: String) -> Self {
        Self {
            domain,
            login_token: format!("{id},{key}"),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
        }
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        mut form: Vec<(&str, String)>,
    ) -> Result<T, McAdminError> {
        form.push(("login_token", self.login_token.clone()));
        form.push(("format", "json".to_string()));
        form.push(("domain", self.domain.clone()));

        debug!("DNSPod {endpoint}");
        let response = self
            .http
            .post(format!("{API_BASE}/{endpoint}"))
            .form(&form)
            .send()
            .await
            .map_err(|e| McAdminError::DnsProvider(format!("DNSPod request failed: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| McAdminError::DnsProvider(format!("DNSPod response invalid: {e}")))
    }
}

fn check_status(status: &ApiStatus, endpoint: &str) -> Result<(), McAdminError> {
    // Code "1" is success; "10" is the harmless "no records" on Record.List.
    if status.code == "1" || status.code == "10" {
        return Ok(());
    }
    Err(McAdminError::DnsProvider(format!(
        "DNSPod {endpoint} failed ({}): {}",
        status.code, status.message
    )))
}

#[async_trait]
impl DnsProvider for DnspodProvider {
    fn domain(&self) -> &str {
        &self.domain
    }

    fn supports_batch_update(&self) -> bool {
        false
    }

    async fn list_relevant_records(
        &self,
        managed_sub_domain: &str,
    ) -> Result<Vec<DnsRecord>, McAdminError> {
        let response: RecordListResponse = self.post_form("Record.List", vec![]).await?;
        check_status(&response.status, "Record.List")?;

        Ok(response
            .records
            .into_iter()
            .filter(|record| is_under_managed_sub_domain(&record.name, managed_sub_domain))
            .map(|record| DnsRecord {
                sub_domain: record.name,
                record_type: record.record_type,
                value: record.value,
                ttl: record.ttl.parse().unwrap_or(600),
                record_id: record.id,
            })
            .collect())
    }

    async fn add_records(&self, records: &[AddRecord]) -> Result<(), McAdminError> {
        for record in records {
            let response: StatusOnlyResponse = self
                .post_form(
                    "Record.Create",
                    vec![
                        ("sub_domain", record.sub_domain.clone()),
                        ("record_type", record.record_type.clone()),
                        ("record_line", "默认".to_string()),
                        ("value", record.value.clone()),
                        ("ttl", record.ttl.to_string()),
                    ],
                )
                .await?;
            check_status(&response.status, "Record.Create")?;
        }
        Ok(())
    }

    async fn remove_records(&self, record_ids: &[RecordId]) -> Result<(), McAdminError> {
        for record_id in record_ids {
            let response: StatusOnlyResponse = self
                .post_form("Record.Remove", vec![("record_id", record_id.clone())])
                .await?;
            check_status(&response.status, "Record.Remove")?;
        }
        Ok(())
    }
}
