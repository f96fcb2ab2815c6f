// src/core/dns/providers/mod.rs

//! The provider abstraction. Provider-specific auth and API quirks live in
//! the implementations; the reconciler only sees this trait.

pub mod dnspod;
pub mod huawei;

use crate::core::dns::types::{AddRecord, DnsRecord, RecordId};
use crate::core::errors::McAdminError;
use async_trait::async_trait;

#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// The apex domain this provider manages.
    fn domain(&self) -> &str;

    /// Whether `update_records_batch` is available; without it the
    /// reconciler falls back to remove-then-add.
    fn supports_batch_update(&self) -> bool;

    /// Current records restricted to the managed sub-domain.
    async fn list_relevant_records(
        &self,
        managed_sub_domain: &str,
    ) -> Result<Vec<DnsRecord>, McAdminError>;

    async fn add_records(&self, records: &[AddRecord]) -> Result<(), McAdminError>;

    async fn remove_records(&self, record_ids: &[RecordId]) -> Result<(), McAdminError>;

    /// In-place update of existing records (new content under old ids).
    async fn update_records_batch(&self, _records: &[DnsRecord]) -> Result<(), McAdminError> {
        Err(McAdminError::DnsProvider(
            "provider does not support batch updates".to_string(),
        ))
    }
}
