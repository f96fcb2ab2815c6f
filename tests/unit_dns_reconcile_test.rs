// tests/unit_dns_reconcile_test.rs

//! Reconcile convergence against an in-memory fake provider.

use async_trait::async_trait;
use mc_admin::core::dns::providers::DnsProvider;
use mc_admin::core::dns::types::{
    AddRecord, DnsRecord, RecordDiff, RecordId, diff_dns_records, is_under_managed_sub_domain,
};
use mc_admin::core::dns::{ResolvedAddress, apply_record_diff, generate_dns_records, generate_routes};
use mc_admin::core::errors::McAdminError;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// An in-memory provider that records every mutation.
struct FakeProvider {
    records: Mutex<Vec<DnsRecord>>,
    next_id: AtomicU64,
    mutations: AtomicU64,
    batch_update: bool,
}

impl FakeProvider {
    fn new(batch_update: bool) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            mutations: AtomicU64::new(0),
            batch_update,
        }
    }

    fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsProvider for FakeProvider {
    fn domain(&self) -> &str {
        "ex.com"
    }

    fn supports_batch_update(&self) -> bool {
        self.batch_update
    }

    async fn list_relevant_records(
        &self,
        managed_sub_domain: &str,
    ) -> Result<Vec<DnsRecord>, McAdminError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| is_under_managed_sub_domain(&r.sub_domain, managed_sub_domain))
            .cloned()
            .collect())
    }

    async fn add_records(&self, records: &[AddRecord]) -> Result<(), McAdminError> {
        self.mutations.fetch_add(records.len() as u64, Ordering::SeqCst);
        let mut stored = self.records.lock().unwrap();
        for record in records {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            stored.push(DnsRecord {
                sub_domain: record.sub_domain.clone(),
                record_type: record.record_type.clone(),
                value: record.value.clone(),
                ttl: record.ttl,
                record_id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn remove_records(&self, record_ids: &[RecordId]) -> Result<(), McAdminError> {
        self.mutations.fetch_add(record_ids.len() as u64, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .retain(|record| !record_ids.contains(&record.record_id));
        Ok(())
    }

    async fn update_records_batch(&self, records: &[DnsRecord]) -> Result<(), McAdminError> {
        self.mutations.fetch_add(records.len() as u64, Ordering::SeqCst);
        let mut stored = self.records.lock().unwrap();
        for updated in records {
            if let Some(existing) = stored
                .iter_mut()
                .find(|record| record.record_id == updated.record_id)
            {
                existing.value = updated.value.clone();
                existing.ttl = updated.ttl;
            }
        }
        Ok(())
    }
}

fn target_for_one_server() -> Vec<AddRecord> {
    let addresses = vec![ResolvedAddress {
        name: "*".to_string(),
        record_type: "A".to_string(),
        value: "1.2.3.4".to_string(),
        port: 25565,
    }];
    let servers = BTreeMap::from([("survival".to_string(), 25565u16)]);
    generate_dns_records(&addresses, &servers, "mc", 15, "ex.com")
}

async fn converge(provider: &FakeProvider, target: &[AddRecord]) -> RecordDiff {
    let current = provider.list_relevant_records("mc").await.unwrap();
    let diff = diff_dns_records(&current, target);
    apply_record_diff(provider, &diff).await.unwrap();
    diff
}

#[tokio::test]
async fn update_converges_and_second_run_is_a_no_op() {
    let provider = FakeProvider::new(false);
    let target = target_for_one_server();

    converge(&provider, &target).await;

    let records = provider.list_relevant_records("mc").await.unwrap();
    assert_eq!(records.len(), 2);
    let wildcard = records.iter().find(|r| r.sub_domain == "*.mc").unwrap();
    assert_eq!(wildcard.record_type, "A");
    assert_eq!(wildcard.value, "1.2.3.4");
    assert_eq!(wildcard.ttl, 15);
    let srv = records
        .iter()
        .find(|r| r.sub_domain == "_minecraft._tcp.survival.mc")
        .unwrap();
    assert_eq!(srv.record_type, "SRV");
    assert_eq!(srv.value, "0 5 25565 survival.mc.ex.com");

    // Second reconcile with the same target issues no provider mutations.
    let before = provider.mutation_count();
    let diff = converge(&provider, &target).await;
    assert!(diff.is_empty());
    assert_eq!(provider.mutation_count(), before);
}

#[tokio::test]
async fn records_outside_the_managed_sub_domain_are_untouched() {
    let provider = FakeProvider::new(false);
    provider
        .add_records(&[AddRecord {
            sub_domain: "mail".to_string(),
            record_type: "A".to_string(),
            value: "9.9.9.9".to_string(),
            ttl: 600,
        }])
        .await
        .unwrap();

    converge(&provider, &target_for_one_server()).await;

    let all = provider.records.lock().unwrap();
    assert!(all.iter().any(|record| record.sub_domain == "mail"));
}

#[tokio::test]
async fn value_change_converges_with_and_without_batch_support() {
    for batch in [true, false] {
        let provider = FakeProvider::new(batch);
        let mut target = target_for_one_server();
        converge(&provider, &target).await;

        // The public address changes.
        target[0].value = "5.6.7.8".to_string();
        converge(&provider, &target).await;

        let records = provider.list_relevant_records("mc").await.unwrap();
        let wildcard = records.iter().find(|r| r.sub_domain == "*.mc").unwrap();
        assert_eq!(wildcard.value, "5.6.7.8");

        let diff = converge(&provider, &target).await;
        assert!(diff.is_empty(), "batch={batch} should have converged");
    }
}

#[tokio::test]
async fn removed_server_records_are_cleaned_up() {
    let provider = FakeProvider::new(false);
    let addresses = vec![ResolvedAddress {
        name: "*".to_string(),
        record_type: "A".to_string(),
        value: "1.2.3.4".to_string(),
        port: 25565,
    }];
    let two = BTreeMap::from([
        ("survival".to_string(), 25565u16),
        ("creative".to_string(), 25570u16),
    ]);
    let one = BTreeMap::from([("survival".to_string(), 25565u16)]);

    converge(
        &provider,
        &generate_dns_records(&addresses, &two, "mc", 15, "ex.com"),
    )
    .await;
    assert_eq!(provider.list_relevant_records("mc").await.unwrap().len(), 3);

    converge(
        &provider,
        &generate_dns_records(&addresses, &one, "mc", 15, "ex.com"),
    )
    .await;
    let records = provider.list_relevant_records("mc").await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(!records
        .iter()
        .any(|record| record.sub_domain.contains("creative")));
}

#[tokio::test]
async fn routes_cover_every_address_server_pair() {
    let addresses = vec![ResolvedAddress {
        name: "*".to_string(),
        record_type: "A".to_string(),
        value: "1.2.3.4".to_string(),
        port: 25565,
    }];
    let servers = BTreeMap::from([("survival".to_string(), 25565u16)]);
    let routes = generate_routes(&addresses, &servers, "mc", "ex.com");
    assert_eq!(
        routes.get("survival.mc.ex.com").map(String::as_str),
        Some("localhost:25565")
    );
}
