// src/core/dns/types.rs

//! Record types and the pure diff used by the reconciler.

use std::collections::HashMap;

pub type RecordId = String;

/// A record as returned by a provider, carrying its provider-side id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub sub_domain: String,
    pub record_type: String,
    pub value: String,
    pub ttl: u32,
    pub record_id: RecordId,
}

/// A record to be created at a provider.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AddRecord {
    pub sub_domain: String,
    pub record_type: String,
    pub value: String,
    pub ttl: u32,
}

/// The minimal set of mutations that converges current onto target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordDiff {
    pub to_add: Vec<AddRecord>,
    pub to_remove: Vec<RecordId>,
    /// Existing records whose value or ttl changed; carries the new content
    /// under the old record id.
    pub to_update: Vec<DnsRecord>,
}

impl RecordDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty() && self.to_update.is_empty()
    }
}

/// Records are keyed by `(sub_domain, record_type)`; a key present on both
/// sides with differing value or ttl becomes an update.
pub fn diff_dns_records(current: &[DnsRecord], target: &[AddRecord]) -> RecordDiff {
    let current_by_key: HashMap<(&str, &str), &DnsRecord> = current
        .iter()
        .map(|record| ((record.sub_domain.as_str(), record.record_type.as_str()), record))
        .collect();
    let target_keys: std::collections::HashSet<(&str, &str)> = target
        .iter()
        .map(|record| (record.sub_domain.as_str(), record.record_type.as_str()))
        .collect();

    let mut diff = RecordDiff::default();

    for new_record in target {
        let key = (new_record.sub_domain.as_str(), new_record.record_type.as_str());
        match current_by_key.get(&key) {
            Some(old_record) => {
                if old_record.value != new_record.value || old_record.ttl != new_record.ttl {
                    diff.to_update.push(DnsRecord {
                        sub_domain: new_record.sub_domain.clone(),
                        record_type: new_record.record_type.clone(),
                        value: new_record.value.clone(),
                        ttl: new_record.ttl,
                        record_id: old_record.record_id.clone(),
                    });
                }
            }
            None => diff.to_add.push(new_record.clone()),
        }
    }

    for old_record in current {
        let key = (old_record.sub_domain.as_str(), old_record.record_type.as_str());
        if !target_keys.contains(&key) {
            diff.to_remove.push(old_record.record_id.clone());
        }
    }

    diff
}

/// Whether a record's sub-domain lives under the managed sub-domain (equal
/// to it, or any label chain ending in it).
pub fn is_under_managed_sub_domain(sub_domain: &str, managed_sub_domain: &str) -> bool {
    sub_domain == managed_sub_domain || sub_domain.ends_with(&format!(".{managed_sub_domain}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current(sub: &str, rtype: &str, value: &str, ttl: u32, id: &str) -> DnsRecord {
        DnsRecord {
            sub_domain: sub.to_string(),
            record_type: rtype.to_string(),
            value: value.to_string(),
            ttl,
            record_id: id.to_string(),
        }
    }

    fn target(sub: &str, rtype: &str, value: &str, ttl: u32) -> AddRecord {
        AddRecord {
            sub_domain: sub.to_string(),
            record_type: rtype.to_string(),
            value: value.to_string(),
            ttl,
        }
    }

    #[test]
    fn identical_sets_produce_empty_diff() {
        let old = vec![current("*.mc", "A", "1.2.3.4", 15, "1")];
        let new = vec![target("*.mc", "A", "1.2.3.4", 15)];
        assert!(diff_dns_records(&old, &new).is_empty());
    }

    #[test]
    fn value_change_is_an_update_under_old_id() {
        let old = vec![current("*.mc", "A", "1.2.3.4", 15, "42")];
        let new = vec![target("*.mc", "A", "5.6.7.8", 15)];
        let diff = diff_dns_records(&old, &new);
        assert!(diff.to_add.is_empty());
        assert!(diff.to_remove.is_empty());
        assert_eq!(diff.to_update.len(), 1);
        assert_eq!(diff.to_update[0].record_id, "42");
        assert_eq!(diff.to_update[0].value, "5.6.7.8");
    }

    #[test]
    fn ttl_change_is_an_update() {
        let old = vec![current("*.mc", "A", "1.2.3.4", 600, "42")];
        let new = vec![target("*.mc", "A", "1.2.3.4", 15)];
        assert_eq!(diff_dns_records(&old, &new).to_update.len(), 1);
    }

    #[test]
    fn disjoint_sets_add_and_remove() {
        let old = vec![current("_minecraft._tcp.old.mc", "SRV", "0 5 1 old.mc.ex.com", 15, "7")];
        let new = vec![target("_minecraft._tcp.new.mc", "SRV", "0 5 1 new.mc.ex.com", 15)];
        let diff = diff_dns_records(&old, &new);
        assert_eq!(diff.to_add.len(), 1);
        assert_eq!(diff.to_remove, vec!["7".to_string()]);
        assert!(diff.to_update.is_empty());
    }

    #[test]
    fn same_sub_domain_different_type_are_distinct_keys() {
        let old = vec![current("mc", "A", "1.2.3.4", 15, "1")];
        let new = vec![target("mc", "AAAA", "::1", 15)];
        let diff = diff_dns_records(&old, &new);
        assert_eq!(diff.to_add.len(), 1);
        assert_eq!(diff.to_remove.len(), 1);
    }

    #[test]
    fn managed_sub_domain_matching() {
        assert!(is_under_managed_sub_domain("mc", "mc"));
        assert!(is_under_managed_sub_domain("*.mc", "mc"));
        assert!(is_under_managed_sub_domain("_minecraft._tcp.survival.mc", "mc"));
        assert!(!is_under_managed_sub_domain("mail", "mc"));
        assert!(!is_under_managed_sub_domain("mcx", "mc"));
    }
}
