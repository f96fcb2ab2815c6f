// tests/property_test.rs

//! Property-based tests for the pure planning logic: the cron minute-field
//! parser, the restart slot finder, and the DNS diff.

use mc_admin::core::cron::restart_slots::{find_next_available_slot, parse_cron_minute_field};
use mc_admin::core::dns::types::{AddRecord, DnsRecord, diff_dns_records};
use proptest::prelude::*;
use std::collections::BTreeSet;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        ..ProptestConfig::default()
    })]

    #[test]
    fn parsed_minutes_are_always_in_range(minute in 0u32..60, step in 1u32..60) {
        for field in [
            minute.to_string(),
            format!("*/{step}"),
            format!("{minute}/{step}"),
            format!("0-{minute}"),
        ] {
            let minutes = parse_cron_minute_field(&field).unwrap();
            prop_assert!(!minutes.is_empty(), "field {field} parsed to nothing");
            prop_assert!(minutes.iter().all(|m| *m < 60), "field {field} escaped 0-59");
        }
    }

    #[test]
    fn step_fields_step_correctly(step in 1u32..30) {
        let minutes = parse_cron_minute_field(&format!("*/{step}")).unwrap();
        let expected: BTreeSet<u32> = (0..60).step_by(step as usize).collect();
        prop_assert_eq!(minutes, expected);
    }

    #[test]
    fn slot_finder_never_returns_a_blocked_minute(
        start_hour in 0u32..24,
        start_minute in 0u32..60,
        blocked in proptest::collection::btree_set(0u32..60, 0..59),
    ) {
        // As long as at least one 5-minute slot is free, the result must be
        // free and on the 5-minute grid.
        let has_free_slot = (0..60).step_by(5).any(|m| !blocked.contains(&m));
        prop_assume!(has_free_slot);

        let (hour, minute) = find_next_available_slot(start_hour, start_minute, &blocked);
        prop_assert!(hour < 24);
        prop_assert!(!blocked.contains(&minute));
        prop_assert_eq!(minute % 5, 0);
    }

    #[test]
    fn fully_blocked_grid_falls_back_to_start(
        start_hour in 0u32..24,
        start_minute in 0u32..60,
    ) {
        let blocked: BTreeSet<u32> = (0..60).collect();
        let slot = find_next_available_slot(start_hour, start_minute, &blocked);
        prop_assert_eq!(slot, (start_hour, start_minute));
    }

    #[test]
    fn dns_diff_of_identical_sets_is_empty(
        entries in proptest::collection::btree_map(
            "[a-z]{1,8}\\.mc",
            ("[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}", 1u32..7200),
            0..20,
        )
    ) {
        let current: Vec<DnsRecord> = entries
            .iter()
            .enumerate()
            .map(|(i, (sub, (value, ttl)))| DnsRecord {
                sub_domain: sub.clone(),
                record_type: "A".to_string(),
                value: value.clone(),
                ttl: *ttl,
                record_id: i.to_string(),
            })
            .collect();
        let target: Vec<AddRecord> = entries
            .iter()
            .map(|(sub, (value, ttl))| AddRecord {
                sub_domain: sub.clone(),
                record_type: "A".to_string(),
                value: value.clone(),
                ttl: *ttl,
            })
            .collect();

        prop_assert!(diff_dns_records(&current, &target).is_empty());
    }

    #[test]
    fn dns_diff_accounts_for_every_record(
        current_subs in proptest::collection::btree_set("[a-z]{1,6}\\.mc", 0..15),
        target_subs in proptest::collection::btree_set("[a-z]{1,6}\\.mc", 0..15),
    ) {
        let current: Vec<DnsRecord> = current_subs
            .iter()
            .enumerate()
            .map(|(i, sub)| DnsRecord {
                sub_domain: sub.clone(),
                record_type: "A".to_string(),
                value: "1.2.3.4".to_string(),
                ttl: 15,
                record_id: i.to_string(),
            })
            .collect();
        let target: Vec<AddRecord> = target_subs
            .iter()
            .map(|sub| AddRecord {
                sub_domain: sub.clone(),
                record_type: "A".to_string(),
                value: "1.2.3.4".to_string(),
                ttl: 15,
            })
            .collect();

        let diff = diff_dns_records(&current, &target);
        // Additions are exactly target minus current, removals the reverse;
        // identical content never updates.
        prop_assert_eq!(diff.to_add.len(), target_subs.difference(&current_subs).count());
        prop_assert_eq!(diff.to_remove.len(), current_subs.difference(&target_subs).count());
        prop_assert!(diff.to_update.is_empty());
    }
}
