// src/core/cron/restart_slots.rs

//! The conflict-aware restart time finder.
//!
//! Backups are IO heavy, so auto-scheduled restarts must not land on minutes
//! any backup job can fire on. The finder parses the minute field of every
//! active or paused backup job and steps through 5-minute slots from the
//! configured start time until it finds a free one.

use super::manager::{CronJobFilter, CronManager};
use super::params::{BACKUP_IDENTIFIER, RESTART_SERVER_IDENTIFIER};
use crate::core::db::models::CronJobStatus;
use crate::core::errors::McAdminError;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Parses a cron minute field into the set of minutes it can fire on.
///
/// Supports `*`, single values, lists, ranges, `*/n`, `a-b/n` and the bare
/// `a/n` (stepping from `a` to 59).
pub fn parse_cron_minute_field(minute_field: &str) -> Result<BTreeSet<u32>, McAdminError> {
    let mut minutes = BTreeSet::new();

    if minute_field.trim() == "*" {
        minutes.extend(0..60);
        return Ok(minutes);
    }

    for part in minute_field.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(invalid(minute_field));
        }

        if let Some((base, step)) = part.split_once('/') {
            let step: u32 = step.parse().map_err(|_| invalid(minute_field))?;
            if step == 0 {
                return Err(invalid(minute_field));
            }
            let (start, end) = if base == "*" {
                (0, 59)
            } else if let Some((start, end)) = base.split_once('-') {
                (parse_minute(start, minute_field)?, parse_minute(end, minute_field)?)
            } else {
                (parse_minute(base, minute_field)?, 59)
            };
            minutes.extend((start..=end).step_by(step as usize));
        } else if let Some((start, end)) = part.split_once('-') {
            let start = parse_minute(start, minute_field)?;
            let end = parse_minute(end, minute_field)?;
            if start > end {
                return Err(invalid(minute_field));
            }
            minutes.extend(start..=end);
        } else {
            minutes.insert(parse_minute(part, minute_field)?);
        }
    }

    Ok(minutes)
}

fn parse_minute(value: &str, field: &str) -> Result<u32, McAdminError> {
    let minute: u32 = value.trim().parse().map_err(|_| invalid(field))?;
    if minute > 59 {
        return Err(invalid(field));
    }
    Ok(minute)
}

fn invalid(field: &str) -> McAdminError {
    McAdminError::InvalidCronExpression(format!("invalid minute field '{field}'"))
}

/// Finds the first 5-minute slot from the start time whose minute is not in
/// the blocked set. Wraps at 24h; when every slot is blocked the start time
/// itself is returned as the fallback.
pub fn find_next_available_slot(
    start_hour: u32,
    start_minute: u32,
    blocked_minutes: &BTreeSet<u32>,
) -> (u32, u32) {
    let mut hour = start_hour;
    // Round down to the current 5-minute interval.
    let mut minute = (start_minute / 5) * 5;

    for _ in 0..(24 * 60 / 5) {
        if !blocked_minutes.contains(&minute) {
            return (hour, minute);
        }
        minute += 5;
        if minute >= 60 {
            minute = 0;
            hour = (hour + 1) % 24;
        }
    }

    (start_hour, start_minute)
}

/// Finds restart slots against the live cron table.
pub struct RestartScheduler {
    cron_manager: Arc<CronManager>,
    start_hour: u32,
    start_minute: u32,
}

impl RestartScheduler {
    pub fn new(cron_manager: Arc<CronManager>, start: (u32, u32)) -> Self {
        Self {
            cron_manager,
            start_hour: start.0,
            start_minute: start.1,
        }
    }

    async fn minutes_for_identifier(
        &self,
        identifier: &str,
    ) -> Result<BTreeSet<u32>, McAdminError> {
        let jobs = self
            .cron_manager
            .get_all_cronjobs(&CronJobFilter {
                identifier: Some(identifier.to_string()),
                statuses: Some(vec![CronJobStatus::Active, CronJobStatus::Paused]),
                name: None,
            })
            .await?;

        let mut minutes = BTreeSet::new();
        for job in jobs {
            if let Some(minute_field) = job.cron.split_whitespace().next()
                && let Ok(parsed) = parse_cron_minute_field(minute_field)
            {
                minutes.extend(parsed);
            }
        }
        Ok(minutes)
    }

    /// Minutes any backup job can fire on.
    pub async fn get_backup_minutes(&self) -> Result<BTreeSet<u32>, McAdminError> {
        self.minutes_for_identifier(BACKUP_IDENTIFIER).await
    }

    /// Minutes any restart job can fire on.
    pub async fn get_restart_minutes(&self) -> Result<BTreeSet<u32>, McAdminError> {
        self.minutes_for_identifier(RESTART_SERVER_IDENTIFIER).await
    }

    /// The next `(hour, minute)` restart slot that avoids all backup minutes.
    pub async fn find_next_available_restart_time(&self) -> Result<(u32, u32), McAdminError> {
        let backup_minutes = self.get_backup_minutes().await?;
        Ok(find_next_available_slot(
            self.start_hour,
            self.start_minute,
            &backup_minutes,
        ))
    }

    /// A full 5-field cron expression for a conflict-free daily restart. The
    /// day/month/weekday patterns default to `*` but can be overridden.
    pub async fn generate_restart_cron(
        &self,
        day_pattern: &str,
        month_pattern: &str,
        weekday_pattern: &str,
    ) -> Result<String, McAdminError> {
        let (hour, minute) = self.find_next_available_restart_time().await?;
        Ok(format!(
            "{minute:02} {hour:02} {day_pattern} {month_pattern} {weekday_pattern}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[u32]) -> BTreeSet<u32> {
        values.iter().copied().collect()
    }

    #[test]
    fn parses_minute_dialect() {
        assert_eq!(parse_cron_minute_field("30").unwrap(), set(&[30]));
        assert_eq!(parse_cron_minute_field("0,15,30").unwrap(), set(&[0, 15, 30]));
        assert_eq!(parse_cron_minute_field("0-3").unwrap(), set(&[0, 1, 2, 3]));
        assert_eq!(
            parse_cron_minute_field("*/15").unwrap(),
            set(&[0, 15, 30, 45])
        );
        assert_eq!(
            parse_cron_minute_field("0-30/10").unwrap(),
            set(&[0, 10, 20, 30])
        );
        assert_eq!(parse_cron_minute_field("50/5").unwrap(), set(&[50, 55]));
        assert_eq!(parse_cron_minute_field("*").unwrap().len(), 60);
    }

    #[test]
    fn parses_mixed_step_and_value() {
        // "*/5,2" is every fifth minute plus minute 2.
        let minutes = parse_cron_minute_field("*/5,2").unwrap();
        assert!(minutes.contains(&0));
        assert!(minutes.contains(&2));
        assert!(minutes.contains(&5));
        assert!(minutes.contains(&55));
        assert_eq!(minutes.len(), 13);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_cron_minute_field("60").is_err());
        assert!(parse_cron_minute_field("a").is_err());
        assert!(parse_cron_minute_field("5-1").is_err());
        assert!(parse_cron_minute_field("*/0").is_err());
        assert!(parse_cron_minute_field("").is_err());
    }

    #[test]
    fn finds_first_free_slot() {
        // Backup at minute 15: 06:00 is already free.
        assert_eq!(find_next_available_slot(6, 0, &set(&[15])), (6, 0));
        // Minutes 0 and 5 blocked: next candidate is 06:10.
        assert_eq!(find_next_available_slot(6, 0, &set(&[0, 5])), (6, 10));
        // Start minute rounds down to the 5-minute grid.
        assert_eq!(find_next_available_slot(6, 7, &set(&[])), (6, 5));
    }

    #[test]
    fn wraps_across_midnight() {
        let blocked: BTreeSet<u32> = (0..60).filter(|m| *m != 0).collect();
        assert_eq!(find_next_available_slot(23, 55, &blocked), (0, 0));
    }

    #[test]
    fn all_blocked_falls_back_to_start_time() {
        let blocked: BTreeSet<u32> = (0..60).collect();
        assert_eq!(find_next_available_slot(6, 0, &blocked), (6, 0));
        assert_eq!(find_next_available_slot(6, 7, &blocked), (6, 7));
    }
}
