// src/core/instance/stats.rs

//! Runtime statistics for a container, read from cgroup v2 and /proc.

use crate::core::errors::McAdminError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Anonymous and file-backed memory charged to the container's cgroup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub anon_bytes: u64,
    pub file_bytes: u64,
}

impl MemoryStats {
    pub fn total_bytes(&self) -> u64 {
        self.anon_bytes + self.file_bytes
    }
}

/// Cumulative block IO byte counters for the container's cgroup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockIoStats {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Cumulative network byte counters for the container's network namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub receive_bytes: u64,
    pub send_bytes: u64,
}

/// Used/total/available bytes of the filesystem holding a data directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskSpaceInfo {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl DiskSpaceInfo {
    pub fn usage_percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.used_bytes as f64 / self.total_bytes as f64) * 100.0
    }
}

/// Candidate cgroup v2 directories for a docker container id.
fn cgroup_candidates(container_id: &str) -> Vec<PathBuf> {
    vec![
        PathBuf::from(format!(
            "/sys/fs/cgroup/system.slice/docker-{container_id}.scope"
        )),
        PathBuf::from(format!("/sys/fs/cgroup/docker/{container_id}")),
    ]
}

async fn read_cgroup_file(container_id: &str, name: &str) -> Result<String, McAdminError> {
    for candidate in cgroup_candidates(container_id) {
        let path = candidate.join(name);
        if let Ok(content) = tokio::fs::read_to_string(&path).await {
            return Ok(content);
        }
    }
    Err(McAdminError::NotFound(format!(
        "cgroup file '{name}' for container {container_id}"
    )))
}

/// Reads `memory.stat` and extracts the anon and file counters.
pub async fn read_memory_stats(container_id: &str) -> Result<MemoryStats, McAdminError> {
    let content = read_cgroup_file(container_id, "memory.stat").await?;
    let mut stats = MemoryStats::default();
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("anon"), Some(value)) => stats.anon_bytes = value.parse().unwrap_or(0),
            (Some("file"), Some(value)) => stats.file_bytes = value.parse().unwrap_or(0),
            _ => {}
        }
    }
    Ok(stats)
}

/// Reads `io.stat` and sums rbytes/wbytes across devices.
pub async fn read_block_io_stats(container_id: &str) -> Result<BlockIoStats, McAdminError> {
    let content = read_cgroup_file(container_id, "io.stat").await?;
    let mut stats = BlockIoStats::default();
    for line in content.lines() {
        for field in line.split_whitespace() {
            if let Some(value) = field.strip_prefix("rbytes=") {
                stats.read_bytes += value.parse::<u64>().unwrap_or(0);
            } else if let Some(value) = field.strip_prefix("wbytes=") {
                stats.write_bytes += value.parse::<u64>().unwrap_or(0);
            }
        }
    }
    Ok(stats)
}

/// Sums rx/tx bytes over all interfaces except loopback for the process's
/// network namespace.
pub async fn read_network_stats(pid: u32) -> Result<NetworkStats, McAdminError> {
    let content = tokio::fs::read_to_string(format!("/proc/{pid}/net/dev")).await?;
    let mut stats = NetworkStats::default();
    // First two lines are headers.
    for line in content.lines().skip(2) {
        let Some((iface, rest)) = line.split_once(':') else {
            continue;
        };
        if iface.trim() == "lo" {
            continue;
        }
        let fields: Vec<&str> = rest.split_whitespace().collect();
        if fields.len() >= 9 {
            stats.receive_bytes += fields[0].parse::<u64>().unwrap_or(0);
            stats.send_bytes += fields[8].parse::<u64>().unwrap_or(0);
        }
    }
    Ok(stats)
}

async fn read_process_jiffies(pid: u32) -> Result<u64, McAdminError> {
    let content = tokio::fs::read_to_string(format!("/proc/{pid}/stat")).await?;
    // Field 2 is the comm and may contain spaces; everything after the
    // closing paren is positional.
    let after_comm = content
        .rsplit_once(')')
        .map(|(_, rest)| rest)
        .ok_or_else(|| McAdminError::Internal(format!("malformed /proc/{pid}/stat")))?;
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    // utime and stime are fields 14 and 15 of the full stat line, which are
    // indexes 11 and 12 after the comm.
    let utime: u64 = fields
        .get(11)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| McAdminError::Internal(format!("missing utime in /proc/{pid}/stat")))?;
    let stime: u64 = fields
        .get(12)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| McAdminError::Internal(format!("missing stime in /proc/{pid}/stat")))?;
    Ok(utime + stime)
}

/// CPU usage of the process over a one second sample, in percent of a single
/// core.
pub async fn sample_process_cpu_percent(pid: u32) -> Result<f64, McAdminError> {
    const CLOCK_TICKS_PER_SECOND: f64 = 100.0;
    let before = read_process_jiffies(pid).await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    let after = read_process_jiffies(pid).await?;
    Ok((after.saturating_sub(before)) as f64 / CLOCK_TICKS_PER_SECOND * 100.0)
}

/// Disk usage of the data directory (du) plus filesystem totals (df).
pub async fn read_disk_space(data_path: &Path) -> Result<DiskSpaceInfo, McAdminError> {
    let du_output = run_command("du", &["-sb", &data_path.to_string_lossy()]).await?;
    let used_bytes = du_output
        .split_whitespace()
        .next()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let df_output = run_command("df", &["-B1", &data_path.to_string_lossy()]).await?;
    let data_line = df_output
        .lines()
        .nth(1)
        .ok_or_else(|| McAdminError::Internal(format!("unparseable df output: {df_output}")))?;
    let fields: Vec<&str> = data_line.split_whitespace().collect();
    if fields.len() < 4 {
        return Err(McAdminError::Internal(format!(
            "unparseable df line: {data_line}"
        )));
    }
    let total_bytes = fields[1]
        .parse()
        .map_err(|_| McAdminError::Internal(format!("unparseable df total: {}", fields[1])))?;
    let available_bytes = fields[3]
        .parse()
        .map_err(|_| McAdminError::Internal(format!("unparseable df avail: {}", fields[3])))?;

    Ok(DiskSpaceInfo {
        used_bytes,
        total_bytes,
        available_bytes,
    })
}

async fn run_command(program: &str, args: &[&str]) -> Result<String, McAdminError> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await?;
    if !output.status.success() {
        return Err(McAdminError::Internal(format!(
            "{program} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
