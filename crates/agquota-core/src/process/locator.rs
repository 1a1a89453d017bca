//! Locate the language server process by executable name.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::command::{powershell, ps_quote, run};
use crate::error::{self, DiscoveryError};

/// One way of finding a PID by executable name
#[async_trait]
pub trait ProcessStrategy: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Find the first process whose executable name contains `pattern`.
    ///
    /// `Ok(None)` means the strategy ran but found nothing.
    async fn find(&self, pattern: &str, timeout: Duration) -> Result<Option<u32>>;
}

/// Tries each strategy in order and returns the first PID found
pub struct ProcessLocator {
    process_name: String,
    strategies: Vec<Box<dyn ProcessStrategy>>,
    timeout: Duration,
}

impl ProcessLocator {
    pub fn new(
        process_name: impl Into<String>,
        strategies: Vec<Box<dyn ProcessStrategy>>,
        timeout: Duration,
    ) -> Self {
        Self {
            process_name: process_name.into(),
            strategies,
            timeout,
        }
    }

    /// Name fragment this locator searches for
    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// Find the language server PID
    pub async fn locate(&self) -> error::Result<u32> {
        for strategy in &self.strategies {
            match strategy.find(&self.process_name, self.timeout).await {
                Ok(Some(pid)) => {
                    debug!("Process lookup: {} found pid {}", strategy.name(), pid);
                    return Ok(pid);
                }
                Ok(None) => debug!("Process lookup: {} found nothing", strategy.name()),
                Err(e) => debug!("Process lookup: {} failed: {:#}", strategy.name(), e),
            }
        }

        Err(DiscoveryError::ProcessNotFound {
            name: self.process_name.clone(),
        })
    }
}

/// Final path component, accepting both separators
fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// `pgrep -l <pattern>`: name-filtered query (Linux, macOS, BSD)
pub struct PgrepStrategy;

#[async_trait]
impl ProcessStrategy for PgrepStrategy {
    fn name(&self) -> &'static str {
        "pgrep"
    }

    async fn find(&self, pattern: &str, timeout: Duration) -> Result<Option<u32>> {
        let escaped = regex::escape(pattern);
        let stdout = run("pgrep", &["-l", &escaped], timeout).await?;
        Ok(parse_pid_name_lines(&stdout, pattern))
    }
}

/// `ps -A -o pid=,comm=`: full process list filtered here
pub struct PsListStrategy;

#[async_trait]
impl ProcessStrategy for PsListStrategy {
    fn name(&self) -> &'static str {
        "ps"
    }

    async fn find(&self, pattern: &str, timeout: Duration) -> Result<Option<u32>> {
        let stdout = run("ps", &["-A", "-o", "pid=,comm="], timeout).await?;
        Ok(parse_pid_name_lines(&stdout, pattern))
    }
}

/// Parse `<pid> <name>` lines (pgrep -l and ps output share this shape)
pub(crate) fn parse_pid_name_lines(output: &str, pattern: &str) -> Option<u32> {
    output.lines().find_map(|line| {
        let (pid, name) = line.trim().split_once(char::is_whitespace)?;
        let pid: u32 = pid.parse().ok()?;
        basename(name.trim()).contains(pattern).then_some(pid)
    })
}

/// Scan `/proc/<pid>/cmdline` directly; avoids the 15-byte `comm` limit
#[cfg(target_os = "linux")]
pub struct ProcFsStrategy;

#[cfg(target_os = "linux")]
#[async_trait]
impl ProcessStrategy for ProcFsStrategy {
    fn name(&self) -> &'static str {
        "procfs"
    }

    async fn find(&self, pattern: &str, _timeout: Duration) -> Result<Option<u32>> {
        let pattern = pattern.to_string();
        let pid = tokio::task::spawn_blocking(move || scan_proc(&pattern)).await??;
        Ok(pid)
    }
}

#[cfg(target_os = "linux")]
fn scan_proc(pattern: &str) -> Result<Option<u32>> {
    let mut pids: Vec<u32> = std::fs::read_dir("/proc")?
        .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse().ok())
        .collect();
    pids.sort_unstable();

    Ok(pids.into_iter().find(|pid| {
        // Processes can vanish mid-scan; unreadable entries are skipped
        std::fs::read(format!("/proc/{}/cmdline", pid))
            .ok()
            .and_then(|raw| {
                let argv0 = raw.split(|&b| b == 0).next()?;
                let argv0 = std::str::from_utf8(argv0).ok()?;
                Some(basename(argv0).contains(pattern))
            })
            .unwrap_or(false)
    }))
}

/// PowerShell `Get-Process`, filtered by name on the Windows side
pub struct GetProcessStrategy;

#[async_trait]
impl ProcessStrategy for GetProcessStrategy {
    fn name(&self) -> &'static str {
        "Get-Process"
    }

    async fn find(&self, pattern: &str, timeout: Duration) -> Result<Option<u32>> {
        let script = format!(
            "Get-Process | Where-Object {{ $_.ProcessName.Contains({}) }} | Select-Object -First 1 -ExpandProperty Id",
            ps_quote(pattern)
        );
        let stdout = powershell(&script, timeout).await?;
        Ok(stdout.lines().find_map(|l| l.trim().parse().ok()))
    }
}

/// `tasklist /FO CSV /NH`: full image list filtered here
pub struct TasklistStrategy;

#[async_trait]
impl ProcessStrategy for TasklistStrategy {
    fn name(&self) -> &'static str {
        "tasklist"
    }

    async fn find(&self, pattern: &str, timeout: Duration) -> Result<Option<u32>> {
        let stdout = run("tasklist", &["/FO", "CSV", "/NH"], timeout).await?;
        Ok(parse_tasklist_csv(&stdout, pattern))
    }
}

/// Parse `"image.exe","1234","Console","1","10,000 K"` rows
pub(crate) fn parse_tasklist_csv(output: &str, pattern: &str) -> Option<u32> {
    output.lines().find_map(|line| {
        let mut fields = line.trim().trim_matches('"').split("\",\"");
        let image = fields.next()?;
        let pid = fields.next()?.parse().ok()?;
        image.contains(pattern).then_some(pid)
    })
}
