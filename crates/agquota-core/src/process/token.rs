//! Recover the CSRF token from the language server's command line.

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::debug;

use super::command::{powershell, run};
use crate::error::{self, DiscoveryError};

/// Accepted flag spellings, highest priority first
const TOKEN_FLAGS: &[&str] = &["--csrf_token", "--csrf-token", "-csrf_token", "-csrf-token"];

/// One regex per flag, in [`TOKEN_FLAGS`] order.
///
/// The flag must start a word, and its value follows either `=` or
/// whitespace, optionally quoted. A value never starts with `-`, so a flag
/// given without a value does not swallow the next flag.
static TOKEN_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    TOKEN_FLAGS
        .iter()
        .map(|flag| {
            Regex::new(&format!(
                r#"(?:^|\s){}(?:=|\s+)["']?([^\s"'-][^\s"']*)"#,
                regex::escape(flag)
            ))
            .expect("Invalid token flag regex")
        })
        .collect()
});

/// One way of reading a process's full command line
#[async_trait]
pub trait CommandLineStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Read the command line of `pid`; `Ok(None)` when it is unavailable
    async fn command_line(&self, pid: u32, timeout: Duration) -> Result<Option<String>>;
}

/// Reads the command line of a PID and pulls the token out of it
pub struct TokenExtractor {
    strategies: Vec<Box<dyn CommandLineStrategy>>,
    timeout: Duration,
}

impl TokenExtractor {
    pub fn new(strategies: Vec<Box<dyn CommandLineStrategy>>, timeout: Duration) -> Self {
        Self {
            strategies,
            timeout,
        }
    }

    /// Full command line of `pid`, from the first strategy that returns one
    pub async fn command_line(&self, pid: u32) -> Option<String> {
        for strategy in &self.strategies {
            match strategy.command_line(pid, self.timeout).await {
                Ok(Some(cmdline)) if !cmdline.trim().is_empty() => return Some(cmdline),
                Ok(_) => debug!("Command line: {} returned nothing for {}", strategy.name(), pid),
                Err(e) => debug!("Command line: {} failed for {}: {:#}", strategy.name(), pid, e),
            }
        }
        None
    }

    /// Extract the CSRF token for `pid`
    pub async fn extract(&self, pid: u32) -> error::Result<String> {
        self.command_line(pid)
            .await
            .and_then(|cmdline| find_token(&cmdline))
            .ok_or(DiscoveryError::TokenNotFound { pid })
    }
}

/// Search a command line for the token, trying flag spellings in priority order
pub fn find_token(cmdline: &str) -> Option<String> {
    TOKEN_PATTERNS
        .iter()
        .find_map(|re| re.captures(cmdline))
        .map(|caps| caps[1].to_string())
}

/// Mask a token for logs and diagnostics, keeping the first four characters
pub fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    format!("{}…", visible)
}

/// `/proc/<pid>/cmdline` (Linux)
#[cfg(target_os = "linux")]
pub struct ProcCmdlineStrategy;

#[cfg(target_os = "linux")]
#[async_trait]
impl CommandLineStrategy for ProcCmdlineStrategy {
    fn name(&self) -> &'static str {
        "procfs"
    }

    async fn command_line(&self, pid: u32, _timeout: Duration) -> Result<Option<String>> {
        let raw = tokio::fs::read(format!("/proc/{}/cmdline", pid)).await?;
        let cmdline = String::from_utf8_lossy(&raw).replace('\0', " ");
        Ok(Some(cmdline.trim().to_string()))
    }
}

/// `ps -ww -o args= -p <pid>` (any Unix)
pub struct PsArgsStrategy;

#[async_trait]
impl CommandLineStrategy for PsArgsStrategy {
    fn name(&self) -> &'static str {
        "ps"
    }

    async fn command_line(&self, pid: u32, timeout: Duration) -> Result<Option<String>> {
        let pid = pid.to_string();
        let stdout = run("ps", &["-ww", "-o", "args=", "-p", &pid], timeout).await?;
        Ok(Some(stdout.trim().to_string()))
    }
}

/// `Get-CimInstance Win32_Process` (Windows)
pub struct CimCommandLineStrategy;

#[async_trait]
impl CommandLineStrategy for CimCommandLineStrategy {
    fn name(&self) -> &'static str {
        "Get-CimInstance"
    }

    async fn command_line(&self, pid: u32, timeout: Duration) -> Result<Option<String>> {
        let script = format!(
            "(Get-CimInstance Win32_Process -Filter \"ProcessId={}\").CommandLine",
            pid
        );
        let stdout = powershell(&script, timeout).await?;
        Ok(Some(stdout.trim().to_string()))
    }
}

/// `wmic process ... get CommandLine /value` (older Windows)
pub struct WmicCommandLineStrategy;

#[async_trait]
impl CommandLineStrategy for WmicCommandLineStrategy {
    fn name(&self) -> &'static str {
        "wmic"
    }

    async fn command_line(&self, pid: u32, timeout: Duration) -> Result<Option<String>> {
        let filter = format!("processid={}", pid);
        let stdout = run(
            "wmic",
            &["process", "where", &filter, "get", "CommandLine", "/value"],
            timeout,
        )
        .await?;
        Ok(parse_wmic_value(&stdout))
    }
}

/// Pick the value out of `CommandLine=...` output
pub(crate) fn parse_wmic_value(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("CommandLine="))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
