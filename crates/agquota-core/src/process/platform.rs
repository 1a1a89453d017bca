//! Per-platform strategy selection.
//!
//! Every OS-specific branch in discovery lives here: the locator, token
//! extractor and port scanner only ever see an ordered strategy list.

use std::time::Duration;

use super::locator::{
    GetProcessStrategy, PgrepStrategy, ProcessLocator, ProcessStrategy, PsListStrategy,
    TasklistStrategy,
};
use super::ports::{
    LsofPidStrategy, LsofScanStrategy, NetTcpConnectionStrategy, NetstatUnixStrategy,
    NetstatWindowsStrategy, PortScanner, PortStrategy, SsStrategy,
};
use super::token::{
    CimCommandLineStrategy, CommandLineStrategy, PsArgsStrategy, TokenExtractor,
    WmicCommandLineStrategy,
};

/// Operating system family, as far as discovery cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    /// BSDs and other Unix-likes
    OtherUnix,
}

impl Platform {
    /// Platform this binary was built for
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::OtherUnix
        }
    }

    /// Get display name for the platform
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::MacOs => "macOS",
            Platform::Linux => "Linux",
            Platform::OtherUnix => "Unix",
        }
    }

    /// Process lookup strategies, fastest first
    pub fn process_strategies(&self) -> Vec<Box<dyn ProcessStrategy>> {
        match self {
            Platform::Windows => vec![Box::new(GetProcessStrategy), Box::new(TasklistStrategy)],
            #[cfg(target_os = "linux")]
            Platform::Linux => vec![
                Box::new(PgrepStrategy),
                Box::new(PsListStrategy),
                Box::new(super::locator::ProcFsStrategy),
            ],
            _ => vec![Box::new(PgrepStrategy), Box::new(PsListStrategy)],
        }
    }

    /// Command line retrieval strategies
    pub fn command_line_strategies(&self) -> Vec<Box<dyn CommandLineStrategy>> {
        match self {
            Platform::Windows => vec![
                Box::new(CimCommandLineStrategy),
                Box::new(WmicCommandLineStrategy),
            ],
            #[cfg(target_os = "linux")]
            Platform::Linux => vec![
                Box::new(super::token::ProcCmdlineStrategy),
                Box::new(PsArgsStrategy),
            ],
            _ => vec![Box::new(PsArgsStrategy)],
        }
    }

    /// Listening port strategies, structured sources first
    pub fn port_strategies(&self) -> Vec<Box<dyn PortStrategy>> {
        match self {
            Platform::Windows => vec![
                Box::new(NetTcpConnectionStrategy),
                Box::new(NetstatWindowsStrategy),
            ],
            Platform::Linux => vec![
                Box::new(SsStrategy),
                Box::new(LsofPidStrategy),
                Box::new(NetstatUnixStrategy),
            ],
            Platform::MacOs | Platform::OtherUnix => {
                vec![Box::new(LsofPidStrategy), Box::new(LsofScanStrategy)]
            }
        }
    }

    /// Build a locator for `process_name` using this platform's strategies
    pub fn locator(&self, process_name: &str, timeout: Duration) -> ProcessLocator {
        ProcessLocator::new(process_name, self.process_strategies(), timeout)
    }

    /// Build a token extractor using this platform's strategies
    pub fn token_extractor(&self, timeout: Duration) -> TokenExtractor {
        TokenExtractor::new(self.command_line_strategies(), timeout)
    }

    /// Build a port scanner using this platform's strategies
    pub fn port_scanner(&self, timeout: Duration) -> PortScanner {
        PortScanner::new(self.port_strategies(), timeout)
    }
}
