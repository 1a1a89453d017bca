//! Enumerate TCP ports a process is listening on.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

use super::command::{powershell, run};

/// One way of listing the LISTEN sockets owned by a PID
#[async_trait]
pub trait PortStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn listening_ports(&self, pid: u32, timeout: Duration) -> Result<Vec<u16>>;
}

/// Runs port strategies in order until one reports ports
pub struct PortScanner {
    strategies: Vec<Box<dyn PortStrategy>>,
    timeout: Duration,
}

impl PortScanner {
    pub fn new(strategies: Vec<Box<dyn PortStrategy>>, timeout: Duration) -> Self {
        Self {
            strategies,
            timeout,
        }
    }

    /// Listening ports of `pid`, deduplicated and ascending.
    ///
    /// Never fails: strategy errors are logged and the result may be empty.
    pub async fn scan(&self, pid: u32) -> Vec<u16> {
        for strategy in &self.strategies {
            match strategy.listening_ports(pid, self.timeout).await {
                Ok(ports) if !ports.is_empty() => {
                    let ports = sorted_unique(ports);
                    debug!("Port scan: {} found {:?} for {}", strategy.name(), ports, pid);
                    return ports;
                }
                Ok(_) => debug!("Port scan: {} found nothing for {}", strategy.name(), pid),
                Err(e) => debug!("Port scan: {} failed for {}: {:#}", strategy.name(), pid, e),
            }
        }
        Vec::new()
    }
}

fn sorted_unique(ports: Vec<u16>) -> Vec<u16> {
    ports
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Port of an address like `127.0.0.1:42100`, `[::1]:42100` or `*:42100`
fn port_from_addr(addr: &str) -> Option<u16> {
    addr.rsplit_once(':')?.1.parse().ok()
}

/// `ss -tlnpH` (Linux)
pub struct SsStrategy;

#[async_trait]
impl PortStrategy for SsStrategy {
    fn name(&self) -> &'static str {
        "ss"
    }

    async fn listening_ports(&self, pid: u32, timeout: Duration) -> Result<Vec<u16>> {
        let stdout = run("ss", &["-tlnpH"], timeout).await?;
        Ok(parse_ss(&stdout, pid))
    }
}

/// Rows look like
/// `LISTEN 0 4096 127.0.0.1:42100 0.0.0.0:* users:(("language_server",pid=812,fd=9))`
pub(crate) fn parse_ss(output: &str, pid: u32) -> Vec<u16> {
    let owner = format!("pid={},", pid);
    output
        .lines()
        .filter(|line| line.contains(&owner))
        .filter_map(|line| port_from_addr(line.split_whitespace().nth(3)?))
        .collect()
}

/// `lsof` restricted to one PID (Linux, macOS)
pub struct LsofPidStrategy;

#[async_trait]
impl PortStrategy for LsofPidStrategy {
    fn name(&self) -> &'static str {
        "lsof -p"
    }

    async fn listening_ports(&self, pid: u32, timeout: Duration) -> Result<Vec<u16>> {
        let pid_arg = pid.to_string();
        let stdout = run(
            "lsof",
            &["-nP", "-a", "-iTCP", "-sTCP:LISTEN", "-p", &pid_arg],
            timeout,
        )
        .await?;
        Ok(parse_lsof(&stdout, pid))
    }
}

/// `lsof` over every LISTEN socket, filtered by the PID column here
pub struct LsofScanStrategy;

#[async_trait]
impl PortStrategy for LsofScanStrategy {
    fn name(&self) -> &'static str {
        "lsof"
    }

    async fn listening_ports(&self, pid: u32, timeout: Duration) -> Result<Vec<u16>> {
        let stdout = run("lsof", &["-nP", "-iTCP", "-sTCP:LISTEN"], timeout).await?;
        Ok(parse_lsof(&stdout, pid))
    }
}

/// Rows look like
/// `language_ 812 dev 9u IPv4 0x1a2b 0t0 TCP 127.0.0.1:42100 (LISTEN)`
pub(crate) fn parse_lsof(output: &str, pid: u32) -> Vec<u16> {
    let pid = pid.to_string();
    output
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.get(1) != Some(&pid.as_str()) || cols.last() != Some(&"(LISTEN)") {
                return None;
            }
            port_from_addr(cols.get(cols.len().checked_sub(2)?)?)
        })
        .collect()
}

/// `netstat -tlnp` (Linux net-tools)
pub struct NetstatUnixStrategy;

#[async_trait]
impl PortStrategy for NetstatUnixStrategy {
    fn name(&self) -> &'static str {
        "netstat"
    }

    async fn listening_ports(&self, pid: u32, timeout: Duration) -> Result<Vec<u16>> {
        let stdout = run("netstat", &["-tlnp"], timeout).await?;
        Ok(parse_netstat_unix(&stdout, pid))
    }
}

/// Rows look like
/// `tcp 0 0 127.0.0.1:42100 0.0.0.0:* LISTEN 812/language_serve`
pub(crate) fn parse_netstat_unix(output: &str, pid: u32) -> Vec<u16> {
    let owner = format!("{}/", pid);
    output
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            let listening = cols.get(5) == Some(&"LISTEN");
            let owned = cols.get(6).is_some_and(|c| c.starts_with(&owner));
            if !(listening && owned) {
                return None;
            }
            port_from_addr(cols.get(3)?)
        })
        .collect()
}

/// PowerShell `Get-NetTCPConnection` (Windows 8+)
pub struct NetTcpConnectionStrategy;

#[async_trait]
impl PortStrategy for NetTcpConnectionStrategy {
    fn name(&self) -> &'static str {
        "Get-NetTCPConnection"
    }

    async fn listening_ports(&self, pid: u32, timeout: Duration) -> Result<Vec<u16>> {
        let script = format!(
            "Get-NetTCPConnection -State Listen -OwningProcess {} | Select-Object -ExpandProperty LocalPort",
            pid
        );
        let stdout = powershell(&script, timeout).await?;
        Ok(stdout.lines().filter_map(|l| l.trim().parse().ok()).collect())
    }
}

/// `netstat -ano` (any Windows)
pub struct NetstatWindowsStrategy;

#[async_trait]
impl PortStrategy for NetstatWindowsStrategy {
    fn name(&self) -> &'static str {
        "netstat -ano"
    }

    async fn listening_ports(&self, pid: u32, timeout: Duration) -> Result<Vec<u16>> {
        let stdout = run("netstat", &["-ano", "-p", "TCP"], timeout).await?;
        Ok(parse_netstat_windows(&stdout, pid))
    }
}

/// Rows look like
/// `TCP    127.0.0.1:42100    0.0.0.0:0    LISTENING    812`
///
/// The state column is localized on some Windows installs, so a foreign
/// address ending in `:0` is also accepted as a listener.
pub(crate) fn parse_netstat_windows(output: &str, pid: u32) -> Vec<u16> {
    let pid = pid.to_string();
    output
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() != 5 || !cols[0].eq_ignore_ascii_case("TCP") || cols[4] != pid {
                return None;
            }
            let listening = cols[3] == "LISTENING" || cols[2].ends_with(":0");
            listening.then(|| port_from_addr(cols[1])).flatten()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_port_from_addr() {
        assert_eq!(port_from_addr("127.0.0.1:42100"), Some(42100));
        assert_eq!(port_from_addr("[::1]:8080"), Some(8080));
        assert_eq!(port_from_addr("*:9000"), Some(9000));
        assert_eq!(port_from_addr("0.0.0.0:*"), None);
    }

    #[test]
    fn test_parse_ss() {
        let out = "\
LISTEN 0      4096       127.0.0.1:42100      0.0.0.0:*    users:((\"language_server\",pid=812,fd=9))
LISTEN 0      4096       127.0.0.1:42101      0.0.0.0:*    users:((\"language_server\",pid=812,fd=11))
LISTEN 0      128        0.0.0.0:22           0.0.0.0:*    users:((\"sshd\",pid=8120,fd=3))
LISTEN 0      4096           [::1]:42100         [::]:*    users:((\"language_server\",pid=812,fd=10))
";
        assert_eq!(parse_ss(out, 812), vec![42100, 42101, 42100]);
        assert!(parse_ss(out, 81).is_empty());
    }

    #[test]
    fn test_parse_lsof() {
        let out = "\
COMMAND     PID USER   FD   TYPE             DEVICE SIZE/OFF NODE NAME
language_   812  dev    9u  IPv4 0xabc1234567890def      0t0  TCP 127.0.0.1:42100 (LISTEN)
language_   812  dev   12u  IPv4 0xabc1234567890df0      0t0  TCP 127.0.0.1:42102 (LISTEN)
language_   812  dev   13u  IPv4 0xabc1234567890df1      0t0  TCP 127.0.0.1:51000->127.0.0.1:443 (ESTABLISHED)
Code       9001  dev   40u  IPv4 0xabc1234567890df2      0t0  TCP 127.0.0.1:3000 (LISTEN)
";
        assert_eq!(parse_lsof(out, 812), vec![42100, 42102]);
        assert_eq!(parse_lsof(out, 9001), vec![3000]);
    }

    #[test]
    fn test_parse_netstat_unix() {
        let out = "\
Active Internet connections (only servers)
Proto Recv-Q Send-Q Local Address           Foreign Address         State       PID/Program name
tcp        0      0 127.0.0.1:42100         0.0.0.0:*               LISTEN      812/language_serve
tcp        0      0 0.0.0.0:22              0.0.0.0:*               LISTEN      -
tcp6       0      0 ::1:42103               :::*                    LISTEN      812/language_serve
tcp        0      0 127.0.0.1:5432          0.0.0.0:*               LISTEN      8123/postgres
";
        assert_eq!(parse_netstat_unix(out, 812), vec![42100, 42103]);
    }

    #[test]
    fn test_parse_netstat_windows() {
        let out = "\
Active Connections

  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       1044
  TCP    127.0.0.1:42100        0.0.0.0:0              LISTENING       15320
  TCP    127.0.0.1:42100        127.0.0.1:51234        ESTABLISHED     15320
  TCP    127.0.0.1:42105        0.0.0.0:0              ABHÖREN         15320
";
        assert_eq!(parse_netstat_windows(out, 15320), vec![42100, 42105]);
    }

    struct Fixed(std::result::Result<Vec<u16>, &'static str>);

    #[async_trait]
    impl PortStrategy for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn listening_ports(&self, _pid: u32, _timeout: Duration) -> Result<Vec<u16>> {
            self.0.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    #[tokio::test]
    async fn test_scan_sorts_and_dedups() {
        let scanner = PortScanner::new(
            vec![Box::new(Fixed(Ok(vec![5000, 4000, 6000, 4000])))],
            Duration::from_secs(1),
        );
        assert_eq!(scanner.scan(1).await, vec![4000, 5000, 6000]);
    }

    #[tokio::test]
    async fn test_scan_uses_fallback_after_error_and_empty() {
        let scanner = PortScanner::new(
            vec![
                Box::new(Fixed(Err("ss missing"))),
                Box::new(Fixed(Ok(vec![]))),
                Box::new(Fixed(Ok(vec![42101, 42100]))),
            ],
            Duration::from_secs(1),
        );
        assert_eq!(scanner.scan(1).await, vec![42100, 42101]);
    }

    #[tokio::test]
    async fn test_scan_all_fail_is_empty() {
        let scanner = PortScanner::new(vec![Box::new(Fixed(Err("nope")))], Duration::from_secs(1));
        assert!(scanner.scan(1).await.is_empty());
    }
}
