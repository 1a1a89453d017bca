//! One discovery-and-fetch cycle: locate, scan, probe, parse.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::fmt;
use tracing::debug;

use crate::config::Settings;
use crate::error::{DiscoveryError, Result};
use crate::process::{mask_token, Platform, PortScanner, ProcessLocator, TokenExtractor};
use crate::quota::{parse_user_status, QuotaClient, QuotaSnapshot};

/// The stages a cycle drives, behind one seam so tests can fake the OS
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Find the language server PID
    async fn locate(&self) -> Result<u32>;

    /// Recover the CSRF token of `pid`
    async fn extract_token(&self, pid: u32) -> Result<String>;

    /// Listening TCP ports of `pid`; never fails
    async fn scan_ports(&self, pid: u32) -> Vec<u16>;

    /// Send `GetUserStatus` to one port
    async fn query(&self, port: u16, token: &str) -> Result<Value>;
}

/// Backend that inspects the real machine
pub struct SystemBackend {
    platform: Platform,
    locator: ProcessLocator,
    extractor: TokenExtractor,
    scanner: PortScanner,
    client: QuotaClient,
}

impl SystemBackend {
    /// Build the strategy chains for the current platform
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let platform = Platform::current();
        let timeout = settings.command_timeout();
        Ok(Self {
            platform,
            locator: platform.locator(&settings.process_name, timeout),
            extractor: platform.token_extractor(timeout),
            scanner: platform.port_scanner(timeout),
            client: QuotaClient::new(settings.request_timeout())?,
        })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }
}

#[async_trait]
impl DiscoveryBackend for SystemBackend {
    async fn locate(&self) -> Result<u32> {
        self.locator.locate().await
    }

    async fn extract_token(&self, pid: u32) -> Result<String> {
        self.extractor.extract(pid).await
    }

    async fn scan_ports(&self, pid: u32) -> Vec<u16> {
        self.scanner.scan(pid).await
    }

    async fn query(&self, port: u16, token: &str) -> Result<Value> {
        self.client.query(port, token).await
    }
}

/// Where a cycle currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePhase {
    #[default]
    Idle,
    Locating,
    Scanning,
    Probing,
    Parsed,
    Failed,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::Idle => "idle",
            CyclePhase::Locating => "locating",
            CyclePhase::Scanning => "scanning",
            CyclePhase::Probing => "probing",
            CyclePhase::Parsed => "parsed",
            CyclePhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Run one cycle against `backend`, reporting each phase to `on_phase`.
///
/// The returned snapshot is stamped with the answering port and fetch time.
pub async fn run_cycle(
    backend: &dyn DiscoveryBackend,
    mut on_phase: impl FnMut(CyclePhase) + Send,
) -> Result<QuotaSnapshot> {
    let result = discover(backend, &mut on_phase).await;
    on_phase(if result.is_ok() {
        CyclePhase::Parsed
    } else {
        CyclePhase::Failed
    });
    result
}

async fn discover(
    backend: &dyn DiscoveryBackend,
    on_phase: &mut (impl FnMut(CyclePhase) + Send),
) -> Result<QuotaSnapshot> {
    on_phase(CyclePhase::Locating);
    let pid = backend.locate().await?;

    on_phase(CyclePhase::Scanning);
    // Token and ports depend only on the pid
    let (token, mut ports) = tokio::join!(backend.extract_token(pid), backend.scan_ports(pid));
    let token = token?;
    debug!("Cycle: pid {} token {} ports {:?}", pid, mask_token(&token), ports);

    ports.sort_unstable();
    ports.dedup();
    if ports.is_empty() {
        return Err(DiscoveryError::NoListeningPorts { pid });
    }

    on_phase(CyclePhase::Probing);
    let mut snapshot = probe_ports(backend, &ports, &token).await?;
    snapshot.fetched_at = Some(Utc::now());
    Ok(snapshot)
}

/// Try `ports` in order; the first one yielding a non-empty snapshot wins
pub async fn probe_ports(
    backend: &dyn DiscoveryBackend,
    ports: &[u16],
    token: &str,
) -> Result<QuotaSnapshot> {
    let mut last_error = None;

    for &port in ports {
        let result = backend
            .query(port, token)
            .await
            .and_then(|payload| parse_user_status(&payload));

        match result {
            Ok(mut snapshot) => {
                snapshot.port = Some(port);
                return Ok(snapshot);
            }
            Err(e) => {
                debug!("Probe: port {} rejected: {}", port, e);
                last_error = Some(e);
            }
        }
    }

    Err(DiscoveryError::AllPortsFailed {
        attempted: ports.len(),
        last: last_error.map(|e| e.to_string()).unwrap_or_default(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Scriptable backend recording every probe
    pub(crate) struct FakeBackend {
        pub pid: Result<u32>,
        pub token: Result<String>,
        pub ports: Vec<u16>,
        /// Payload per port; ports not listed answer with a probe failure
        pub payloads: Mutex<Vec<(u16, Value)>>,
        pub probes: Mutex<Vec<u16>>,
    }

    impl FakeBackend {
        pub(crate) fn new(ports: Vec<u16>) -> Self {
            Self {
                pid: Ok(812),
                token: Ok("tok".to_string()),
                ports,
                payloads: Mutex::new(Vec::new()),
                probes: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn answer(self, port: u16, payload: Value) -> Self {
            self.payloads.lock().push((port, payload));
            self
        }

        pub(crate) fn set_answer(&self, port: u16, payload: Value) {
            let mut payloads = self.payloads.lock();
            payloads.retain(|(p, _)| *p != port);
            payloads.push((port, payload));
        }
    }

    #[async_trait]
    impl DiscoveryBackend for FakeBackend {
        async fn locate(&self) -> Result<u32> {
            self.pid.clone()
        }

        async fn extract_token(&self, _pid: u32) -> Result<String> {
            self.token.clone()
        }

        async fn scan_ports(&self, _pid: u32) -> Vec<u16> {
            self.ports.clone()
        }

        async fn query(&self, port: u16, _token: &str) -> Result<Value> {
            self.probes.lock().push(port);
            self.payloads
                .lock()
                .iter()
                .find(|(p, _)| *p == port)
                .map(|(_, v)| v.clone())
                .ok_or(DiscoveryError::PortProbeFailed {
                    port,
                    reason: "HTTP 404 Not Found".to_string(),
                })
        }
    }

    pub(crate) fn payload(active: Option<&str>, models: &[(&str, f64)]) -> Value {
        let configs: Vec<Value> = models
            .iter()
            .map(|(name, fraction)| {
                json!({
                    "label": name,
                    "modelOrAlias": { "model": format!("ID_{}", name) },
                    "quotaInfo": { "remainingFraction": fraction }
                })
            })
            .collect();
        let mut data = json!({ "clientModelConfigs": configs });
        if let Some(active) = active {
            data["defaultOverrideModelConfig"] =
                json!({ "modelOrAlias": { "model": format!("ID_{}", active) } });
        }
        json!({ "userStatus": { "cascadeModelConfigData": data } })
    }

    #[tokio::test]
    async fn test_probes_ascending_and_stops_at_first_success() {
        let backend = FakeBackend::new(vec![5000, 4000, 6000])
            .answer(5000, payload(None, &[("A", 0.5)]))
            .answer(6000, payload(None, &[("B", 0.5)]));

        let snapshot = run_cycle(&backend, |_| {}).await.unwrap();
        assert_eq!(*backend.probes.lock(), vec![4000, 5000]);
        assert_eq!(snapshot.port, Some(5000));
        assert_eq!(snapshot.entries[0].model_name, "A");
        assert!(snapshot.fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_empty_snapshot_port_is_skipped() {
        let backend = FakeBackend::new(vec![4000, 5000])
            .answer(4000, json!({ "models": [{ "label": "A" }] }))
            .answer(5000, payload(None, &[("A", 0.25)]));

        let snapshot = run_cycle(&backend, |_| {}).await.unwrap();
        assert_eq!(*backend.probes.lock(), vec![4000, 5000]);
        assert_eq!(snapshot.entries[0].percentage, 25);
    }

    #[tokio::test]
    async fn test_all_ports_failed() {
        let backend = FakeBackend::new(vec![4000, 5000]);

        let err = run_cycle(&backend, |_| {}).await.unwrap_err();
        assert_eq!(
            err,
            DiscoveryError::AllPortsFailed {
                attempted: 2,
                last: "probe of port 5000 failed: HTTP 404 Not Found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_no_listening_ports() {
        let backend = FakeBackend::new(vec![]);
        let err = run_cycle(&backend, |_| {}).await.unwrap_err();
        assert_eq!(err, DiscoveryError::NoListeningPorts { pid: 812 });
        assert!(backend.probes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_token_failure_stops_cycle() {
        let mut backend = FakeBackend::new(vec![4000]).answer(4000, payload(None, &[("A", 1.0)]));
        backend.token = Err(DiscoveryError::TokenNotFound { pid: 812 });

        let err = run_cycle(&backend, |_| {}).await.unwrap_err();
        assert_eq!(err, DiscoveryError::TokenNotFound { pid: 812 });
        assert!(backend.probes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_phase_sequence() {
        let backend = FakeBackend::new(vec![4000]).answer(4000, payload(None, &[("A", 1.0)]));
        let mut phases = Vec::new();
        run_cycle(&backend, |p| phases.push(p)).await.unwrap();
        assert_eq!(
            phases,
            vec![
                CyclePhase::Locating,
                CyclePhase::Scanning,
                CyclePhase::Probing,
                CyclePhase::Parsed
            ]
        );

        let mut missing = FakeBackend::new(vec![]);
        missing.pid = Err(DiscoveryError::ProcessNotFound {
            name: "language_server".to_string(),
        });
        let mut phases = Vec::new();
        assert!(run_cycle(&missing, |p| phases.push(p)).await.is_err());
        assert_eq!(phases, vec![CyclePhase::Locating, CyclePhase::Failed]);
    }
}
