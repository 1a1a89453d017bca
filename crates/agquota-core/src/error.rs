//! Error types for the discovery-and-fetch pipeline.
//!
//! Every failure is transient: the pipeline converts it into a failed cycle
//! and keeps polling.

use serde::Serialize;
use thiserror::Error;

/// Failure raised by a pipeline stage
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    /// No process matching the configured name is running
    #[error("language server process not found (looking for {name:?})")]
    ProcessNotFound { name: String },

    /// The command line of the process carries no CSRF token
    #[error("csrf token not found in command line of pid {pid}")]
    TokenNotFound { pid: u32 },

    /// The process does not listen on any TCP port
    #[error("pid {pid} has no listening TCP ports")]
    NoListeningPorts { pid: u32 },

    /// A single port did not answer with a success status
    #[error("probe of port {port} failed: {reason}")]
    PortProbeFailed { port: u16, reason: String },

    /// Every candidate port failed
    #[error("all {attempted} candidate ports failed (last error: {last})")]
    AllPortsFailed { attempted: usize, last: String },

    /// The payload contained no model with a numeric quota fraction
    #[error("response contained no usable quota entries")]
    EmptySnapshot,

    /// The response body was not valid JSON
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Discriminant of [`DiscoveryError`], cheap to copy into events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProcessNotFound,
    TokenNotFound,
    NoListeningPorts,
    PortProbeFailed,
    AllPortsFailed,
    EmptySnapshot,
    MalformedResponse,
}

impl DiscoveryError {
    /// The kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DiscoveryError::ProcessNotFound { .. } => ErrorKind::ProcessNotFound,
            DiscoveryError::TokenNotFound { .. } => ErrorKind::TokenNotFound,
            DiscoveryError::NoListeningPorts { .. } => ErrorKind::NoListeningPorts,
            DiscoveryError::PortProbeFailed { .. } => ErrorKind::PortProbeFailed,
            DiscoveryError::AllPortsFailed { .. } => ErrorKind::AllPortsFailed,
            DiscoveryError::EmptySnapshot => ErrorKind::EmptySnapshot,
            DiscoveryError::MalformedResponse(_) => ErrorKind::MalformedResponse,
        }
    }
}

impl ErrorKind {
    /// Short display name used in status output
    pub fn display_name(&self) -> &'static str {
        match self {
            ErrorKind::ProcessNotFound => "process not found",
            ErrorKind::TokenNotFound => "token not found",
            ErrorKind::NoListeningPorts => "no listening ports",
            ErrorKind::PortProbeFailed => "port probe failed",
            ErrorKind::AllPortsFailed => "all ports failed",
            ErrorKind::EmptySnapshot => "empty snapshot",
            ErrorKind::MalformedResponse => "malformed response",
        }
    }
}

/// Result alias for pipeline stages
pub type Result<T> = std::result::Result<T, DiscoveryError>;
