//! Quota data types parsed from the language server's `GetUserStatus` reply.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Remaining quota for a single model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaEntry {
    /// Display name (e.g., "Gemini 3 Pro (High)")
    pub model_name: String,
    /// Remaining quota percentage (0-100)
    pub percentage: u8,
    /// When the quota resets, as reported by the server
    pub reset_time: Option<String>,
}

/// Complete quota snapshot from one successful poll
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    /// Entries in the order the server listed them
    pub entries: Vec<QuotaEntry>,
    /// Model the IDE currently has selected, if the server said so
    pub active_model: Option<String>,
    /// When this snapshot was parsed
    pub fetched_at: Option<DateTime<Utc>>,
    /// Port that answered
    pub port: Option<u16>,
}

impl QuotaSnapshot {
    /// True until the first successful fetch
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by display name
    pub fn entry(&self, model_name: &str) -> Option<&QuotaEntry> {
        self.entries.iter().find(|e| e.model_name == model_name)
    }

    /// Entry with the least remaining quota
    pub fn lowest(&self) -> Option<&QuotaEntry> {
        self.entries.iter().min_by_key(|e| e.percentage)
    }
}
