//! Normalize a `GetUserStatus` payload into a [`QuotaSnapshot`].
//!
//! The payload belongs to the language server and is read defensively:
//! every field is optional, and the model list may appear in one of two
//! places.
//!
//! ```text
//! {
//!   "userStatus": {
//!     "cascadeModelConfigData": {
//!       "clientModelConfigs": [
//!         {
//!           "label": "Gemini 3 Pro (High)",
//!           "modelOrAlias": { "model": "MODEL_PLACEHOLDER_M7" },
//!           "quotaInfo": { "remainingFraction": 0.82, "resetTime": "2026-10-18T17:00:00Z" }
//!         }
//!       ],
//!       "defaultOverrideModelConfig": { "modelOrAlias": { "model": "MODEL_PLACEHOLDER_M7" } }
//!     }
//!   }
//! }
//! ```
//!
//! Older servers put the list in a top-level `models` array instead.

use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::types::{QuotaEntry, QuotaSnapshot};
use crate::error::{DiscoveryError, Result};

/// Display name used when an entry carries neither `label` nor `modelName`
pub const UNKNOWN_MODEL: &str = "Unknown Model";

/// Candidate display-name fields, highest priority first
const NAME_FIELDS: &[&str] = &["label", "modelName"];

const CASCADE_CONFIGS_PATH: &[&str] = &["userStatus", "cascadeModelConfigData", "clientModelConfigs"];
const TOP_LEVEL_MODELS_PATH: &[&str] = &["models"];
const ACTIVE_MODEL_PATH: &[&str] = &[
    "userStatus",
    "cascadeModelConfigData",
    "defaultOverrideModelConfig",
    "modelOrAlias",
    "model",
];
const MODEL_ID_PATH: &[&str] = &["modelOrAlias", "model"];
const FRACTION_PATH: &[&str] = &["quotaInfo", "remainingFraction"];
const RESET_TIME_PATH: &[&str] = &["quotaInfo", "resetTime"];

/// Where the model list was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelList<'a> {
    /// `userStatus.cascadeModelConfigData.clientModelConfigs`
    CascadeConfigs(&'a [Value]),
    /// Top-level `models`
    TopLevelModels(&'a [Value]),
}

impl<'a> ModelList<'a> {
    /// Decode the model list, preferring the cascade config shape
    pub fn decode(payload: &'a Value) -> Option<Self> {
        lookup_array(payload, CASCADE_CONFIGS_PATH)
            .map(ModelList::CascadeConfigs)
            .or_else(|| lookup_array(payload, TOP_LEVEL_MODELS_PATH).map(ModelList::TopLevelModels))
    }

    pub fn entries(&self) -> &'a [Value] {
        match *self {
            ModelList::CascadeConfigs(e) | ModelList::TopLevelModels(e) => e,
        }
    }
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(key))
}

fn lookup_array<'a>(value: &'a Value, path: &[&str]) -> Option<&'a [Value]> {
    lookup(value, path)?.as_array().map(Vec::as_slice)
}

fn lookup_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    lookup(value, path)?.as_str()
}

/// Model identifiers are usually enum strings, but accept bare numbers too
fn model_id(value: &Value, path: &[&str]) -> Option<String> {
    match lookup(value, path)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First non-empty display name field
fn explicit_name(entry: &Value) -> Option<&str> {
    NAME_FIELDS
        .iter()
        .find_map(|field| entry.get(field)?.as_str().filter(|s| !s.is_empty()))
}

/// `round(fraction * 100)`, clamped to 0..=100
pub fn fraction_to_percentage(fraction: f64) -> u8 {
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Parse a raw payload into a snapshot.
///
/// Pure: `fetched_at` and `port` are left for the caller to fill in.
/// Fails with [`DiscoveryError::EmptySnapshot`] when no entry has a numeric
/// remaining fraction.
pub fn parse_user_status(payload: &Value) -> Result<QuotaSnapshot> {
    let models = ModelList::decode(payload).ok_or(DiscoveryError::EmptySnapshot)?;

    let mut entries = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut id_to_name: HashMap<String, &str> = HashMap::new();

    for raw in models.entries() {
        let name = explicit_name(raw);

        // Recorded even when the entry has no quota info
        if let (Some(id), Some(name)) = (model_id(raw, MODEL_ID_PATH), name) {
            id_to_name.entry(id).or_insert(name);
        }

        let Some(fraction) = lookup(raw, FRACTION_PATH).and_then(Value::as_f64) else {
            continue;
        };

        let display = name.unwrap_or(UNKNOWN_MODEL);
        if !seen.insert(display) {
            continue;
        }

        entries.push(QuotaEntry {
            model_name: display.to_string(),
            percentage: fraction_to_percentage(fraction),
            reset_time: lookup_str(raw, RESET_TIME_PATH).map(str::to_string),
        });
    }

    if entries.is_empty() {
        return Err(DiscoveryError::EmptySnapshot);
    }

    let active_model = model_id(payload, ACTIVE_MODEL_PATH)
        .and_then(|id| id_to_name.get(&id))
        .map(|name| name.to_string());

    Ok(QuotaSnapshot {
        entries,
        active_model,
        fetched_at: None,
        port: None,
    })
}
