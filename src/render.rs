//! Plain-text and JSON rendering for the CLI.

use chrono::{DateTime, Utc};
use serde::Serialize;

use agquota_core::{CoreEvent, QuotaEntry, QuotaSnapshot};

/// JSON shape printed by `status --json` and `watch --json`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport<'a> {
    pub selected_model: &'a str,
    pub selected: Option<&'a QuotaEntry>,
    pub snapshot: &'a QuotaSnapshot,
}

impl<'a> StatusReport<'a> {
    pub fn new(snapshot: &'a QuotaSnapshot, selected_model: &'a str) -> Self {
        Self {
            selected_model,
            selected: snapshot.entry(selected_model),
            snapshot,
        }
    }
}

/// One `watch --json` line: the tagged event, plus the status report when
/// the snapshot changed
#[derive(Debug, Serialize)]
pub struct EventLine<'a> {
    #[serde(flatten)]
    pub event: &'a CoreEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusReport<'a>>,
}

impl<'a> EventLine<'a> {
    pub fn new(event: &'a CoreEvent, snapshot: &'a QuotaSnapshot, selected_model: &'a str) -> Self {
        let status = matches!(event, CoreEvent::SnapshotUpdated)
            .then(|| StatusReport::new(snapshot, selected_model));
        Self { event, status }
    }
}

/// Human-readable time until reset, or the raw value if it is not RFC 3339
pub fn format_reset(reset: Option<&str>, now: DateTime<Utc>) -> String {
    let Some(raw) = reset else {
        return "-".to_string();
    };
    let Ok(at) = DateTime::parse_from_rfc3339(raw) else {
        return raw.to_string();
    };

    let remaining = at.with_timezone(&Utc) - now;
    if remaining.num_seconds() <= 0 {
        return "now".to_string();
    }

    let days = remaining.num_days();
    let hours = remaining.num_hours() % 24;
    let minutes = remaining.num_minutes() % 60;
    if days > 0 {
        format!("in {}d {}h", days, hours)
    } else if hours > 0 {
        format!("in {}h {}m", hours, minutes)
    } else {
        format!("in {}m", minutes.max(1))
    }
}

/// Table of every entry; `*` marks the selected model, `>` the active one
pub fn status_table(snapshot: &QuotaSnapshot, selected: &str, now: DateTime<Utc>) -> String {
    let width = snapshot
        .entries
        .iter()
        .map(|e| e.model_name.chars().count())
        .chain(std::iter::once("MODEL".len()))
        .max()
        .unwrap_or(0);

    let mut out = format!("   {:<width$}  {:>6}  RESETS\n", "MODEL", "LEFT");
    for entry in &snapshot.entries {
        let marker = if entry.model_name == selected {
            '*'
        } else if snapshot.active_model.as_deref() == Some(entry.model_name.as_str()) {
            '>'
        } else {
            ' '
        };
        out.push_str(&format!(
            " {} {:<width$}  {:>5}%  {}\n",
            marker,
            entry.model_name,
            entry.percentage,
            format_reset(entry.reset_time.as_deref(), now),
        ));
    }

    if let Some(port) = snapshot.port {
        out.push_str(&format!("\nlanguage server port {}\n", port));
    }
    out
}

/// One-line summary of the selected model, used by `watch`
pub fn selected_line(snapshot: &QuotaSnapshot, selected: &str, now: DateTime<Utc>) -> String {
    match snapshot.entry(selected) {
        Some(entry) => format!(
            "{}: {}% left (resets {})",
            entry.model_name,
            entry.percentage,
            format_reset(entry.reset_time.as_deref(), now)
        ),
        None => format!("{}: no quota reported", selected),
    }
}

/// Text for an event that is not a snapshot update
pub fn event_line(event: &CoreEvent) -> Option<String> {
    match event {
        CoreEvent::SnapshotUpdated => None,
        CoreEvent::ActiveModelChanged { model } => Some(format!("active model is now {}", model)),
        CoreEvent::SelectedModelChanged { model } => Some(format!("tracking {}", model)),
        CoreEvent::FetchFailed { kind, message } => {
            Some(format!("fetch failed ({}): {}", kind.display_name(), message))
        }
    }
}
