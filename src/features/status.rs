//! Process-wide run telemetry.
//!
//! One [`StatusTracker`] is constructed at startup and `Arc`-shared into the
//! watch loop (the only writer) and the status bot (a reader). No history is
//! kept beyond the latest values — the operator report is a point-in-time
//! snapshot, not a log.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};

/// Read-only view of the tracker, taken atomically.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_error_message: Option<String>,
    pub last_new_count: usize,
    pub uptime: Duration,
}

#[derive(Debug, Default)]
struct Inner {
    last_run_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    last_error_at: Option<DateTime<Utc>>,
    last_error_message: Option<String>,
    last_new_count: usize,
}

pub struct StatusTracker {
    started: Instant,
    inner: RwLock<Inner>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn mark_run_start(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.last_run_at = Some(Utc::now());
        }
    }

    /// Record a successful run. Clears any prior error fields — error state
    /// does not persist once a later run succeeds.
    pub fn mark_run_success(&self, new_count: usize) {
        if let Ok(mut inner) = self.inner.write() {
            inner.last_success_at = Some(Utc::now());
            inner.last_new_count = new_count;
            inner.last_error_at = None;
            inner.last_error_message = None;
        }
    }

    pub fn mark_run_error(&self, message: impl std::fmt::Display) {
        if let Ok(mut inner) = self.inner.write() {
            inner.last_error_at = Some(Utc::now());
            inner.last_error_message = Some(message.to_string());
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let uptime = self.started.elapsed();
        match self.inner.read() {
            Ok(inner) => StatusSnapshot {
                last_run_at: inner.last_run_at,
                last_success_at: inner.last_success_at,
                last_error_at: inner.last_error_at,
                last_error_message: inner.last_error_message.clone(),
                last_new_count: inner.last_new_count,
                uptime,
            },
            Err(_) => StatusSnapshot {
                uptime,
                ..StatusSnapshot::default()
            },
        }
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ── Operator report formatting ───────────────────────────────────────────────

fn format_timestamp(t: Option<DateTime<Utc>>) -> String {
    match t {
        None => "never".to_string(),
        Some(t) => t
            .with_timezone(&Local)
            .format("%d %b %Y, %-I:%M %p")
            .to_string(),
    }
}

fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(format!("{minutes}m"));
    }
    parts.join(" ")
}

/// Fixed-format multi-line report answered to `status` queries.
pub fn format_report(snapshot: &StatusSnapshot) -> String {
    let mut lines = Vec::new();
    lines.push("matchwatch status".to_string());
    lines.push("-----------------".to_string());
    lines.push(format!("Uptime:        {}", format_duration(snapshot.uptime)));
    lines.push(String::new());
    lines.push(format!(
        "Last run:      {}",
        format_timestamp(snapshot.last_run_at)
    ));
    lines.push(format!(
        "Last success:  {}",
        format_timestamp(snapshot.last_success_at)
    ));
    lines.push(format!(
        "New contests (last success): {}",
        snapshot.last_new_count
    ));
    lines.push(format!(
        "Last error at: {}",
        match snapshot.last_error_at {
            None => "none".to_string(),
            some => format_timestamp(some),
        }
    ));
    if let Some(msg) = &snapshot.last_error_message {
        lines.push(format!("Last error msg: {msg}"));
    }
    lines.join("\n")
}
