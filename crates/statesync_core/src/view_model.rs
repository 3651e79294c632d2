use crate::{Notification, NotificationLevel, ProgressSnapshot, TerminalKind};

/// Display-ready projection of a progress snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressView {
    pub job_id: String,
    pub label: String,
    pub pct: f64,
    pub counts: Option<String>,
    pub eta: Option<String>,
    pub note: Option<String>,
}

impl ProgressView {
    pub fn from_snapshot(snapshot: &ProgressSnapshot) -> Self {
        let label = snapshot
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| snapshot.job_id.clone());
        let counts = match (snapshot.completed, snapshot.total) {
            (Some(completed), Some(total)) => Some(format!("{completed}/{total}")),
            (Some(completed), None) => Some(completed.to_string()),
            _ => None,
        };
        Self {
            job_id: snapshot.job_id.clone(),
            label,
            pct: snapshot.display_pct(),
            counts,
            eta: snapshot.eta_seconds.and_then(format_duration),
            note: snapshot.note.clone().filter(|note| !note.is_empty()),
        }
    }

    /// One-line summary used by the periodic heartbeat toast.
    pub fn summary(&self) -> String {
        let mut line = format!("{}: {:.0}%", self.label, self.pct);
        if let Some(counts) = &self.counts {
            line.push_str(&format!(" ({counts})"));
        }
        if let Some(eta) = &self.eta {
            line.push_str(&format!(", eta {eta}"));
        }
        if let Some(note) = &self.note {
            line.push_str(&format!(" - {note}"));
        }
        line
    }
}

pub fn heartbeat_notification(snapshot: &ProgressSnapshot) -> Notification {
    Notification {
        job_id: snapshot.job_id.clone(),
        level: NotificationLevel::Info,
        message: ProgressView::from_snapshot(snapshot).summary(),
    }
}

pub fn terminal_notification(snapshot: &ProgressSnapshot, kind: TerminalKind) -> Notification {
    let view = ProgressView::from_snapshot(snapshot);
    let (level, message) = match kind {
        TerminalKind::Done => (NotificationLevel::Success, format!("{} finished", view.label)),
        TerminalKind::Cancelled => (NotificationLevel::Warning, format!("{} cancelled", view.label)),
        TerminalKind::Errored => (
            NotificationLevel::Error,
            format!(
                "{} failed: {}",
                view.label,
                snapshot.error.as_deref().unwrap_or("unknown error")
            ),
        ),
    };
    Notification {
        job_id: snapshot.job_id.clone(),
        level,
        message,
    }
}

fn format_duration(seconds: f64) -> Option<String> {
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let total = seconds.round() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    Some(if hours > 0 {
        format!("{hours}h{minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m{secs:02}s")
    } else {
        format!("{secs}s")
    })
}
