use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type JobId = String;

/// Entry in the durable list of in-flight jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    Done,
    Cancelled,
    Errored,
}

/// Latest progress payload for a job, as pushed by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(default, alias = "jobId")]
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pct: Option<f64>,
    #[serde(default, alias = "etaSeconds", skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,
    #[serde(default, alias = "elapsedSeconds", skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default, alias = "cancelRequested")]
    pub cancel_requested: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressSnapshot {
    /// Parses a stream payload and fills what the server may leave out:
    /// the job id, and `pct` derived from `completed / total`.
    pub fn parse(raw: &str, job_id: &str) -> Result<Self, serde_json::Error> {
        let mut snapshot: ProgressSnapshot = serde_json::from_str(raw)?;
        if snapshot.job_id.is_empty() {
            snapshot.job_id = job_id.to_string();
        }
        if snapshot.pct.is_none() {
            if let (Some(completed), Some(total)) = (snapshot.completed, snapshot.total) {
                if total > 0 {
                    snapshot.pct = Some(completed as f64 * 100.0 / total as f64);
                }
            }
        }
        Ok(snapshot)
    }

    pub fn terminal_kind(&self) -> Option<TerminalKind> {
        if self.error.is_some() {
            Some(TerminalKind::Errored)
        } else if self.cancel_requested {
            Some(TerminalKind::Cancelled)
        } else if self.done {
            Some(TerminalKind::Done)
        } else {
            None
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_kind().is_some()
    }

    /// Percentage for display, clamped to `[0, 100]` whatever the server sent.
    pub fn display_pct(&self) -> f64 {
        match self.pct {
            Some(pct) if pct.is_finite() => pct.clamp(0.0, 100.0),
            _ => 0.0,
        }
    }
}
