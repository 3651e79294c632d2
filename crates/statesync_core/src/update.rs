use statesync_logging::{sync_debug, sync_trace, sync_warn};

use crate::view_model::{heartbeat_notification, terminal_notification};
use crate::{JobId, ProgressSnapshot, StreamEffect, StreamError, StreamMsg, TerminalKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Idle,
    Connecting,
    Streaming,
    Done,
    Cancelled,
    Errored,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobPhase::Done | JobPhase::Cancelled | JobPhase::Errored)
    }

    fn from_terminal(kind: TerminalKind) -> Self {
        match kind {
            TerminalKind::Done => JobPhase::Done,
            TerminalKind::Cancelled => JobPhase::Cancelled,
            TerminalKind::Errored => JobPhase::Errored,
        }
    }
}

/// Progress state of one observed job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStream {
    job_id: JobId,
    phase: JobPhase,
    latest: Option<ProgressSnapshot>,
    last_error: Option<StreamError>,
}

impl JobStream {
    pub fn new(job_id: impl Into<JobId>) -> Self {
        Self {
            job_id: job_id.into(),
            phase: JobPhase::Idle,
            latest: None,
            last_error: None,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    pub fn latest(&self) -> Option<&ProgressSnapshot> {
        self.latest.as_ref()
    }

    pub fn last_error(&self) -> Option<&StreamError> {
        self.last_error.as_ref()
    }
}

/// Pure transition function: applies a message and returns the effects to run.
pub fn update(mut stream: JobStream, msg: StreamMsg) -> (JobStream, Vec<StreamEffect>) {
    if stream.phase.is_terminal() {
        // Terminal phases absorb everything, including late transport noise.
        sync_trace!("job {} is terminal; ignoring {:?}", stream.job_id, msg);
        return (stream, Vec::new());
    }

    let effects = match msg {
        StreamMsg::Observe { title } => {
            if stream.phase != JobPhase::Idle {
                return (stream, Vec::new());
            }
            stream.phase = JobPhase::Connecting;
            stream.last_error = None;
            vec![
                StreamEffect::RegisterJob {
                    job_id: stream.job_id.clone(),
                    title,
                },
                StreamEffect::OpenTransport {
                    job_id: stream.job_id.clone(),
                },
            ]
        }
        StreamMsg::Payload(raw) => {
            if stream.phase == JobPhase::Idle {
                return (stream, Vec::new());
            }
            match ProgressSnapshot::parse(&raw, &stream.job_id) {
                Ok(snapshot) => apply_snapshot(&mut stream, snapshot),
                Err(err) => {
                    sync_warn!("job {}: unreadable payload: {}", stream.job_id, err);
                    let error = StreamError::Payload(err.to_string());
                    stream.last_error = Some(error.clone());
                    vec![StreamEffect::ReportError(error)]
                }
            }
        }
        StreamMsg::TransportFailed(reason) => connection_lost(&mut stream, reason),
        StreamMsg::TransportEnded => connection_lost(
            &mut stream,
            "stream closed before the job finished".to_string(),
        ),
        StreamMsg::HeartbeatTick => match (&stream.phase, &stream.latest) {
            (JobPhase::Streaming, Some(snapshot)) => {
                vec![StreamEffect::Notify(heartbeat_notification(snapshot))]
            }
            _ => Vec::new(),
        },
    };

    (stream, effects)
}

fn apply_snapshot(stream: &mut JobStream, snapshot: ProgressSnapshot) -> Vec<StreamEffect> {
    if snapshot.job_id != stream.job_id {
        sync_warn!(
            "job {}: dropping snapshot addressed to {}",
            stream.job_id,
            snapshot.job_id
        );
        return Vec::new();
    }

    stream.last_error = None;
    match snapshot.terminal_kind() {
        None => {
            let first = stream.phase == JobPhase::Connecting;
            stream.phase = JobPhase::Streaming;
            stream.latest = Some(snapshot.clone());
            let mut effects = vec![StreamEffect::Publish(snapshot)];
            if first {
                effects.push(StreamEffect::StartHeartbeat);
            }
            effects
        }
        Some(kind) => {
            sync_debug!("job {} reached terminal state {:?}", stream.job_id, kind);
            stream.phase = JobPhase::from_terminal(kind);
            stream.latest = Some(snapshot.clone());
            vec![
                StreamEffect::CancelHeartbeat,
                StreamEffect::CloseTransport,
                StreamEffect::Publish(snapshot.clone()),
                StreamEffect::UnregisterJob {
                    job_id: stream.job_id.clone(),
                },
                StreamEffect::Notify(terminal_notification(&snapshot, kind)),
            ]
        }
    }
}

fn connection_lost(stream: &mut JobStream, reason: String) -> Vec<StreamEffect> {
    if stream.phase == JobPhase::Idle {
        return Vec::new();
    }
    sync_warn!("job {}: {}", stream.job_id, reason);
    let error = StreamError::Connection(reason);
    stream.phase = JobPhase::Idle;
    stream.last_error = Some(error.clone());
    vec![
        StreamEffect::CancelHeartbeat,
        StreamEffect::CloseTransport,
        StreamEffect::ReportError(error),
    ]
}
