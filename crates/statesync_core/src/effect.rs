use crate::{JobId, ProgressSnapshot, StreamError};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEffect {
    RegisterJob { job_id: JobId, title: Option<String> },
    OpenTransport { job_id: JobId },
    Publish(ProgressSnapshot),
    StartHeartbeat,
    CancelHeartbeat,
    Notify(Notification),
    CloseTransport,
    UnregisterJob { job_id: JobId },
    ReportError(StreamError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// User-facing toast produced by the progress subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub job_id: JobId,
    pub level: NotificationLevel,
    pub message: String,
}
