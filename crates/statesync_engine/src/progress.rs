use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::Method;
use statesync_core::{
    update, JobId, JobPhase, JobStream, Notification, NotificationLevel, ProgressSnapshot,
    ProgressView, StreamEffect, StreamError, StreamMsg,
};
use statesync_logging::{sync_debug, sync_error, sync_info, sync_trace, sync_warn};
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::http::{map_reqwest_error, ApiClient, RemoteError};
use crate::registry::JobRegistry;
use crate::sse::{SseDecoder, SseEvent};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, RemoteError>> + Send>>;

/// Read-only push connection for one job's progress events.
#[async_trait::async_trait]
pub trait ProgressTransport: Send + Sync {
    async fn connect(&self, job_id: &str) -> Result<ByteStream, RemoteError>;
}

pub struct HttpProgressTransport {
    api: ApiClient,
    config: ClientConfig,
}

impl HttpProgressTransport {
    pub fn new(api: ApiClient, config: &ClientConfig) -> Self {
        Self {
            api,
            config: config.clone(),
        }
    }
}

#[async_trait::async_trait]
impl ProgressTransport for HttpProgressTransport {
    async fn connect(&self, job_id: &str) -> Result<ByteStream, RemoteError> {
        let path = self.config.progress_stream_path_for(job_id)?;
        let response = self.api.open_event_stream(&path).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error))
            .boxed())
    }
}

/// Receiver for user-facing progress toasts.
pub trait NotificationSink: Send + Sync {
    fn emit(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn emit(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Info | NotificationLevel::Success => {
                sync_info!("[{}] {}", notification.job_id, notification.message)
            }
            NotificationLevel::Warning => {
                sync_warn!("[{}] {}", notification.job_id, notification.message)
            }
            NotificationLevel::Error => {
                sync_error!("[{}] {}", notification.job_id, notification.message)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub job_id: JobId,
    pub phase: JobPhase,
    pub snapshot: Option<ProgressSnapshot>,
    pub error: Option<StreamError>,
}

impl JobStatus {
    fn from_stream(stream: &JobStream) -> Self {
        Self {
            job_id: stream.job_id().to_string(),
            phase: stream.phase(),
            snapshot: stream.latest().cloned(),
            error: stream.last_error().cloned(),
        }
    }

    pub fn view(&self) -> Option<ProgressView> {
        self.snapshot.as_ref().map(ProgressView::from_snapshot)
    }

    /// Terminal, or dropped back to idle after a connection error.
    pub fn is_settled(&self) -> bool {
        self.phase.is_terminal()
            || (self.phase == JobPhase::Idle && matches!(self.error, Some(StreamError::Connection(_))))
    }
}

/// Caller's view of one observation. Closing or dropping it tears down the
/// transport; the server-side job keeps running.
pub struct ProgressHandle {
    job_id: JobId,
    status: watch::Receiver<JobStatus>,
    cancel: CancellationToken,
}

impl ProgressHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn status(&self) -> JobStatus {
        self.status.borrow().clone()
    }

    /// Waits for the next published status. `None` once the observation has ended.
    pub async fn changed(&mut self) -> Option<JobStatus> {
        self.status.changed().await.ok()?;
        Some(self.status())
    }

    /// Waits until the job is terminal, the connection failed, or the observation ended.
    pub async fn wait(&mut self) -> JobStatus {
        loop {
            let current = self.status();
            if current.is_settled() {
                return current;
            }
            if self.status.changed().await.is_err() {
                return self.status();
            }
        }
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct ProgressClient {
    api: ApiClient,
    config: ClientConfig,
    transport: Arc<dyn ProgressTransport>,
    registry: Arc<JobRegistry>,
    sink: Arc<dyn NotificationSink>,
    heartbeat: Duration,
}

impl ProgressClient {
    pub fn new(
        api: ApiClient,
        config: &ClientConfig,
        registry: Arc<JobRegistry>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let transport = Arc::new(HttpProgressTransport::new(api.clone(), config));
        Self {
            api,
            config: config.clone(),
            transport,
            registry,
            sink,
            heartbeat: config.heartbeat(),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn ProgressTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Starts observing `job_id`, or resumes the most recently registered job
    /// when no id is given. The job is registered before this returns. Must be
    /// called from within a tokio runtime.
    ///
    /// A failed connection is reported once through the handle; call again to retry.
    pub fn observe(
        &self,
        job_id: Option<&str>,
        title: Option<&str>,
    ) -> Result<ProgressHandle, StreamError> {
        let (job_id, title) = match job_id {
            Some(id) => (id.to_string(), title.map(str::to_string)),
            None => {
                let record = self.registry.most_recent().ok_or(StreamError::NoActiveJob)?;
                sync_info!("Resuming most recent job {}", record.job_id);
                let title = title.map(str::to_string).or(record.title);
                (record.job_id, title)
            }
        };

        let stream = JobStream::new(job_id.clone());
        let (status_tx, status_rx) = watch::channel(JobStatus::from_stream(&stream));
        let cancel = CancellationToken::new();
        let mut observation = Observation {
            machine: stream,
            registry: self.registry.clone(),
            sink: self.sink.clone(),
            status_tx,
            open_requested: false,
            heartbeat_on: false,
            closed: false,
        };
        observation.dispatch(StreamMsg::Observe { title });
        if observation.open_requested {
            tokio::spawn(observation.run(self.transport.clone(), self.heartbeat, cancel.clone()));
        }

        Ok(ProgressHandle {
            job_id,
            status: status_rx,
            cancel,
        })
    }

    /// Asks the server to cancel the job. Completion shows up later as a
    /// `cancel_requested` snapshot on the stream.
    pub async fn cancel_job(&self, job_id: &str) -> Result<(), RemoteError> {
        let path = self.config.cancel_path_for(job_id)?;
        self.api
            .send_mutating::<()>(Method::POST, &path, None)
            .await?;
        sync_info!("Cancellation requested for job {}", job_id);
        Ok(())
    }
}

enum Wake {
    Closed,
    Chunk(Option<Result<Bytes, RemoteError>>),
    Heartbeat,
}

struct Observation {
    machine: JobStream,
    registry: Arc<JobRegistry>,
    sink: Arc<dyn NotificationSink>,
    status_tx: watch::Sender<JobStatus>,
    open_requested: bool,
    heartbeat_on: bool,
    closed: bool,
}

impl Observation {
    async fn run(
        mut self,
        transport: Arc<dyn ProgressTransport>,
        period: Duration,
        cancel: CancellationToken,
    ) {
        let job_id = self.machine.job_id().to_string();

        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            connected = transport.connect(&job_id) => connected,
        };
        let mut stream = match connected {
            Ok(stream) => stream,
            Err(err) => {
                self.dispatch(StreamMsg::TransportFailed(err.to_string()));
                return;
            }
        };
        sync_debug!("Progress stream open for job {}", job_id);

        let mut decoder = SseDecoder::new();
        let mut heartbeat: Option<Interval> = None;
        while !self.closed {
            let wake = tokio::select! {
                biased;
                _ = cancel.cancelled() => Wake::Closed,
                chunk = stream.next() => Wake::Chunk(chunk),
                _ = next_tick(&mut heartbeat) => Wake::Heartbeat,
            };
            match wake {
                Wake::Closed => {
                    sync_debug!("Observation of job {} closed by caller", job_id);
                    break;
                }
                Wake::Chunk(Some(Ok(bytes))) => {
                    for event in decoder.push(&bytes) {
                        self.deliver(event);
                        if self.closed {
                            break;
                        }
                    }
                }
                Wake::Chunk(Some(Err(err))) => {
                    self.dispatch(StreamMsg::TransportFailed(err.to_string()));
                }
                Wake::Chunk(None) => {
                    if let Some(event) = decoder.finish() {
                        self.deliver(event);
                    }
                    self.dispatch(StreamMsg::TransportEnded);
                    self.closed = true;
                }
                Wake::Heartbeat => self.dispatch(StreamMsg::HeartbeatTick),
            }

            if self.heartbeat_on && heartbeat.is_none() {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                heartbeat = Some(interval);
            } else if !self.heartbeat_on {
                heartbeat = None;
            }
        }
    }

    fn deliver(&mut self, event: SseEvent) {
        if event.is_progress() {
            self.dispatch(StreamMsg::Payload(event.data));
        } else {
            sync_trace!(
                "Job {}: skipping {:?} event",
                self.machine.job_id(),
                event.event
            );
        }
    }

    fn dispatch(&mut self, msg: StreamMsg) {
        let current = std::mem::replace(&mut self.machine, JobStream::new(String::new()));
        let (next, effects) = update(current, msg);
        self.machine = next;
        for effect in effects {
            self.run_effect(effect);
        }
        self.status_tx
            .send_replace(JobStatus::from_stream(&self.machine));
    }

    fn run_effect(&mut self, effect: StreamEffect) {
        match effect {
            StreamEffect::RegisterJob { job_id, title } => {
                self.registry.register(&job_id, title.as_deref());
            }
            StreamEffect::OpenTransport { .. } => self.open_requested = true,
            StreamEffect::Publish(_) => {}
            StreamEffect::StartHeartbeat => self.heartbeat_on = true,
            StreamEffect::CancelHeartbeat => self.heartbeat_on = false,
            StreamEffect::Notify(notification) => self.sink.emit(notification),
            StreamEffect::CloseTransport => self.closed = true,
            StreamEffect::UnregisterJob { job_id } => self.registry.unregister(&job_id),
            StreamEffect::ReportError(err) => {
                sync_warn!("Job {}: {}", self.machine.job_id(), err);
            }
        }
    }
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
