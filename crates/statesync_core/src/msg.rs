/// Inputs to a job's progress state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMsg {
    /// Caller asked to observe the job.
    Observe { title: Option<String> },
    /// One raw event payload arrived on the transport.
    Payload(String),
    /// The transport reported an error.
    TransportFailed(String),
    /// The transport closed on its own.
    TransportEnded,
    /// Heartbeat interval elapsed.
    HeartbeatTick,
}
