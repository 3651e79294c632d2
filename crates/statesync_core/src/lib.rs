//! Statesync core: pure data model and state machines, no I/O.
mod effect;
mod error;
mod job;
mod msg;
mod preset;
mod scope;
mod state;
mod subscribers;
mod update;
mod view_model;

pub use effect::{Notification, NotificationLevel, StreamEffect};
pub use error::{PresetStateError, StorageError, StreamError, ValidationError};
pub use job::{JobId, JobRecord, ProgressSnapshot, TerminalKind};
pub use msg::StreamMsg;
pub use preset::{
    validate_new_preset_name, validate_preset_name, NewPreset, PresetId, PresetPatch,
    SavedStatePreset, MAX_PRESET_NAME_LEN,
};
pub use scope::{ScopeKey, ScopeParseError, ScopeType};
pub use state::{fragments_diverge, ActivePresetPointer, CurrentStateRecord, ScopeState, StateData};
pub use subscribers::{Deferred, DeferredMutation, Subscriber, SubscriberRegistry, SubscriptionId};
pub use update::{update, JobPhase, JobStream};
pub use view_model::{heartbeat_notification, terminal_notification, ProgressView};
