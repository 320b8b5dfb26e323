//! Deployment events.
//!
//! Stages report progress through an [`EventSink`]. [`RunEvents`] stamps
//! every payload with the run identity before handing it to the sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::context::RunIdentity;
use serde_json::{json, Value as Json};
use std::sync::Arc;

/// Event types emitted during a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A stage began.
    StageStarted,
    /// A stage finished and its checkpoint was written.
    StageCompleted,
    /// A stage was skipped because its checkpoint already existed.
    StageSkipped,
    /// A stage failed.
    StageFailed,
    /// A transaction was submitted.
    TxSubmitted,
    /// A transaction was confirmed.
    TxConfirmed,
    /// A publication batch was confirmed and recorded.
    BatchConfirmed,
    /// A follow-up transition failed; the run continues.
    FollowUpFailed,
    /// The run future was dropped before it finished.
    RunAbandoned,
}

impl EventKind {
    /// Dotted event type name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StageStarted => "stage.started",
            Self::StageCompleted => "stage.completed",
            Self::StageSkipped => "stage.skipped",
            Self::StageFailed => "stage.failed",
            Self::TxSubmitted => "tx.submitted",
            Self::TxConfirmed => "tx.confirmed",
            Self::BatchConfirmed => "batch.confirmed",
            Self::FollowUpFailed => "followup.failed",
            Self::RunAbandoned => "run.abandoned",
        }
    }
}

/// A sink bound to one run attempt.
#[derive(Clone)]
pub struct RunEvents {
    sink: Arc<dyn EventSink>,
    identity: RunIdentity,
}

impl std::fmt::Debug for RunEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunEvents")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl RunEvents {
    /// Binds a sink to a run identity.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>, identity: RunIdentity) -> Self {
        Self { sink, identity }
    }

    /// Events for `run_id` that go nowhere.
    #[must_use]
    pub fn noop(run_id: &str) -> Self {
        Self::new(Arc::new(NoOpEventSink), RunIdentity::new(run_id))
    }

    /// The identity stamped on events.
    #[must_use]
    pub const fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Emits an event. Object payloads gain `run_id` and `attempt_id` fields.
    pub async fn emit(&self, kind: EventKind, data: Json) {
        self.sink.emit(kind.as_str(), Some(self.stamp(data))).await;
    }

    /// Emits an event from a context that cannot await.
    pub fn try_emit(&self, kind: EventKind, data: Json) {
        self.sink.try_emit(kind.as_str(), Some(self.stamp(data)));
    }

    fn stamp(&self, data: Json) -> Json {
        match data {
            Json::Object(mut map) => {
                map.insert("run_id".into(), json!(self.identity.run_id));
                map.insert("attempt_id".into(), json!(self.identity.attempt_id.to_string()));
                Json::Object(map)
            }
            other => other,
        }
    }
}
