/// Append-only session transcript
///
/// Records what the engine did, for observability and debugging only; the
/// interpreter never reads it back. Entries mirror node kinds plus the
/// session lifecycle and failure events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event classification of a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptEvent {
    SessionStarted,
    SessionFinished,
    Message,
    QuestionAsked,
    InputReceived,
    ConditionEvaluated,
    DelayScheduled,
    DelayElapsed,
    VariableChanged,
    Notify,
    WebhookDispatched,
    Payment,
    Delivery,
    Remarketing,
    ConfigError,
    LoopLimitExceeded,
}

/// One recorded event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub timestamp: DateTime<Utc>,
    /// Node the event belongs to; absent for session lifecycle events
    pub node_id: Option<String>,
    pub event: TranscriptEvent,
    /// Free-form, event-specific detail
    pub payload: Value,
}

/// Append-only event log owned by one session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, node_id: Option<&str>, event: TranscriptEvent, payload: Value) {
        self.entries.push(TranscriptEntry {
            timestamp: Utc::now(),
            node_id: node_id.map(str::to_string),
            event,
            payload,
        });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Whether any entry matches the given event (test/debug helper)
    pub fn contains(&self, event: TranscriptEvent) -> bool {
        self.entries.iter().any(|e| e.event == event)
    }
}
