/// Execution controller: the per-session tick state machine
///
/// Walks a compiled funnel graph one externally-triggered tick at a time.
/// A tick runs the interpreter loop until the session suspends (waiting
/// for user input or a timer), halts, or trips the runaway-loop guard.
/// The loop replaces the recursive walk a naive interpreter would use, so
/// the position survives in `current_node_id` across process restarts and
/// across suspensions that can last minutes.

use crate::error::SessionError;
use crate::funnel::graph::CompiledFunnel;
use crate::funnel::types::Handle;
use crate::runtime::executor::{self, Continuation, Effect, Waiting};
use crate::runtime::transcript::{Transcript, TranscriptEvent};
use crate::runtime::vars::{VarValue, VariableStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    WaitingForInput,
    Finished,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::WaitingForInput => write!(f, "waiting_for_input"),
            SessionStatus::Finished => write!(f, "finished"),
        }
    }
}

/// Mutable per-conversation execution state
///
/// Everything that must survive a restart lives here (and is persisted by
/// the session store); the graph itself is referenced by funnel ID only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub session_id: Uuid,
    pub funnel_id: String,
    /// The node awaiting resumption while suspended
    pub current_node_id: Option<String>,
    pub status: SessionStatus,
    pub variables: VariableStore,
    /// Monotonic step counter since session start
    pub step_count: u64,
    /// What the session is suspended on, when status is waiting_for_input
    pub waiting: Option<Waiting>,
    /// Absolute wake deadline for a pending delay timer
    pub wake_at: Option<DateTime<Utc>>,
    pub transcript: Transcript,
}

impl ExecutionState {
    /// Fresh state positioned at the funnel's start node
    pub fn new(session_id: Uuid, funnel: &CompiledFunnel, variables: VariableStore) -> Self {
        Self {
            session_id,
            funnel_id: funnel.definition.id.clone(),
            current_node_id: Some(funnel.start_node().id.clone()),
            status: SessionStatus::Running,
            variables,
            step_count: 0,
            waiting: None,
            wake_at: None,
            transcript: Transcript::new(),
        }
    }
}

/// External trigger advancing a session by one tick
#[derive(Debug, Clone)]
pub enum TickInput {
    /// First tick after session creation
    Start,
    /// A user message arrived while the session was suspended on a question
    UserInput(String),
    /// A delay timer fired
    TimerFired,
}

/// The interpreter loop driver
///
/// Stateless apart from the loop ceiling; one instance serves every
/// session. All I/O (persistence, timers, effect delivery) belongs to the
/// session manager, which keeps this walkable in plain unit tests.
#[derive(Debug)]
pub struct ExecutionEngine {
    /// Runaway-loop guard: max interpreter iterations within one tick
    max_steps_per_tick: u64,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self {
            max_steps_per_tick: 1000,
        }
    }
}

impl ExecutionEngine {
    pub fn new(max_steps_per_tick: u64) -> Self {
        Self { max_steps_per_tick }
    }

    /// Advance a session by one tick
    ///
    /// Returns the ordered effects produced, ready for a transport layer.
    /// Caller errors (finished session, missing input) are typed; authoring
    /// mistakes never surface as errors, they degrade inside the loop.
    pub fn tick(
        &self,
        funnel: &CompiledFunnel,
        state: &mut ExecutionState,
        input: TickInput,
    ) -> Result<Vec<Effect>, SessionError> {
        if state.status == SessionStatus::Finished {
            return Err(SessionError::AlreadyFinished);
        }

        tracing::debug!(
            "🎬 Tick for session {} (funnel '{}', status {})",
            state.session_id,
            state.funnel_id,
            state.status
        );

        let mut effects = Vec::new();
        let mut current = match self.resolve_entry(funnel, state, input)? {
            Some(node_id) => node_id,
            None => return Ok(effects),
        };

        let mut steps_this_tick = 0u64;
        loop {
            steps_this_tick += 1;
            state.step_count += 1;
            if steps_this_tick > self.max_steps_per_tick {
                // Safety valve against default→default cycles with no
                // terminal or suspending node
                tracing::warn!(
                    "🛑 Session {} exceeded {} steps in one tick, force-finishing",
                    state.session_id,
                    self.max_steps_per_tick
                );
                state.transcript.record(
                    Some(&current),
                    TranscriptEvent::LoopLimitExceeded,
                    json!({ "limit": self.max_steps_per_tick }),
                );
                self.finish(state);
                break;
            }

            let Some(node) = funnel.node(&current) else {
                // Cannot happen for validated graphs; treat as branch end
                tracing::error!("❌ Session {}: unknown node '{}'", state.session_id, current);
                self.finish(state);
                break;
            };

            state.current_node_id = Some(node.id.clone());
            let outcome = executor::execute_step(node, &mut state.variables);
            for effect in &outcome.effects {
                if let Some(event) = event_for(effect) {
                    state
                        .transcript
                        .record(Some(&node.id), event, payload_for(effect));
                }
            }
            effects.extend(outcome.effects);

            match outcome.continuation {
                Continuation::Advance(handle) => {
                    match funnel.outgoing_edge(&node.id, &handle) {
                        Some(edge) => current = edge.target.clone(),
                        None => {
                            // Unterminated branch: the conversation silently
                            // ends instead of erroring
                            tracing::debug!(
                                "🔚 Session {}: no edge from '{}' (handle '{}'), finishing",
                                state.session_id,
                                node.id,
                                handle
                            );
                            self.finish(state);
                            break;
                        }
                    }
                }
                Continuation::Suspend(waiting) => {
                    self.suspend(state, waiting, &node.id);
                    break;
                }
                Continuation::Halt => {
                    self.finish(state);
                    break;
                }
            }
        }

        tracing::debug!(
            "🏁 Tick done for session {} ({} effects, status {})",
            state.session_id,
            effects.len(),
            state.status
        );
        Ok(effects)
    }

    /// Validate the trigger against the session state and return the node
    /// to execute first, applying the input-resume rules
    ///
    /// Returns `Ok(None)` when the tick legitimately produces no work
    /// (resume handle resolves to no edge: the branch ends).
    fn resolve_entry(
        &self,
        funnel: &CompiledFunnel,
        state: &mut ExecutionState,
        input: TickInput,
    ) -> Result<Option<String>, SessionError> {
        match (state.status, input) {
            (SessionStatus::Running, TickInput::Start) => {
                state
                    .transcript
                    .record(None, TranscriptEvent::SessionStarted, json!({ "funnel": state.funnel_id }));
                Ok(state.current_node_id.clone())
            }

            (SessionStatus::WaitingForInput, TickInput::UserInput(value)) => {
                let Some(Waiting::Input {
                    variable,
                    choices,
                    numeric,
                }) = state.waiting.clone()
                else {
                    return Err(SessionError::NotWaitingForInput);
                };

                let stored = if numeric {
                    VarValue::from_input(&value)
                } else {
                    VarValue::Text(value.clone())
                };
                state.variables.set(&variable, stored);
                state.transcript.record(
                    state.current_node_id.as_deref(),
                    TranscriptEvent::InputReceived,
                    json!({ "variable": variable, "value": value }),
                );

                // The raw answer doubles as the resume handle for choice
                // questions; everything else resumes along the default edge
                let handle = if choices.is_empty() {
                    Handle::Default
                } else {
                    Handle::Label(value)
                };
                self.resume_from_current(funnel, state, handle)
            }

            (SessionStatus::WaitingForInput, TickInput::TimerFired) => {
                if !matches!(state.waiting, Some(Waiting::Timer { .. })) {
                    return Err(SessionError::NotWaitingForTimer);
                }
                state.transcript.record(
                    state.current_node_id.as_deref(),
                    TranscriptEvent::DelayElapsed,
                    Value::Null,
                );
                self.resume_from_current(funnel, state, Handle::Default)
            }

            (SessionStatus::WaitingForInput, TickInput::Start) => Err(SessionError::InputRequired),
            (SessionStatus::Running, _) => Err(SessionError::NotWaitingForInput),
            (SessionStatus::Finished, _) => Err(SessionError::AlreadyFinished),
        }
    }

    /// Advance past the suspended node along the resume handle
    fn resume_from_current(
        &self,
        funnel: &CompiledFunnel,
        state: &mut ExecutionState,
        handle: Handle,
    ) -> Result<Option<String>, SessionError> {
        state.status = SessionStatus::Running;
        state.waiting = None;
        state.wake_at = None;

        let current = state
            .current_node_id
            .clone()
            .ok_or(SessionError::NotWaitingForInput)?;

        match funnel.outgoing_edge(&current, &handle) {
            Some(edge) => Ok(Some(edge.target.clone())),
            None => {
                // Dangling resume: the branch ends with no further effects
                tracing::debug!(
                    "🔚 Session {}: resume handle '{}' has no edge from '{}', finishing",
                    state.session_id,
                    handle,
                    current
                );
                self.finish(state);
                Ok(None)
            }
        }
    }

    fn suspend(&self, state: &mut ExecutionState, waiting: Waiting, node_id: &str) {
        if let Waiting::Timer { seconds } = &waiting {
            state.wake_at = Some(Utc::now() + chrono::Duration::seconds(*seconds as i64));
            state.transcript.record(
                Some(node_id),
                TranscriptEvent::DelayScheduled,
                json!({ "seconds": seconds }),
            );
        }
        state.status = SessionStatus::WaitingForInput;
        state.waiting = Some(waiting);
        tracing::debug!("⏸️ Session {} suspended at '{}'", state.session_id, node_id);
    }

    fn finish(&self, state: &mut ExecutionState) {
        state.status = SessionStatus::Finished;
        state.waiting = None;
        state.wake_at = None;
        state.transcript.record(
            None,
            TranscriptEvent::SessionFinished,
            json!({ "steps": state.step_count }),
        );
    }
}

/// Transcript classification of an effect
///
/// `None` for effects whose entry is already recorded by the state
/// transition itself: `finish()` logs the terminal entry, `suspend()`
/// logs the delay schedule.
fn event_for(effect: &Effect) -> Option<TranscriptEvent> {
    match effect {
        Effect::Message { .. } => Some(TranscriptEvent::Message),
        Effect::Prompt { .. } | Effect::ChoicePrompt { .. } => Some(TranscriptEvent::QuestionAsked),
        Effect::Notify { .. } => Some(TranscriptEvent::Notify),
        Effect::WebhookCall { .. } => Some(TranscriptEvent::WebhookDispatched),
        Effect::Payment { .. } => Some(TranscriptEvent::Payment),
        Effect::Delivery { .. } => Some(TranscriptEvent::Delivery),
        Effect::Remarketing { .. } => Some(TranscriptEvent::Remarketing),
        Effect::ConfigError { .. } => Some(TranscriptEvent::ConfigError),
        Effect::Waiting { .. } | Effect::Finished => None,
    }
}

fn payload_for(effect: &Effect) -> Value {
    serde_json::to_value(effect).unwrap_or(Value::Null)
}
