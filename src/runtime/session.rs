/// Session manager: concurrency, persistence, and delay timers
///
/// Owns every live session. Each session carries its own tokio mutex so
/// concurrent ticks for the same conversation serialize, while distinct
/// sessions run fully in parallel. After every tick the state is persisted
/// and side-effecting effects are handed to the dispatcher. Delay nodes
/// get a one-shot timer task whose handle is tracked for cancellation:
/// deleting or finishing a session aborts the pending timer, and a stale
/// fire re-checks state under the session lock and no-ops.

use crate::error::SessionError;
use crate::funnel::registry::FunnelRegistry;
use crate::runtime::dispatch::EffectDispatcher;
use crate::runtime::engine::{ExecutionEngine, ExecutionState, SessionStatus, TickInput};
use crate::runtime::executor::{Effect, Waiting};
use crate::runtime::store::SessionStore;
use crate::runtime::transcript::TranscriptEntry;
use crate::runtime::vars::{VarValue, VariableStore};
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// One live session: its state behind a per-session lock
#[derive(Debug)]
struct SessionSlot {
    state: Mutex<ExecutionState>,
}

/// Coordinates sessions across the registry, store, and dispatcher
pub struct SessionManager {
    registry: Arc<FunnelRegistry>,
    store: SessionStore,
    dispatcher: EffectDispatcher,
    engine: ExecutionEngine,
    sessions: RwLock<HashMap<Uuid, Arc<SessionSlot>>>,
    /// Pending delay-timer tasks, keyed by session, for cancellation
    timers: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(registry: Arc<FunnelRegistry>, store: SessionStore, dispatcher: EffectDispatcher) -> Self {
        Self {
            registry,
            store,
            dispatcher,
            engine: ExecutionEngine::default(),
            sessions: RwLock::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Restore unfinished sessions from storage after a restart
    ///
    /// Sessions whose funnel no longer exists are skipped with a warning.
    /// Pending delay timers are rescheduled from the persisted wake
    /// deadline; elapsed deadlines fire immediately.
    pub async fn restore_from_storage(self: &Arc<Self>) -> anyhow::Result<()> {
        let states = self.store.load_unfinished_sessions().await?;
        let mut restored = 0usize;

        for state in states {
            if self.registry.get_funnel(&state.funnel_id).is_none() {
                tracing::warn!(
                    "⚠️ Skipping restore of session {}: funnel '{}' no longer exists",
                    state.session_id,
                    state.funnel_id
                );
                continue;
            }

            let session_id = state.session_id;
            let pending_timer = match (&state.waiting, state.wake_at) {
                (Some(Waiting::Timer { .. }), Some(wake_at)) => {
                    let remaining = (wake_at - Utc::now()).num_milliseconds().max(0) as u64;
                    Some(Duration::from_millis(remaining))
                }
                _ => None,
            };

            self.sessions.write().await.insert(
                session_id,
                Arc::new(SessionSlot {
                    state: Mutex::new(state),
                }),
            );
            if let Some(delay) = pending_timer {
                self.schedule_wake(session_id, delay).await;
            }
            restored += 1;
        }

        tracing::info!("📥 Restored {} unfinished sessions from storage", restored);
        Ok(())
    }

    /// Begin a new session at the funnel's start node and run the first tick
    pub async fn start_session(
        self: &Arc<Self>,
        funnel_id: &str,
        initial_variables: HashMap<String, VarValue>,
    ) -> Result<(Uuid, Vec<Effect>), SessionError> {
        let funnel = self
            .registry
            .get_funnel(funnel_id)
            .ok_or_else(|| SessionError::FunnelNotFound(funnel_id.to_string()))?;

        let session_id = Uuid::new_v4();
        let state = ExecutionState::new(
            session_id,
            &funnel,
            VariableStore::from_initial(initial_variables),
        );
        let slot = Arc::new(SessionSlot {
            state: Mutex::new(state),
        });
        self.sessions.write().await.insert(session_id, Arc::clone(&slot));

        tracing::info!("🚀 Starting session {} on funnel '{}'", session_id, funnel_id);

        let mut state = slot.state.lock().await;
        let effects = self.engine.tick(&funnel, &mut state, TickInput::Start)?;
        self.after_tick(session_id, &state, &effects).await;
        Ok((session_id, effects))
    }

    /// Resume a suspended session with the user's answer
    pub async fn resume_session(
        self: &Arc<Self>,
        session_id: Uuid,
        input: String,
    ) -> Result<Vec<Effect>, SessionError> {
        let slot = self.slot(session_id).await?;
        let mut state = slot.state.lock().await;
        let funnel = self
            .registry
            .get_funnel(&state.funnel_id)
            .ok_or_else(|| SessionError::FunnelNotFound(state.funnel_id.clone()))?;

        tracing::info!("💬 Input for session {}: resuming", session_id);
        let effects = self
            .engine
            .tick(&funnel, &mut state, TickInput::UserInput(input))?;
        self.after_tick(session_id, &state, &effects).await;
        Ok(effects)
    }

    /// Internal tick fired by a delay timer
    ///
    /// Stale fires (session finished, deleted, or no longer waiting on a
    /// timer) are silently dropped; they must never resurrect a session.
    pub async fn tick_timer(self: &Arc<Self>, session_id: Uuid) {
        let Ok(slot) = self.slot(session_id).await else {
            tracing::debug!("⏭️ Timer fired for unknown session {}, ignoring", session_id);
            return;
        };
        let mut state = slot.state.lock().await;
        if state.status != SessionStatus::WaitingForInput
            || !matches!(state.waiting, Some(Waiting::Timer { .. }))
        {
            tracing::debug!("⏭️ Stale timer for session {}, ignoring", session_id);
            return;
        }

        let Some(funnel) = self.registry.get_funnel(&state.funnel_id) else {
            tracing::warn!(
                "⚠️ Timer fired for session {} but funnel '{}' is gone",
                session_id,
                state.funnel_id
            );
            return;
        };

        tracing::info!("⏰ Delay elapsed for session {}, resuming", session_id);
        match self.engine.tick(&funnel, &mut state, TickInput::TimerFired) {
            Ok(effects) => self.after_tick(session_id, &state, &effects).await,
            Err(e) => tracing::error!("❌ Timer tick failed for session {}: {}", session_id, e),
        }
    }

    /// Snapshot of a session's state (inspection API)
    pub async fn session_state(&self, session_id: Uuid) -> Result<ExecutionState, SessionError> {
        let slot = self.slot(session_id).await?;
        let state = slot.state.lock().await;
        Ok(state.clone())
    }

    /// Copy of a session's transcript entries
    pub async fn session_transcript(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<TranscriptEntry>, SessionError> {
        let slot = self.slot(session_id).await?;
        let state = slot.state.lock().await;
        Ok(state.transcript.entries().to_vec())
    }

    /// Archive a session: drop it from memory, cancel its timer, delete
    /// the persisted row
    pub async fn delete_session(&self, session_id: Uuid) -> Result<bool, SessionError> {
        self.cancel_timer(session_id).await;
        let removed = self.sessions.write().await.remove(&session_id).is_some();

        match self.store.delete_session(session_id).await {
            Ok(deleted) => Ok(removed || deleted),
            Err(e) => {
                tracing::error!("❌ Failed to delete session {} from storage: {}", session_id, e);
                Ok(removed)
            }
        }
    }

    /// Post-tick bookkeeping: persist, dispatch, manage the delay timer
    async fn after_tick(self: &Arc<Self>, session_id: Uuid, state: &ExecutionState, effects: &[Effect]) {
        if let Err(e) = self.store.save_session(state).await {
            // Persistence trouble must not wedge the conversation
            tracing::error!("❌ Failed to persist session {}: {}", session_id, e);
        }

        self.dispatcher.dispatch(session_id, effects);

        match (&state.status, &state.waiting) {
            (SessionStatus::WaitingForInput, Some(waiting)) => {
                if let Some(delay) = waiting.timer_duration() {
                    self.schedule_wake(session_id, delay).await;
                }
            }
            (SessionStatus::Finished, _) => {
                self.cancel_timer(session_id).await;
                tracing::info!(
                    "🏁 Session {} finished after {} steps",
                    session_id,
                    state.step_count
                );
            }
            _ => {}
        }
    }

    /// Arm (or re-arm) the one-shot wake-up task for a delay node
    fn schedule_wake<'a>(
        self: &'a Arc<Self>,
        session_id: Uuid,
        delay: Duration,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let manager = Arc::clone(self);
            // The wake-up task re-enters the manager, which may arm the next
            // wake-up; boxing keeps the spawned future's type finite.
            let task: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
                tokio::time::sleep(delay).await;
                manager.tick_timer(session_id).await;
            });
            let handle = tokio::spawn(task);

            let mut timers = self.timers.lock().await;
            if let Some(old) = timers.insert(session_id, handle) {
                old.abort();
            }
            tracing::debug!(
                "⏲️ Scheduled wake-up for session {} in {:?}",
                session_id,
                delay
            );
        })
    }

    async fn cancel_timer(&self, session_id: Uuid) {
        if let Some(handle) = self.timers.lock().await.remove(&session_id) {
            handle.abort();
            tracing::debug!("🛑 Cancelled pending timer for session {}", session_id);
        }
    }

    async fn slot(&self, session_id: Uuid) -> Result<Arc<SessionSlot>, SessionError> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(SessionError::NotFound(session_id))
    }
}
