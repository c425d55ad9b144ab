//! End-to-end funnel execution scenarios driven through the engine and
//! the session manager.

use funnelflow::funnel::graph::CompiledFunnel;
use funnelflow::funnel::registry::FunnelRegistry;
use funnelflow::funnel::storage::FunnelStorage;
use funnelflow::funnel::types::FunnelDefinition;
use funnelflow::runtime::dispatch::EffectDispatcher;
use funnelflow::runtime::session::SessionManager;
use funnelflow::runtime::store::SessionStore;
use funnelflow::runtime::transcript::TranscriptEvent;
use funnelflow::{
    Effect, ExecutionEngine, ExecutionState, SessionStatus, TickInput, VarValue, VariableStore,
    Waiting,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

fn compile(graph: Value) -> CompiledFunnel {
    let def: FunnelDefinition = serde_json::from_value(graph).expect("valid definition");
    CompiledFunnel::compile(def).expect("compilable funnel")
}

fn run(funnel: &CompiledFunnel, vars: VariableStore) -> (ExecutionState, Vec<Effect>) {
    let engine = ExecutionEngine::default();
    let mut state = ExecutionState::new(Uuid::new_v4(), funnel, vars);
    let effects = engine
        .tick(funnel, &mut state, TickInput::Start)
        .expect("first tick succeeds");
    (state, effects)
}

/// Scenario A: start → message("Hi {{name}}") → end with {name: "Ana"}
/// produces exactly one interpolated message, then finished.
#[test]
fn scenario_message_interpolation_to_end() {
    let funnel = compile(json!({
        "id": "fn-a", "name": "greeting",
        "schemaVersion": 1,
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "hi", "type": "message", "data": { "text": "Hi {{name}}" } },
            { "id": "end", "type": "end", "data": {} }
        ],
        "edges": [
            { "id": "e1", "source": "start", "target": "hi" },
            { "id": "e2", "source": "hi", "target": "end" }
        ]
    }));

    let mut vars = VariableStore::new();
    vars.set("name", "Ana".into());
    let (state, effects) = run(&funnel, vars);

    assert_eq!(
        effects,
        vec![
            Effect::Message {
                text: "Hi Ana".into(),
                media_url: None
            },
            Effect::Finished
        ]
    );
    assert_eq!(state.status, SessionStatus::Finished);
    assert!(state.transcript.contains(TranscriptEvent::SessionStarted));
    assert!(state.transcript.contains(TranscriptEvent::SessionFinished));
}

/// Scenario B: condition(age > 18) routes to the true branch only.
#[test]
fn scenario_condition_routes_single_branch() {
    let funnel = compile(json!({
        "id": "fn-b", "name": "age-gate",
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "check", "type": "condition",
              "data": { "variable": "age", "operator": "greater", "value": "18" } },
            { "id": "adult", "type": "message", "data": { "text": "adult" } },
            { "id": "minor", "type": "message", "data": { "text": "minor" } },
            { "id": "end", "type": "end", "data": {} }
        ],
        "edges": [
            { "id": "e1", "source": "start", "target": "check" },
            { "id": "e2", "source": "check", "target": "adult", "sourceHandle": "true" },
            { "id": "e3", "source": "check", "target": "minor", "sourceHandle": "false" },
            { "id": "e4", "source": "adult", "target": "end" },
            { "id": "e5", "source": "minor", "target": "end" }
        ]
    }));

    let mut vars = VariableStore::new();
    vars.set("age", 20.0.into());
    let (state, effects) = run(&funnel, vars);

    let texts: Vec<&str> = effects
        .iter()
        .filter_map(|e| match e {
            Effect::Message { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["adult"]);
    assert_eq!(state.status, SessionStatus::Finished);
}

/// Scenario C: question_choice suspends, the answer becomes both the
/// stored variable and the resume handle.
#[test]
fn scenario_choice_suspend_and_resume() {
    let funnel = compile(json!({
        "id": "fn-c", "name": "plan-picker",
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "pick", "type": "question_choice",
              "data": { "text": "Pick one", "variable": "picked",
                        "choices": [ { "id": "A", "label": "Option A" },
                                     { "id": "B", "label": "Option B" } ] } },
            { "id": "end", "type": "end", "data": {} }
        ],
        "edges": [
            { "id": "e1", "source": "start", "target": "pick" },
            { "id": "e2", "source": "pick", "target": "end", "sourceHandle": "A" },
            { "id": "e3", "source": "pick", "target": "end", "sourceHandle": "B" }
        ]
    }));

    let engine = ExecutionEngine::default();
    let mut state = ExecutionState::new(Uuid::new_v4(), &funnel, VariableStore::new());

    let effects = engine.tick(&funnel, &mut state, TickInput::Start).unwrap();
    assert_eq!(state.status, SessionStatus::WaitingForInput);
    assert!(matches!(effects[0], Effect::ChoicePrompt { .. }));

    let effects = engine
        .tick(&funnel, &mut state, TickInput::UserInput("A".into()))
        .unwrap();
    assert_eq!(state.status, SessionStatus::Finished);
    assert_eq!(effects, vec![Effect::Finished]);
    assert_eq!(
        state.variables.get("picked"),
        Some(&VarValue::Text("A".into()))
    );
}

/// Scenario D: a condition with no false edge ends the session silently
/// when the input evaluates false.
#[test]
fn scenario_dangling_branch_ends_session() {
    let funnel = compile(json!({
        "id": "fn-d", "name": "one-sided",
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "check", "type": "condition",
              "data": { "variable": "vip", "operator": "equals", "value": "yes" } },
            { "id": "hello", "type": "message", "data": { "text": "welcome vip" } },
            { "id": "end", "type": "end", "data": {} }
        ],
        "edges": [
            { "id": "e1", "source": "start", "target": "check" },
            { "id": "e2", "source": "check", "target": "hello", "sourceHandle": "true" },
            { "id": "e3", "source": "hello", "target": "end" }
        ]
    }));

    let mut vars = VariableStore::new();
    vars.set("vip", "no".into());
    let (state, effects) = run(&funnel, vars);

    assert_eq!(state.status, SessionStatus::Finished);
    assert!(effects.is_empty());
}

/// Scenario E: a two-node variable_op cycle with no terminal trips the
/// runaway-loop guard and force-finishes with a transcript entry.
#[test]
fn scenario_runaway_loop_is_force_finished() {
    let funnel = compile(json!({
        "id": "fn-e", "name": "infinite",
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "a", "type": "variable_op",
              "data": { "action": "set", "variable": "x", "value": "1" } },
            { "id": "b", "type": "variable_op",
              "data": { "action": "set", "variable": "x", "value": "2" } }
        ],
        "edges": [
            { "id": "e1", "source": "start", "target": "a" },
            { "id": "e2", "source": "a", "target": "b" },
            { "id": "e3", "source": "b", "target": "a" }
        ]
    }));

    let (state, effects) = run(&funnel, VariableStore::new());

    assert_eq!(state.status, SessionStatus::Finished);
    assert!(state.transcript.contains(TranscriptEvent::LoopLimitExceeded));
    // Only the guard's force-finish; variable_op nodes emit nothing
    assert!(effects.is_empty());
}

/// Webhook nodes dispatch and continue without blocking on the call.
#[test]
fn webhook_is_fire_and_continue() {
    let funnel = compile(json!({
        "id": "fn-w", "name": "hook",
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "hook", "type": "webhook",
              "data": { "url": "https://example.com/{{lead}}", "method": "POST",
                        "body": "{\"lead\": \"{{lead}}\"}" } },
            { "id": "bye", "type": "message", "data": { "text": "done" } },
            { "id": "end", "type": "end", "data": {} }
        ],
        "edges": [
            { "id": "e1", "source": "start", "target": "hook" },
            { "id": "e2", "source": "hook", "target": "bye" },
            { "id": "e3", "source": "bye", "target": "end" }
        ]
    }));

    let mut vars = VariableStore::new();
    vars.set("lead", "ana42".into());
    let (state, effects) = run(&funnel, vars);

    assert_eq!(state.status, SessionStatus::Finished);
    assert_eq!(
        effects[0],
        Effect::WebhookCall {
            method: "POST".into(),
            url: "https://example.com/ana42".into(),
            body: Some("{\"lead\": \"ana42\"}".into()),
        }
    );
    assert!(matches!(effects[1], Effect::Message { .. }));
}

async fn manager_with(graph: Value) -> Arc<SessionManager> {
    // One connection: each pooled connection would otherwise open its
    // own private :memory: database
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");

    let funnel_storage = FunnelStorage::new(pool.clone());
    funnel_storage.init_schema().await.unwrap();
    let session_store = SessionStore::new(pool);
    session_store.init_schema().await.unwrap();

    let def: FunnelDefinition = serde_json::from_value(graph).unwrap();
    funnel_storage.save_funnel(&def).await.unwrap();

    let registry = Arc::new(FunnelRegistry::new(funnel_storage));
    registry.init_from_storage().await.unwrap();

    Arc::new(SessionManager::new(
        registry,
        session_store,
        EffectDispatcher::new(),
    ))
}

/// Full session lifecycle through the manager: question suspend, input
/// resume, persistence-backed state inspection.
#[tokio::test]
async fn session_manager_suspends_and_resumes() {
    let manager = manager_with(json!({
        "id": "fn-m", "name": "ask-name",
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "ask", "type": "question_text",
              "data": { "text": "Name?", "variable": "name" } },
            { "id": "hi", "type": "message", "data": { "text": "Hi {{name}}" } },
            { "id": "end", "type": "end", "data": {} }
        ],
        "edges": [
            { "id": "e1", "source": "start", "target": "ask" },
            { "id": "e2", "source": "ask", "target": "hi" },
            { "id": "e3", "source": "hi", "target": "end" }
        ]
    }))
    .await;

    let (session_id, effects) = manager
        .start_session("fn-m", HashMap::new())
        .await
        .unwrap();
    assert!(matches!(effects[0], Effect::Prompt { .. }));

    let snapshot = manager.session_state(session_id).await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::WaitingForInput);

    let effects = manager
        .resume_session(session_id, "Ana".into())
        .await
        .unwrap();
    assert_eq!(
        effects,
        vec![
            Effect::Message {
                text: "Hi Ana".into(),
                media_url: None
            },
            Effect::Finished
        ]
    );

    let snapshot = manager.session_state(session_id).await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::Finished);

    // A finished session rejects further input
    let err = manager.resume_session(session_id, "again".into()).await;
    assert!(err.is_err());
}

/// A zero-second delay auto-resumes through the timer path without any
/// external input.
#[tokio::test]
async fn delay_timer_auto_resumes_session() {
    let manager = manager_with(json!({
        "id": "fn-t", "name": "pause",
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "wait", "type": "delay", "data": { "seconds": 0 } },
            { "id": "after", "type": "message", "data": { "text": "back" } },
            { "id": "end", "type": "end", "data": {} }
        ],
        "edges": [
            { "id": "e1", "source": "start", "target": "wait" },
            { "id": "e2", "source": "wait", "target": "after" },
            { "id": "e3", "source": "after", "target": "end" }
        ]
    }))
    .await;

    let (session_id, effects) = manager.start_session("fn-t", HashMap::new()).await.unwrap();
    assert_eq!(effects, vec![Effect::Waiting { seconds: 0 }]);

    // The timer task fires on its own; poll until the session finishes
    let mut finished = false;
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let snapshot = manager.session_state(session_id).await.unwrap();
        if snapshot.status == SessionStatus::Finished {
            finished = true;
            break;
        }
    }
    assert!(finished, "delay session should auto-finish via the timer");
}

/// Consecutive delay nodes re-arm the timer from inside a timer-driven
/// tick; the session walks both pauses unattended.
#[tokio::test]
async fn chained_delays_rearm_timer_from_timer_tick() {
    let manager = manager_with(json!({
        "id": "fn-dd", "name": "double-pause",
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "p1", "type": "delay", "data": { "seconds": 0 } },
            { "id": "p2", "type": "delay", "data": { "seconds": 0 } },
            { "id": "end", "type": "end", "data": {} }
        ],
        "edges": [
            { "id": "e1", "source": "start", "target": "p1" },
            { "id": "e2", "source": "p1", "target": "p2" },
            { "id": "e3", "source": "p2", "target": "end" }
        ]
    }))
    .await;

    let (session_id, effects) = manager.start_session("fn-dd", HashMap::new()).await.unwrap();
    assert_eq!(effects, vec![Effect::Waiting { seconds: 0 }]);

    let mut finished = false;
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let snapshot = manager.session_state(session_id).await.unwrap();
        if snapshot.status == SessionStatus::Finished {
            finished = true;
            break;
        }
    }
    assert!(finished, "both delays should elapse without external input");
}

/// A restart restores unfinished sessions from storage and reschedules
/// pending delay timers from the persisted wake deadline; an elapsed
/// deadline fires immediately, and sessions whose funnel is gone are
/// skipped.
#[tokio::test]
async fn restart_restores_delayed_session_and_fires_elapsed_timer() {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");

    let funnel_storage = FunnelStorage::new(pool.clone());
    funnel_storage.init_schema().await.unwrap();
    let session_store = SessionStore::new(pool);
    session_store.init_schema().await.unwrap();

    let def: FunnelDefinition = serde_json::from_value(json!({
        "id": "fn-r", "name": "resume-after-restart",
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "wait", "type": "delay", "data": { "seconds": 60 } },
            { "id": "after", "type": "message", "data": { "text": "back" } },
            { "id": "end", "type": "end", "data": {} }
        ],
        "edges": [
            { "id": "e1", "source": "start", "target": "wait" },
            { "id": "e2", "source": "wait", "target": "after" },
            { "id": "e3", "source": "after", "target": "end" }
        ]
    }))
    .unwrap();
    funnel_storage.save_funnel(&def).await.unwrap();

    let registry = Arc::new(FunnelRegistry::new(funnel_storage));
    registry.init_from_storage().await.unwrap();
    let funnel = registry.get_funnel("fn-r").unwrap();

    // Persist a session suspended on the delay, deadline already passed
    let session_id = Uuid::new_v4();
    let mut state = ExecutionState::new(session_id, &funnel, VariableStore::new());
    state.status = SessionStatus::WaitingForInput;
    state.current_node_id = Some("wait".into());
    state.waiting = Some(Waiting::Timer { seconds: 60 });
    state.wake_at = Some(chrono::Utc::now() - chrono::Duration::seconds(5));
    session_store.save_session(&state).await.unwrap();

    // A leftover row for a deleted funnel must not block the restore
    let mut orphan = state.clone();
    orphan.session_id = Uuid::new_v4();
    orphan.funnel_id = "ghost".into();
    let orphan_id = orphan.session_id;
    session_store.save_session(&orphan).await.unwrap();

    let manager = Arc::new(SessionManager::new(
        registry,
        session_store,
        EffectDispatcher::new(),
    ));
    manager.restore_from_storage().await.unwrap();
    assert!(manager.session_state(orphan_id).await.is_err());

    let mut finished = false;
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let snapshot = manager.session_state(session_id).await.unwrap();
        if snapshot.status == SessionStatus::Finished {
            finished = true;
            break;
        }
    }
    assert!(finished, "restored session should resume via its timer");
}

/// Funnel listings expose the lifted metadata columns without decoding
/// the stored graph JSON.
#[tokio::test]
async fn funnel_listing_carries_graph_metadata() {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    let storage = FunnelStorage::new(pool);
    storage.init_schema().await.unwrap();

    let def: FunnelDefinition = serde_json::from_value(json!({
        "id": "fn-meta", "name": "meta", "schemaVersion": 3,
        "nodes": [
            { "id": "s", "type": "start", "data": {} },
            { "id": "e", "type": "end", "data": {} }
        ],
        "edges": [{ "id": "e1", "source": "s", "target": "e" }]
    }))
    .unwrap();
    storage.save_funnel(&def).await.unwrap();

    let listed = storage.list_funnels().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, "fn-meta");
    assert_eq!(listed[0].schema_version, 3);
    assert_eq!(listed[0].node_count, 2);
}

/// Deleting a session with a pending timer cancels the wake-up; the
/// stale timer never resurrects it.
#[tokio::test]
async fn deleted_session_is_not_resurrected_by_timer() {
    let manager = manager_with(json!({
        "id": "fn-del", "name": "pause",
        "nodes": [
            { "id": "start", "type": "start", "data": {} },
            { "id": "wait", "type": "delay", "data": { "seconds": 1 } },
            { "id": "end", "type": "end", "data": {} }
        ],
        "edges": [
            { "id": "e1", "source": "start", "target": "wait" },
            { "id": "e2", "source": "wait", "target": "end" }
        ]
    }))
    .await;

    let (session_id, _) = manager.start_session("fn-del", HashMap::new()).await.unwrap();
    assert!(manager.delete_session(session_id).await.unwrap());

    tokio::time::sleep(std::time::Duration::from_millis(1200)).await;
    assert!(manager.session_state(session_id).await.is_err());
}
