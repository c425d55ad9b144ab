/// Runtime execution engine
///
/// The interpreter that runs funnel graphs against live conversations:
/// - Per-session variable scope and text interpolation
/// - Pure condition evaluation
/// - Step executors producing effects and continuations
/// - The tick state machine with suspend/resume and the loop guard
/// - Session management: locking, persistence, delay timers
/// - Append-only transcripts for observability

// Variable scope and {{...}} interpolation
pub mod vars;

// Pure condition evaluation
pub mod condition;

// Per-kind step handlers
pub mod executor;

// The tick state machine
pub mod engine;

// Append-only session event log
pub mod transcript;

// SQLite persistence of session state
pub mod store;

// Fire-and-forget outbound effect dispatch
pub mod dispatch;

// Session lifecycle, locking, and delay timers
pub mod session;

pub use engine::{ExecutionEngine, ExecutionState, SessionStatus, TickInput};
pub use executor::{Continuation, Effect, StepOutcome, Waiting};
pub use session::SessionManager;
pub use store::SessionStore;
pub use vars::{VarValue, VariableStore};
