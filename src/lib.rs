/// Funnelflow: conversational funnel execution engine
///
/// This library provides the interpreter that runs visually-authored
/// sales funnels against live conversations: a typed step graph, a
/// per-session variable scope, suspend/resume across user input and
/// timed delays, and an effect contract for the chat transport layer.

// Core configuration and setup
pub mod config;

// Typed error taxonomy (graph validation, session state machine)
pub mod error;

// Funnel definition layer: wire types, compilation, storage, registry
pub mod funnel;

// Runtime execution engine: variables, conditions, step executors,
// the tick state machine, session management
pub mod runtime;

// HTTP API layer: funnel CRUD and session lifecycle endpoints
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use error::{GraphError, SessionError};
pub use funnel::{CompiledFunnel, FunnelDefinition, FunnelRegistry, Handle, NodeKind};
pub use runtime::{
    Effect, ExecutionEngine, ExecutionState, SessionManager, SessionStatus, TickInput, VarValue,
    VariableStore, Waiting,
};
pub use server::start_server;
