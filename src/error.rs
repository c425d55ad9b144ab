/// Engine error taxonomy
///
/// Two typed surfaces: `GraphError` for load-time structural problems that
/// are reported back to the author, and `SessionError` for caller mistakes
/// against the session state machine. Authoring mistakes inside a running
/// conversation are deliberately NOT errors; the step executor degrades
/// them per the failure policy so a session can never get stuck.

use thiserror::Error;
use uuid::Uuid;

/// Structural problems detected when compiling a funnel definition
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("funnel has no start node")]
    MissingStart,

    #[error("funnel has {0} start nodes, expected exactly one")]
    MultipleStarts(usize),

    #[error("edge '{edge_id}' references unknown node '{node_id}'")]
    DanglingEdge { edge_id: String, node_id: String },

    #[error("duplicate node id '{node_id}'")]
    DuplicateNodeId { node_id: String },
}

/// Caller errors against the session state machine
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(Uuid),

    #[error("funnel not found: {0}")]
    FunnelNotFound(String),

    #[error("session already finished")]
    AlreadyFinished,

    #[error("session is waiting for user input; this tick must carry a value")]
    InputRequired,

    #[error("session is not waiting for user input")]
    NotWaitingForInput,

    #[error("session is not waiting on a timer")]
    NotWaitingForTimer,
}
