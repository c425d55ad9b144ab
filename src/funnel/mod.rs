/// Funnel definition layer
///
/// Handles the graph data structure the visual editor produces: wire
/// types, compilation into the validated immutable form the engine walks,
/// persistence, and the hot-reload registry.

// Wire-level and typed node/edge structures
pub mod types;

// Compiled, validated funnel graph
pub mod graph;

// SQLite persistence for funnel definitions
pub mod storage;

// Hot-reload registry (arc-swap)
pub mod registry;

pub use graph::{CompiledFunnel, SharedFunnel};
pub use registry::FunnelRegistry;
pub use storage::FunnelStorage;
pub use types::{Edge, FunnelDefinition, Handle, Node, NodeConfig, NodeKind};
