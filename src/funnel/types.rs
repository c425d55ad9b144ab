/// Core funnel type definitions
///
/// Defines the wire-level structures for funnel graphs as produced by the
/// visual editor: nodes with a `type` discriminator plus a `data` payload,
/// and optionally-labeled edges. These types are serialized/deserialized
/// from JSON for persistence and compiled into typed form by `graph.rs`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A complete funnel definition as stored and edited
///
/// Funnels are stored as JSON in SQLite and compiled into `CompiledFunnel`
/// for execution. `schemaVersion` tracks the editor's graph schema; the
/// engine accepts any version and validates structure itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelDefinition {
    /// Unique funnel identifier (e.g., "fn-launch-offer")
    pub id: String,
    /// Human-readable funnel name
    pub name: String,
    /// Graph schema version emitted by the editor
    #[serde(rename = "schemaVersion", default = "default_schema_version")]
    pub schema_version: u32,
    /// List of nodes in this funnel
    pub nodes: Vec<NodeDef>,
    /// List of edges connecting nodes
    pub edges: Vec<Edge>,
}

fn default_schema_version() -> u32 {
    1
}

/// A single node as it appears on the wire
///
/// The editor mixes all step configuration into a freeform `data` bag; the
/// compile step (`graph.rs`) parses it into the typed `NodeConfig` union so
/// the step executor table is exhaustiveness-checked at compile time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    /// Unique node identifier within the funnel (e.g., "n1", "msg-welcome")
    pub id: String,
    /// The node kind, determines execution behavior
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Kind-specific configuration payload as flexible JSON
    #[serde(default)]
    pub data: Value,
}

/// Closed set of step kinds the engine executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Entry point; exactly one per funnel
    Start,
    /// Emit an interpolated text message (optional media attachment)
    #[serde(alias = "action_message")]
    Message,
    /// Ask for free text, suspend until the user answers
    QuestionText,
    /// Ask the user to pick from an enumerated choice list
    QuestionChoice,
    /// Ask for a number; parseable answers are stored as numbers
    QuestionNumber,
    /// Branch on a variable comparison (true/false handles)
    Condition,
    /// Pause for a configured duration, then resume autonomously
    Delay,
    /// Set or clear a variable
    VariableOp,
    /// Emit an administrator-facing notification
    Notify,
    /// Emit an outbound HTTP call effect (fire-and-continue)
    Webhook,
    /// Emit a payment request effect
    Payment,
    /// Emit a product delivery effect
    Delivery,
    /// Emit a remarketing follow-up effect
    Remarketing,
    /// Terminal node; zero or more per funnel
    End,
}

/// Directed connection between two nodes
///
/// `sourceHandle` labels which outcome of the source node this edge follows:
/// `true`/`false` for condition nodes, a choice ID for question_choice
/// nodes, absent (or `"default"`) for the single unconditional edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Unique edge identifier
    pub id: String,
    /// Source node ID
    pub source: String,
    /// Target node ID
    pub target: String,
    /// Optional outcome label on the source side
    #[serde(rename = "sourceHandle", default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
}

/// Outgoing-edge selector: which labeled outcome of a node to follow
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Handle {
    /// The single unconditional edge (absent or `"default"` on the wire)
    Default,
    /// A labeled outcome: `true`/`false` or a choice ID
    Label(String),
}

impl Handle {
    /// Build a handle from a wire-level `sourceHandle` value
    pub fn from_wire(raw: Option<&str>) -> Self {
        match raw {
            None | Some("default") | Some("") => Handle::Default,
            Some(label) => Handle::Label(label.to_string()),
        }
    }

    /// Whether this handle matches a wire-level `sourceHandle` value
    pub fn matches(&self, raw: Option<&str>) -> bool {
        *self == Handle::from_wire(raw)
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handle::Default => write!(f, "default"),
            Handle::Label(label) => write!(f, "{}", label),
        }
    }
}

/// Comparison operators for condition nodes
///
/// The set is closed and every operator is total: evaluation never fails,
/// it only produces `true` or `false` (see `runtime::condition`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Equals,
    NotEquals,
    Contains,
    Greater,
    Less,
    Exists,
    Empty,
}

/// Variable mutation kinds for variable_op nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarAction {
    Set,
    Clear,
}

/// One selectable option of a question_choice node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// Stable choice identifier; doubles as the resume handle label
    pub id: String,
    /// Text shown to the user
    #[serde(default)]
    pub label: String,
}

/// Typed, kind-specific node configuration
///
/// Required fields are modeled as `Option` on purpose: the editor can save
/// half-finished nodes, and the engine's failure policy is to detect the
/// missing field at execution time and degrade gracefully rather than
/// reject the whole funnel at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeConfig {
    Start,
    Message(MessageConfig),
    QuestionText(QuestionConfig),
    QuestionNumber(QuestionConfig),
    QuestionChoice(ChoiceQuestionConfig),
    Condition(ConditionConfig),
    Delay(DelayConfig),
    VariableOp(VariableOpConfig),
    Notify(NotifyConfig),
    Webhook(WebhookConfig),
    Payment(PaymentConfig),
    Delivery(DeliveryConfig),
    Remarketing(RemarketingConfig),
    End,
}

impl NodeConfig {
    /// The node kind this configuration belongs to
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeConfig::Start => NodeKind::Start,
            NodeConfig::Message(_) => NodeKind::Message,
            NodeConfig::QuestionText(_) => NodeKind::QuestionText,
            NodeConfig::QuestionNumber(_) => NodeKind::QuestionNumber,
            NodeConfig::QuestionChoice(_) => NodeKind::QuestionChoice,
            NodeConfig::Condition(_) => NodeKind::Condition,
            NodeConfig::Delay(_) => NodeKind::Delay,
            NodeConfig::VariableOp(_) => NodeKind::VariableOp,
            NodeConfig::Notify(_) => NodeKind::Notify,
            NodeConfig::Webhook(_) => NodeKind::Webhook,
            NodeConfig::Payment(_) => NodeKind::Payment,
            NodeConfig::Delivery(_) => NodeKind::Delivery,
            NodeConfig::Remarketing(_) => NodeKind::Remarketing,
            NodeConfig::End => NodeKind::End,
        }
    }
}

/// Configuration for message nodes
/// Expected data: { "text": "Hi {{name}}!", "mediaUrl": "https://..." }
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageConfig {
    pub text: Option<String>,
    #[serde(rename = "mediaUrl", default)]
    pub media_url: Option<String>,
}

/// Configuration for question_text / question_number nodes
/// Expected data: { "text": "How old are you?", "variable": "age" }
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionConfig {
    pub text: Option<String>,
    /// Variable name the next user answer is written into
    pub variable: Option<String>,
}

/// Configuration for question_choice nodes
/// Expected data: { "text": "Pick one", "variable": "plan",
///                  "choices": [{"id": "basic", "label": "Basic"}] }
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceQuestionConfig {
    pub text: Option<String>,
    pub variable: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

/// Configuration for condition nodes
/// Expected data: { "variable": "age", "operator": "greater", "value": "18" }
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub variable: Option<String>,
    pub operator: Option<CompareOp>,
    pub value: Option<String>,
}

/// Configuration for delay nodes
/// Expected data: { "seconds": 300 }
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DelayConfig {
    pub seconds: Option<u64>,
}

/// Configuration for variable_op nodes
/// Expected data: { "action": "set", "variable": "stage", "value": "paid" }
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableOpConfig {
    pub action: Option<VarAction>,
    pub variable: Option<String>,
    pub value: Option<String>,
}

/// Configuration for notify nodes
/// Expected data: { "message": "Lead {{name}} reached checkout" }
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub message: Option<String>,
}

/// Configuration for webhook nodes
/// Expected data: { "url": "https://api.example.com/hook", "method": "POST",
///                  "body": "{\"lead\": \"{{name}}\"}" }
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub method: Option<String>,
    pub body: Option<String>,
}

/// Configuration for payment nodes
/// Expected data: { "amount": 49.9, "product": "course-pro", "currency": "BRL" }
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfig {
    pub amount: Option<f64>,
    pub product: Option<String>,
    pub currency: Option<String>,
}

/// Configuration for delivery nodes
/// Expected data: { "product": "course-pro", "message": "Here is your access" }
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub product: Option<String>,
    pub message: Option<String>,
}

/// Configuration for remarketing nodes
/// Expected data: { "message": "Still interested?", "delaySeconds": 3600,
///                  "maxAttempts": 3 }
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemarketingConfig {
    pub message: Option<String>,
    #[serde(rename = "delaySeconds", default)]
    pub delay_seconds: Option<u64>,
    #[serde(rename = "maxAttempts", default)]
    pub max_attempts: Option<u32>,
}

/// A node after compilation: typed config, ready for the step executor
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub config: NodeConfig,
}
