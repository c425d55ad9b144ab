/// Step executors: one handler per node kind
///
/// Each handler turns the current node plus the session's variable scope
/// into an `Effect` (the externally observable action, if any) and a
/// `Continuation` (how the controller proceeds). Handlers never perform
/// I/O and never fail: a missing required field produces a `ConfigError`
/// effect and the node behaves as an advance-default, per the engine's
/// failure policy.

use crate::funnel::types::{Choice, Handle, Node, NodeConfig, VarAction};
use crate::runtime::condition;
use crate::runtime::vars::{VarValue, VariableStore};
use std::time::Duration;

/// Externally observable action a collaborator should perform
///
/// Serialized into API responses so the transport layer (Telegram bot,
/// sandbox simulator, ...) can deliver it. Tagged by kind on the wire.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    /// Send an interpolated text message to the user
    Message {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_url: Option<String>,
    },
    /// Ask an open question; the session suspends until answered
    Prompt { text: String, variable: String },
    /// Ask a multiple-choice question
    ChoicePrompt {
        text: String,
        variable: String,
        choices: Vec<Choice>,
    },
    /// Show a "waiting" indicator while a delay timer runs
    Waiting { seconds: u64 },
    /// Administrator-facing notification
    Notify { message: String },
    /// Outbound HTTP call, fire-and-continue
    WebhookCall {
        method: String,
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },
    /// Request a payment from the user
    Payment {
        amount: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        product: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        currency: Option<String>,
    },
    /// Deliver a purchased product
    Delivery {
        #[serde(skip_serializing_if = "Option::is_none")]
        product: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Schedule a remarketing follow-up
    Remarketing {
        message: String,
        delay_seconds: u64,
        max_attempts: u32,
    },
    /// The conversation reached an end node
    Finished,
    /// Authoring mistake detected at execution time (observability only)
    ConfigError { node_id: String, message: String },
}

/// What kind of external event a suspended session is waiting on
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Waiting {
    /// The next user message; it is written into `variable`
    Input {
        variable: String,
        /// Declared choice IDs when the answer doubles as the resume
        /// handle; empty for free-text/number questions
        #[serde(default)]
        choices: Vec<String>,
        /// Numeric answers are parsed before storing
        #[serde(default)]
        numeric: bool,
    },
    /// A scheduled wake-up after the configured duration
    Timer { seconds: u64 },
}

impl Waiting {
    /// Timer duration, when this wait is a timer
    pub fn timer_duration(&self) -> Option<Duration> {
        match self {
            Waiting::Timer { seconds } => Some(Duration::from_secs(*seconds)),
            Waiting::Input { .. } => None,
        }
    }
}

/// How the controller proceeds after a step
#[derive(Debug, Clone, PartialEq)]
pub enum Continuation {
    /// Follow the outgoing edge with this handle
    Advance(Handle),
    /// Stop the loop and wait for an external event
    Suspend(Waiting),
    /// The conversation is over
    Halt,
}

/// Result of executing a single step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Ordered effects produced by this step (usually zero or one)
    pub effects: Vec<Effect>,
    pub continuation: Continuation,
}

impl StepOutcome {
    fn advance(effects: Vec<Effect>) -> Self {
        Self {
            effects,
            continuation: Continuation::Advance(Handle::Default),
        }
    }

    fn suspend(effects: Vec<Effect>, waiting: Waiting) -> Self {
        Self {
            effects,
            continuation: Continuation::Suspend(waiting),
        }
    }
}

/// Missing required field: record the mistake and keep the conversation
/// moving along the default edge (the controller halts if there is none).
fn config_error(node: &Node, message: &str) -> StepOutcome {
    tracing::warn!("⚠️ Node '{}' ({:?}): {}", node.id, node.kind, message);
    StepOutcome::advance(vec![Effect::ConfigError {
        node_id: node.id.clone(),
        message: message.to_string(),
    }])
}

/// Execute one node against the session's variable scope
///
/// Pure except for variable mutation; all delivery is delegated to the
/// effects the caller collects.
pub fn execute_step(node: &Node, vars: &mut VariableStore) -> StepOutcome {
    match &node.config {
        NodeConfig::Start => StepOutcome::advance(vec![]),

        NodeConfig::Message(cfg) => match &cfg.text {
            Some(text) => StepOutcome::advance(vec![Effect::Message {
                text: vars.interpolate(text),
                media_url: cfg.media_url.clone(),
            }]),
            None => config_error(node, "message node is missing 'text'"),
        },

        NodeConfig::QuestionText(cfg) | NodeConfig::QuestionNumber(cfg) => {
            let (Some(text), Some(variable)) = (&cfg.text, &cfg.variable) else {
                return config_error(node, "question node requires 'text' and 'variable'");
            };
            StepOutcome::suspend(
                vec![Effect::Prompt {
                    text: vars.interpolate(text),
                    variable: variable.clone(),
                }],
                Waiting::Input {
                    variable: variable.clone(),
                    choices: vec![],
                    numeric: matches!(node.config, NodeConfig::QuestionNumber(_)),
                },
            )
        }

        NodeConfig::QuestionChoice(cfg) => {
            let (Some(text), Some(variable)) = (&cfg.text, &cfg.variable) else {
                return config_error(node, "question_choice node requires 'text' and 'variable'");
            };
            if cfg.choices.is_empty() {
                return config_error(node, "question_choice node has no choices");
            }
            StepOutcome::suspend(
                vec![Effect::ChoicePrompt {
                    text: vars.interpolate(text),
                    variable: variable.clone(),
                    choices: cfg.choices.clone(),
                }],
                Waiting::Input {
                    variable: variable.clone(),
                    choices: cfg.choices.iter().map(|c| c.id.clone()).collect(),
                    numeric: false,
                },
            )
        }

        NodeConfig::Condition(cfg) => {
            let (Some(variable), Some(operator)) = (&cfg.variable, cfg.operator) else {
                return config_error(node, "condition node requires 'variable' and 'operator'");
            };
            let expected = vars.interpolate(cfg.value.as_deref().unwrap_or(""));
            let outcome = condition::evaluate(operator, vars.get(variable), &expected);
            tracing::debug!(
                "🔀 Condition '{}': {} {:?} '{}' => {}",
                node.id,
                variable,
                operator,
                expected,
                outcome
            );
            StepOutcome {
                effects: vec![],
                continuation: Continuation::Advance(Handle::Label(outcome.to_string())),
            }
        }

        NodeConfig::Delay(cfg) => match cfg.seconds {
            Some(seconds) => StepOutcome::suspend(
                vec![Effect::Waiting { seconds }],
                Waiting::Timer { seconds },
            ),
            None => config_error(node, "delay node is missing 'seconds'"),
        },

        NodeConfig::VariableOp(cfg) => {
            let (Some(action), Some(variable)) = (cfg.action, &cfg.variable) else {
                return config_error(node, "variable_op node requires 'action' and 'variable'");
            };
            match action {
                VarAction::Set => {
                    let raw = cfg.value.as_deref().unwrap_or("");
                    let value = VarValue::from_input(&vars.interpolate(raw));
                    vars.set(variable, value);
                }
                VarAction::Clear => vars.clear(variable),
            }
            StepOutcome::advance(vec![])
        }

        NodeConfig::Notify(cfg) => match &cfg.message {
            Some(message) => StepOutcome::advance(vec![Effect::Notify {
                message: vars.interpolate(message),
            }]),
            None => config_error(node, "notify node is missing 'message'"),
        },

        NodeConfig::Webhook(cfg) => match &cfg.url {
            Some(url) => StepOutcome::advance(vec![Effect::WebhookCall {
                method: cfg.method.clone().unwrap_or_else(|| "POST".to_string()),
                url: vars.interpolate(url),
                body: cfg.body.as_deref().map(|b| vars.interpolate(b)),
            }]),
            None => config_error(node, "webhook node is missing 'url'"),
        },

        NodeConfig::Payment(cfg) => match cfg.amount {
            Some(amount) => StepOutcome::advance(vec![Effect::Payment {
                amount,
                product: cfg.product.clone(),
                currency: cfg.currency.clone(),
            }]),
            None => config_error(node, "payment node is missing 'amount'"),
        },

        NodeConfig::Delivery(cfg) => StepOutcome::advance(vec![Effect::Delivery {
            product: cfg.product.clone(),
            message: cfg.message.as_deref().map(|m| vars.interpolate(m)),
        }]),

        NodeConfig::Remarketing(cfg) => match &cfg.message {
            Some(message) => StepOutcome::advance(vec![Effect::Remarketing {
                message: vars.interpolate(message),
                delay_seconds: cfg.delay_seconds.unwrap_or(0),
                max_attempts: cfg.max_attempts.unwrap_or(1),
            }]),
            None => config_error(node, "remarketing node is missing 'message'"),
        },

        NodeConfig::End => StepOutcome {
            effects: vec![Effect::Finished],
            continuation: Continuation::Halt,
        },
    }
}
