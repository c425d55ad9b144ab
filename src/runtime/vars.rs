/// Per-session variable scope with text interpolation
///
/// Values are untyped scalars (string/number/boolean). An unset lookup is
/// the `None` sentinel, never an error; interpolation leaves unknown
/// `{{name}}` tokens verbatim so authors can spot typos in rendered output.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A scalar variable value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl VarValue {
    /// Parse raw user input: numbers become `Number`, everything else `Text`
    pub fn from_input(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => VarValue::Number(n),
            _ => VarValue::Text(raw.to_string()),
        }
    }

    /// Numeric view of this value, if it coerces
    pub fn as_number(&self) -> Option<f64> {
        match self {
            VarValue::Number(n) => Some(*n),
            VarValue::Text(s) => s.trim().parse::<f64>().ok(),
            VarValue::Bool(_) => None,
        }
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::Bool(b) => write!(f, "{}", b),
            // Integral numbers render without the trailing ".0" the float
            // representation would otherwise leak into user-facing text
            VarValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            VarValue::Number(n) => write!(f, "{}", n),
            VarValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for VarValue {
    fn from(s: &str) -> Self {
        VarValue::Text(s.to_string())
    }
}

impl From<f64> for VarValue {
    fn from(n: f64) -> Self {
        VarValue::Number(n)
    }
}

/// Key/value scope owned by one execution session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableStore {
    values: HashMap<String, VarValue>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from initial variables (session start)
    pub fn from_initial(initial: HashMap<String, VarValue>) -> Self {
        Self { values: initial }
    }

    /// Current value of a variable; `None` means unset
    pub fn get(&self, name: &str) -> Option<&VarValue> {
        self.values.get(name)
    }

    /// Overwrite semantics; no type coercion at write time
    pub fn set(&mut self, name: &str, value: VarValue) {
        self.values.insert(name.to_string(), value);
    }

    /// Remove the key entirely; a subsequent `get` returns unset
    pub fn clear(&mut self, name: &str) {
        self.values.remove(name);
    }

    /// Replace every `{{name}}` occurrence with the stringified value
    ///
    /// Unset or unknown variables stay as the literal token. Inner
    /// whitespace is tolerated (`{{ name }}`), matching what the editor
    /// emits.
    pub fn interpolate(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let after_open = &rest[open + 2..];
            match after_open.find("}}") {
                Some(close) => {
                    let name = after_open[..close].trim();
                    match self.values.get(name) {
                        Some(value) => out.push_str(&value.to_string()),
                        // Unknown variable: keep the token verbatim
                        None => out.push_str(&rest[open..open + 2 + close + 2]),
                    }
                    rest = &after_open[close + 2..];
                }
                None => {
                    // Unterminated token: emit the remainder as-is
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Snapshot of the full scope (persistence, inspection API)
    pub fn snapshot(&self) -> &HashMap<String, VarValue> {
        &self.values
    }
}
