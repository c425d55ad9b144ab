/// Condition evaluation
///
/// Pure and total: every declared operator on every input produces a
/// boolean. Numeric comparisons coerce both sides; a failed coercion
/// yields `false`, never an error, so a typo in a funnel can redirect a
/// conversation but can never crash it.

use crate::funnel::types::CompareOp;
use crate::runtime::vars::VarValue;

/// Evaluate a comparison operator against a variable value
///
/// `actual` is the current variable value (`None` = unset); `expected` is
/// the author-provided operand, already interpolated.
pub fn evaluate(op: CompareOp, actual: Option<&VarValue>, expected: &str) -> bool {
    match op {
        CompareOp::Equals => actual_string(actual) == expected,
        CompareOp::NotEquals => actual_string(actual) != expected,
        CompareOp::Contains => actual_string(actual).contains(expected),
        CompareOp::Greater => match (actual_number(actual), parse_number(expected)) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        },
        CompareOp::Less => match (actual_number(actual), parse_number(expected)) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        },
        CompareOp::Exists => exists(actual),
        CompareOp::Empty => !exists(actual),
    }
}

/// Unset, and the empty string, both count as "does not exist"
fn exists(actual: Option<&VarValue>) -> bool {
    match actual {
        None => false,
        Some(VarValue::Text(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn actual_string(actual: Option<&VarValue>) -> String {
    actual.map(|v| v.to_string()).unwrap_or_default()
}

fn actual_number(actual: Option<&VarValue>) -> Option<f64> {
    actual.and_then(|v| v.as_number())
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok()
}
