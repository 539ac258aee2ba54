//! Predicates evaluated by Conditional nodes.
//!
//! A [`Condition`] is data, not code: authors pick a predicate kind and the
//! engine evaluates it synchronously against the run's variables or the
//! host environment. Evaluation never fails — a missing or ill-typed
//! variable is an authoring error that logs a warning and evaluates false,
//! routing the Conditional's "false" port.

use serde::{Deserialize, Serialize};

use crate::action::Host;
use crate::variable::VariableStore;

/// Comparison operator for numeric predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    fn holds<T: PartialOrd>(self, left: T, right: T) -> bool {
        match self {
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
        }
    }
}

/// A predicate kind evaluated by a Conditional node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "test", rename_all = "snake_case")]
pub enum Condition {
    /// True when a Bool variable equals the expected value.
    BoolEquals {
        /// Variable to read.
        variable: String,
        /// Expected value.
        expected: bool,
    },
    /// Compares an Int variable against a constant operand.
    IntCompare {
        /// Variable to read.
        variable: String,
        /// Comparison operator.
        op: CompareOp,
        /// Right-hand side of the comparison.
        operand: i64,
    },
    /// Compares a Float variable against a constant operand.
    FloatCompare {
        /// Variable to read.
        variable: String,
        /// Comparison operator.
        op: CompareOp,
        /// Right-hand side of the comparison.
        operand: f64,
    },
    /// True when a String variable equals the expected text exactly.
    StringEquals {
        /// Variable to read.
        variable: String,
        /// Expected text, compared case-sensitively.
        expected: String,
    },
    /// True when the host can resolve an object at the given path.
    ObjectExists {
        /// Host-environment object path.
        path: String,
    },
    /// True when the host object at the given path exists and is active.
    ObjectActive {
        /// Host-environment object path.
        path: String,
    },
}

impl Condition {
    /// Evaluates the predicate against the run's variables and host.
    #[must_use]
    pub fn evaluate(&self, vars: &VariableStore, host: &dyn Host) -> bool {
        match self {
            Condition::BoolEquals { variable, expected } => {
                match vars.get_bool(variable) {
                    Some(actual) => actual == *expected,
                    None => missing(variable),
                }
            }
            Condition::IntCompare {
                variable,
                op,
                operand,
            } => match vars.get_int(variable) {
                Some(actual) => op.holds(actual, *operand),
                None => missing(variable),
            },
            Condition::FloatCompare {
                variable,
                op,
                operand,
            } => match vars.get_float(variable) {
                Some(actual) => op.holds(actual, *operand),
                None => missing(variable),
            },
            Condition::StringEquals { variable, expected } => match vars.get(variable) {
                Some(value) => value.as_str() == *expected,
                None => missing(variable),
            },
            Condition::ObjectExists { path } => host.object_exists(path),
            Condition::ObjectActive { path } => host.object_active(path),
        }
    }
}

fn missing(variable: &str) -> bool {
    tracing::warn!(variable, "condition references a missing or ill-typed variable");
    false
}
