use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use super::formula::Expr;

/// One context entry. Only `Locked` survives a resolver pass untouched;
/// a `Formula` binding reads as 0 until the resolver replaces it with
/// `Computed`, which is what makes forward references observe stale zeros.
#[derive(Debug, Clone)]
pub enum Binding {
    Literal(f64),
    Formula(Arc<Expr>),
    Computed(f64),
    Locked(f64),
}

impl Binding {
    pub fn number(&self) -> f64 {
        match self {
            Binding::Literal(v) | Binding::Computed(v) | Binding::Locked(v) => *v,
            Binding::Formula(_) => 0.0,
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Binding::Locked(_))
    }
}

/// Named-field state for one computation pass. Year contexts are clones of
/// the primed base context; ASTs sit behind `Arc` so the clone is cheap and
/// no expression is reparsed.
#[derive(Debug, Clone, Default)]
pub struct Context {
    bindings: HashMap<String, Binding>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    /// Numeric view of a field: missing fields and unresolved formulas read
    /// as 0.
    pub fn number(&self, name: &str) -> f64 {
        self.bindings.get(name).map_or(0.0, Binding::number)
    }

    pub fn is_locked(&self, name: &str) -> bool {
        self.bindings.get(name).is_some_and(Binding::is_locked)
    }

    pub fn set_literal(&mut self, name: &str, value: f64) {
        self.bindings
            .insert(name.to_string(), Binding::Literal(value));
    }

    pub fn set_formula(&mut self, name: &str, expr: Arc<Expr>) {
        self.bindings
            .insert(name.to_string(), Binding::Formula(expr));
    }

    pub fn set_computed(&mut self, name: &str, value: f64) {
        self.bindings
            .insert(name.to_string(), Binding::Computed(value));
    }

    pub fn lock(&mut self, name: &str, value: f64) {
        self.bindings
            .insert(name.to_string(), Binding::Locked(value));
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Coerce literal field text to a number the way the input loader does:
/// anything that does not parse as a float reads as 0.
pub fn coerce_number(text: &str) -> f64 {
    text.trim().parse().unwrap_or(0.0)
}

/// A contained per-field evaluation failure. Surfaced to callers alongside
/// the projection result; never aborts a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub field: String,
    pub expression: String,
    pub message: String,
}

/// Every catalog field's resolved value at the end of one simulated year.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectionRow {
    pub year: u32,
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Projection {
    pub rows: Vec<ProjectionRow>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ProjectionError {
    #[error("projection horizon must be at least one year, got {0}")]
    InvalidHorizon(i64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::formula;

    #[test]
    fn missing_and_unresolved_fields_read_as_zero() {
        let mut ctx = Context::new();
        assert_eq!(ctx.number("absent"), 0.0);

        let expr = Arc::new(formula::parse("1+1").unwrap());
        ctx.set_formula("pending", expr);
        assert_eq!(ctx.number("pending"), 0.0);

        ctx.set_computed("pending", 2.0);
        assert_eq!(ctx.number("pending"), 2.0);
    }

    #[test]
    fn only_locked_bindings_report_locked() {
        let mut ctx = Context::new();
        ctx.set_literal("a", 1.0);
        ctx.set_computed("b", 2.0);
        ctx.lock("c", 3.0);
        assert!(!ctx.is_locked("a"));
        assert!(!ctx.is_locked("b"));
        assert!(ctx.is_locked("c"));
        assert!(!ctx.is_locked("missing"));
    }

    #[test]
    fn coercion_defaults_to_zero() {
        assert_eq!(coerce_number("42.5"), 42.5);
        assert_eq!(coerce_number(" 7 "), 7.0);
        assert_eq!(coerce_number("Male"), 0.0);
        assert_eq!(coerce_number(""), 0.0);
    }
}
