use tracing::warn;

use super::catalog::{Catalog, FieldKind};
use super::types::{Context, Diagnostic};

/// One resolution pass over the catalog, in declaration order.
///
/// Locked bindings are skipped unconditionally; that is policy, not a
/// consistency check. Everything else that carries a formula is evaluated
/// against the context as it stands, so later fields observe earlier fields
/// resolved in the same pass. Failures degrade the field to 0 with a
/// diagnostic. The pass is idempotent and never promotes a value to locked.
pub fn resolve(ctx: &mut Context, catalog: &Catalog, diagnostics: &mut Vec<Diagnostic>) {
    for field in catalog.fields() {
        let FieldKind::Formula(formula) = &field.kind else {
            continue;
        };
        if ctx.is_locked(&field.name) {
            continue;
        }
        match formula.evaluate(ctx) {
            Ok(value) => ctx.set_computed(&field.name, value),
            Err(err) => {
                warn!(
                    field = %field.name,
                    expression = %formula.source(),
                    error = %err,
                    "formula evaluation failed, field degraded to 0"
                );
                diagnostics.push(Diagnostic {
                    field: field.name.clone(),
                    expression: formula.source().to_string(),
                    message: err.to_string(),
                });
                ctx.set_computed(&field.name, 0.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::FieldDef;

    fn chain_catalog() -> Catalog {
        Catalog::new(vec![
            FieldDef::input("base", "Base", 100.0),
            FieldDef::formula("double", "Double", "={base}*2"),
            FieldDef::formula("quadruple", "Quadruple", "={double}*2"),
        ])
    }

    #[test]
    fn later_fields_see_earlier_results() {
        let catalog = chain_catalog();
        let mut ctx = catalog.seed_context();
        let mut diags = Vec::new();
        resolve(&mut ctx, &catalog, &mut diags);
        assert_eq!(ctx.number("double"), 200.0);
        assert_eq!(ctx.number("quadruple"), 400.0);
        assert!(diags.is_empty());
    }

    #[test]
    fn forward_reference_reads_stale_zero() {
        let catalog = Catalog::new(vec![
            FieldDef::formula("eager", "Eager", "={late}+1"),
            FieldDef::formula("late", "Late", "=41+1"),
        ]);
        let mut ctx = catalog.seed_context();
        let mut diags = Vec::new();
        resolve(&mut ctx, &catalog, &mut diags);
        // "eager" ran before "late" was resolved and saw 0
        assert_eq!(ctx.number("eager"), 1.0);
        assert_eq!(ctx.number("late"), 42.0);
        assert!(diags.is_empty());
    }

    #[test]
    fn locked_fields_are_never_overwritten() {
        let catalog = chain_catalog();
        let mut ctx = catalog.seed_context();
        ctx.lock("double", 999.0);
        let mut diags = Vec::new();
        resolve(&mut ctx, &catalog, &mut diags);
        assert_eq!(ctx.number("double"), 999.0);
        assert!(ctx.is_locked("double"));
        // downstream formulas observe the locked value
        assert_eq!(ctx.number("quadruple"), 1998.0);
    }

    #[test]
    fn resolution_is_idempotent() {
        let catalog = chain_catalog();
        let mut ctx = catalog.seed_context();
        let mut diags = Vec::new();
        resolve(&mut ctx, &catalog, &mut diags);
        let first: Vec<f64> = ["base", "double", "quadruple"]
            .iter()
            .map(|n| ctx.number(n))
            .collect();
        resolve(&mut ctx, &catalog, &mut diags);
        let second: Vec<f64> = ["base", "double", "quadruple"]
            .iter()
            .map(|n| ctx.number(n))
            .collect();
        assert_eq!(first, second);
        assert!(diags.is_empty());
    }

    #[test]
    fn resolution_never_promotes_to_locked() {
        let catalog = chain_catalog();
        let mut ctx = catalog.seed_context();
        let mut diags = Vec::new();
        resolve(&mut ctx, &catalog, &mut diags);
        assert!(!ctx.is_locked("double"));
        assert!(!ctx.is_locked("quadruple"));
    }

    #[test]
    fn failures_degrade_to_zero_without_stopping_the_pass() {
        let catalog = Catalog::new(vec![
            FieldDef::input("ok_in", "Input", 5.0),
            FieldDef::formula("broken", "Broken", "={ok_in}+"),
            FieldDef::formula("divzero", "Div by zero", "=1/0"),
            FieldDef::formula("fine", "Fine", "={ok_in}*2"),
        ]);
        let mut ctx = catalog.seed_context();
        let mut diags = Vec::new();
        resolve(&mut ctx, &catalog, &mut diags);

        assert_eq!(ctx.number("broken"), 0.0);
        assert_eq!(ctx.number("divzero"), 0.0);
        assert_eq!(ctx.number("fine"), 10.0);
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].field, "broken");
        assert_eq!(diags[0].expression, "={ok_in}+");
        assert_eq!(diags[1].field, "divzero");
    }
}
