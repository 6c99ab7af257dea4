mod catalog;
mod engine;
mod formula;
mod resolver;
mod types;

pub use catalog::{Catalog, FieldDef, FieldKind, default_catalog, fields};
pub use engine::{SCHEME_MATURITY_YEARS, run_projection};
pub use formula::{CompiledFormula, Expr, FormulaError, normalize, parse};
pub use resolver::resolve;
pub use types::{
    Binding, Context, Diagnostic, Projection, ProjectionError, ProjectionRow, coerce_number,
};
