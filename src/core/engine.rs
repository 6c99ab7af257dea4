use std::collections::BTreeMap;

use tracing::{info, warn};

use super::catalog::{Catalog, fields};
use super::resolver::resolve;
use super::types::{Context, Diagnostic, Projection, ProjectionError, ProjectionRow};

/// Years during which the two maturity-limited schemes pay out at their own
/// rates. From the following year their principal is treated as reinvested
/// into the general fixed-income fund.
pub const SCHEME_MATURITY_YEARS: u32 = 5;

/// Base quantities read once from the primed context. Everything here is
/// fixed for the whole run; per-year values are derived from these plus the
/// year index, so no year depends on another except through the carried
/// corpus.
struct Assumptions {
    inflation: f64,
    base_monthly_rental: f64,
    rental_cap: f64,
    recurring_bases: Vec<(String, f64)>,
    fd_fund: f64,
    scheme_a_invested: f64,
    scheme_b_invested: f64,
    scheme_a_rate: f64,
    scheme_b_rate: f64,
    normal_fd_share: f64,
    senior_fd_share: f64,
    normal_fd_rate: f64,
    senior_fd_rate: f64,
    swp_monthly_rate: f64,
    swp_monthly_withdrawal: f64,
}

impl Assumptions {
    fn from_primed(ctx: &Context, catalog: &Catalog) -> Self {
        let normal_fd_share = ctx.number(fields::NORMAL_FD_SPLIT_PERCENT) / 100.0;
        Self {
            inflation: ctx.number(fields::INFLATION_RATE) / 100.0,
            base_monthly_rental: ctx.number(fields::CURRENT_MONTHLY_RENTAL),
            rental_cap: ctx.number(fields::MAX_MONTHLY_RENTAL),
            recurring_bases: catalog
                .recurring_expenses()
                .map(|f| (f.name.clone(), ctx.number(&f.name)))
                .collect(),
            fd_fund: ctx.number(fields::FD_FUND),
            scheme_a_invested: ctx.number(fields::SCHEME_A_INVESTED),
            scheme_b_invested: ctx.number(fields::SCHEME_B_INVESTED),
            scheme_a_rate: ctx.number(fields::SCHEME_A_RATE) / 100.0,
            scheme_b_rate: ctx.number(fields::SCHEME_B_RATE) / 100.0,
            normal_fd_share,
            // the senior share is whatever the normal share leaves over
            senior_fd_share: 1.0 - normal_fd_share,
            normal_fd_rate: ctx.number(fields::NORMAL_FD_RATE) / 100.0,
            senior_fd_rate: ctx.number(fields::SENIOR_FD_RATE) / 100.0,
            swp_monthly_rate: ctx.number(fields::SWP_MONTHLY_RATE),
            swp_monthly_withdrawal: ctx.number(fields::SWP_MONTHLY_WITHDRAWAL),
        }
    }

    fn inflation_factor(&self, year: u32) -> f64 {
        (1.0 + self.inflation).powi(year as i32 - 1)
    }
}

/// Run the N-year projection. The horizon is read from the base context's
/// `projection_years` field; a horizon below one year aborts before any
/// per-year work. The result carries exactly N rows plus every contained
/// field-level diagnostic from the run.
pub fn run_projection(catalog: &Catalog, base: &Context) -> Result<Projection, ProjectionError> {
    let horizon = base.number(fields::PROJECTION_YEARS).trunc() as i64;
    if horizon < 1 {
        return Err(ProjectionError::InvalidHorizon(horizon));
    }
    let horizon = horizon as u32;

    let mut diagnostics = Vec::new();
    let mut primed = base.clone();
    resolve(&mut primed, catalog, &mut diagnostics);

    info!(
        years = horizon,
        fields = catalog.fields().len(),
        "running projection"
    );

    let assumptions = Assumptions::from_primed(&primed, catalog);
    let mut corpus = primed.number(fields::SWP_INVESTED);
    let mut rows = Vec::with_capacity(horizon as usize);

    for year in 1..=horizon {
        let mut ctx = primed.clone();
        let ending = apply_year(&mut ctx, catalog, &assumptions, year, corpus, &mut diagnostics);
        resolve(&mut ctx, catalog, &mut diagnostics);
        rows.push(snapshot(catalog, &ctx, year));
        corpus = ending;
    }

    Ok(Projection { rows, diagnostics })
}

/// Lock every time-dependent field for one year and return the SWP ending
/// balance to carry into the next year.
fn apply_year(
    ctx: &mut Context,
    catalog: &Catalog,
    a: &Assumptions,
    year: u32,
    corpus: f64,
    diagnostics: &mut Vec<Diagnostic>,
) -> f64 {
    // SWP block: one year of monthly-compounded growth minus withdrawals
    let interest = corpus * ((1.0 + a.swp_monthly_rate).powi(12) - 1.0);
    let withdrawal = a.swp_monthly_withdrawal * 12.0;
    let ending = corpus + interest - withdrawal;
    ctx.lock(fields::SWP_INVESTED, corpus);
    ctx.lock(fields::SWP_YEARLY_INTEREST, interest);
    ctx.lock(fields::SWP_YEARLY_WITHDRAWAL, withdrawal);
    ctx.lock(fields::SWP_ENDING_BALANCE, ending);
    ctx.lock(fields::SWP_NET_CHANGE, ending - corpus);

    // recurring expenses inflate from their base-context values
    let factor = a.inflation_factor(year);
    for (name, base_value) in &a.recurring_bases {
        ctx.lock(name, base_value * factor);
    }

    // expense totals must reflect this year's inflated amounts before any
    // later aggregation reads them, so they are evaluated and locked here
    // rather than left to the closing resolver pass
    lock_total(ctx, catalog, fields::EXPENSES_MUST_TOTAL, diagnostics);
    lock_total(ctx, catalog, fields::EXPENSES_OPTIONAL_TOTAL, diagnostics);

    // rental inflates with the same factor but is capped at the market max
    let inflated_rental = a.base_monthly_rental * factor;
    ctx.lock(
        fields::RENTAL_INCOME,
        inflated_rental.min(a.rental_cap) * 12.0,
    );

    if year <= SCHEME_MATURITY_YEARS {
        let residual = a.fd_fund - a.scheme_a_invested - a.scheme_b_invested;
        ctx.lock(
            fields::NORMAL_FD_INCOME,
            residual * a.normal_fd_share * a.normal_fd_rate,
        );
        ctx.lock(
            fields::SENIOR_FD_INCOME_INITIAL,
            residual * a.senior_fd_share * a.senior_fd_rate,
        );
        ctx.lock(
            fields::SCHEME_A_INCOME,
            a.scheme_a_invested * a.scheme_a_rate,
        );
        ctx.lock(
            fields::SCHEME_B_INCOME,
            a.scheme_b_invested * a.scheme_b_rate,
        );
        ctx.lock(fields::SENIOR_FD_INCOME_REINVESTED, 0.0);
    } else {
        // schemes matured: their principal earns FD rates with the rest
        ctx.lock(
            fields::NORMAL_FD_INCOME,
            a.fd_fund * a.normal_fd_share * a.normal_fd_rate,
        );
        ctx.lock(
            fields::SENIOR_FD_INCOME_REINVESTED,
            a.fd_fund * a.senior_fd_share * a.senior_fd_rate,
        );
        ctx.lock(fields::SENIOR_FD_INCOME_INITIAL, 0.0);
        ctx.lock(fields::SCHEME_A_INCOME, 0.0);
        ctx.lock(fields::SCHEME_B_INCOME, 0.0);
    }

    ending
}

fn lock_total(
    ctx: &mut Context,
    catalog: &Catalog,
    name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Some(formula) = catalog.formula(name) else {
        return;
    };
    let value = match formula.evaluate(ctx) {
        Ok(v) => v,
        Err(err) => {
            warn!(field = %name, error = %err, "expense total failed, locked at 0");
            diagnostics.push(Diagnostic {
                field: name.to_string(),
                expression: formula.source().to_string(),
                message: err.to_string(),
            });
            0.0
        }
    };
    ctx.lock(name, value);
}

fn snapshot(catalog: &Catalog, ctx: &Context, year: u32) -> ProjectionRow {
    let mut values = BTreeMap::new();
    for field in catalog.fields() {
        values.insert(field.name.clone(), ctx.number(&field.name));
    }
    ProjectionRow { year, values }
}
