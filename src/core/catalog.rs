//! The field catalog: ordered field definitions with literal defaults or
//! compiled formulas. Catalog order is evaluation order.

use super::formula::CompiledFormula;
use super::types::{Context, coerce_number};

/// Names of the fields the projection engine reads and locks directly.
/// Custom catalogs that want the full simulation must carry these.
pub mod fields {
    pub const PROJECTION_YEARS: &str = "projection_years";
    pub const INFLATION_RATE: &str = "inflation_rate";

    pub const SWP_MONTHLY_RATE: &str = "swp_monthly_rate";
    pub const SWP_MONTHLY_WITHDRAWAL: &str = "swp_monthly_withdrawal";
    pub const SWP_INVESTED: &str = "swp_invested";
    pub const SWP_YEARLY_INTEREST: &str = "swp_yearly_interest";
    pub const SWP_YEARLY_WITHDRAWAL: &str = "swp_yearly_withdrawal";
    pub const SWP_ENDING_BALANCE: &str = "swp_ending_balance";
    pub const SWP_NET_CHANGE: &str = "swp_net_change";

    pub const CURRENT_MONTHLY_RENTAL: &str = "current_monthly_rental";
    pub const MAX_MONTHLY_RENTAL: &str = "max_monthly_rental";
    pub const RENTAL_INCOME: &str = "rental_income";

    pub const FD_FUND: &str = "fd_fund";
    pub const NORMAL_FD_RATE: &str = "normal_fd_rate";
    pub const SENIOR_FD_RATE: &str = "senior_fd_rate";
    pub const NORMAL_FD_SPLIT_PERCENT: &str = "normal_fd_split_percent";
    pub const SENIOR_FD_SPLIT_PERCENT: &str = "senior_fd_split_percent";
    pub const NORMAL_FD_INCOME: &str = "normal_fd_income";
    pub const SENIOR_FD_INCOME_INITIAL: &str = "senior_fd_income_initial";
    pub const SENIOR_FD_INCOME_REINVESTED: &str = "senior_fd_income_reinvested";

    pub const SCHEME_A_INVESTED: &str = "scheme_a_invested";
    pub const SCHEME_B_INVESTED: &str = "scheme_b_invested";
    pub const SCHEME_A_RATE: &str = "scheme_a_rate";
    pub const SCHEME_B_RATE: &str = "scheme_b_rate";
    pub const SCHEME_A_INCOME: &str = "scheme_a_income";
    pub const SCHEME_B_INCOME: &str = "scheme_b_income";

    pub const EXPENSES_MUST_TOTAL: &str = "expenses_must_total";
    pub const EXPENSES_OPTIONAL_TOTAL: &str = "expenses_optional_total";
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Numeric literal input.
    Input(f64),
    /// Text input; coerces to 0 in numeric contexts unless it parses.
    Text(String),
    /// `=`-prefixed formula, compiled at catalog construction.
    Formula(CompiledFormula),
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub recurring_expense: bool,
}

impl FieldDef {
    pub fn input(name: &str, label: &str, default: f64) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Input(default),
            recurring_expense: false,
        }
    }

    pub fn text(name: &str, label: &str, default: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Text(default.to_string()),
            recurring_expense: false,
        }
    }

    pub fn formula(name: &str, label: &str, source: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Formula(CompiledFormula::compile(source)),
            recurring_expense: false,
        }
    }

    fn recurring(mut self) -> Self {
        self.recurring_expense = true;
        self
    }

    pub fn is_formula(&self) -> bool {
        matches!(self.kind, FieldKind::Formula(_))
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    fields: Vec<FieldDef>,
}

impl Catalog {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn formula(&self, name: &str) -> Option<&CompiledFormula> {
        match self.get(name) {
            Some(FieldDef {
                kind: FieldKind::Formula(f),
                ..
            }) => Some(f),
            _ => None,
        }
    }

    pub fn recurring_expenses(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.recurring_expense)
    }

    /// Seed a base context from the catalog defaults: literals become
    /// `Literal` bindings (text coerced numerically), formulas become
    /// unresolved `Formula` bindings that read as 0 until a resolver pass.
    pub fn seed_context(&self) -> Context {
        let mut ctx = Context::new();
        for field in &self.fields {
            match &field.kind {
                FieldKind::Input(v) => ctx.set_literal(&field.name, *v),
                FieldKind::Text(s) => ctx.set_literal(&field.name, coerce_number(s)),
                FieldKind::Formula(f) => {
                    if let Some(expr) = f.expr() {
                        ctx.set_formula(&field.name, expr.clone());
                    }
                }
            }
        }
        ctx
    }
}

/// The production catalog: base assumptions, one-time and recurring
/// expenses, and the investment plan. Declaration order matters; every
/// formula references only fields declared earlier or base inputs.
pub fn default_catalog() -> Catalog {
    use fields::*;

    // TODO: add joint-account scheme limits once the planner grows a
    // household mode; single-account amounts only for now.
    Catalog::new(vec![
        // --- Base data ---
        FieldDef::input("age", "Age", 58.0),
        FieldDef::text("gender", "Gender", "Male"),
        FieldDef::input(PROJECTION_YEARS, "Projection years", 1.0),
        FieldDef::input(INFLATION_RATE, "Inflation rate (%)", 10.0),
        FieldDef::input(SENIOR_FD_RATE, "Senior-citizen FD rate (%)", 7.4),
        FieldDef::input(NORMAL_FD_RATE, "Normal FD rate (%)", 6.5),
        FieldDef::input("swp_growth_rate", "SWP annual growth rate (%)", 10.0),
        FieldDef::formula(
            SWP_MONTHLY_RATE,
            "SWP monthly growth rate",
            "=(1 + {swp_growth_rate}/100) ** (1 / 12) - 1",
        ),
        FieldDef::input(SWP_MONTHLY_WITHDRAWAL, "SWP monthly withdrawal", 15_000.0),
        FieldDef::input(SCHEME_A_RATE, "Scheme A interest rate (%)", 8.2),
        FieldDef::input(SCHEME_B_RATE, "Scheme B interest rate (%)", 7.5),
        FieldDef::input(SCHEME_A_INVESTED, "Scheme A committed amount", 3_000_000.0),
        FieldDef::input(SCHEME_B_INVESTED, "Scheme B committed amount", 900_000.0),
        FieldDef::input(CURRENT_MONTHLY_RENTAL, "Current monthly rental", 20_000.0),
        FieldDef::input(MAX_MONTHLY_RENTAL, "Maximum monthly rental", 30_000.0),
        FieldDef::input(
            "existing_annuity_monthly",
            "Existing annuity (monthly)",
            1_500.0,
        ),
        FieldDef::input("new_annuity_monthly", "New annuity (monthly)", 0.0),
        FieldDef::input("pension_monthly", "Pension (monthly)", 2_000.0),
        FieldDef::input("dividend_income", "Dividend income (yearly)", 200_000.0),
        FieldDef::input("pf_accumulation", "Provident fund accumulation", 7_500_000.0),
        FieldDef::input("ppf_accumulation", "Public provident fund accumulation", 0.0),
        FieldDef::input("superannuation", "Superannuation corpus", 0.0),
        FieldDef::input("agriculture_income", "Agriculture income (yearly)", 0.0),
        FieldDef::input("trading_income", "Share trading income (yearly)", 0.0),
        FieldDef::input("property_income", "Property buy/sell income (yearly)", 0.0),
        FieldDef::input("consulting_income_monthly", "Consulting income (monthly)", 0.0),
        FieldDef::input("swp_allocation_percent", "SWP share of corpus (%)", 30.0),
        FieldDef::input("fd_allocation_percent", "FD share of corpus (%)", 70.0),
        FieldDef::input(
            NORMAL_FD_SPLIT_PERCENT,
            "Normal FD share of residual fund (%)",
            10.0,
        ),
        FieldDef::input(
            SENIOR_FD_SPLIT_PERCENT,
            "Senior FD share of residual fund (%)",
            90.0,
        ),
        // --- One-time expenses ---
        FieldDef::input("kids_education", "Children's education", 700_000.0),
        FieldDef::input("house_renovation", "House renovation", 1_500_000.0),
        FieldDef::input("vehicle_replacement", "Vehicle replacement", 700_000.0),
        FieldDef::input("jewellery", "Jewellery and ornaments", 100_000.0),
        FieldDef::input("foreign_travel_onetime", "Foreign travel (one-time)", 1_500_000.0),
        FieldDef::input("other_onetime", "Other one-time expenses", 0.0),
        FieldDef::formula(
            "onetime_must_total",
            "Total one-time expenses (must)",
            "={kids_education}+{house_renovation}+{vehicle_replacement}+{jewellery}+{foreign_travel_onetime}+{other_onetime}",
        ),
        FieldDef::input("marriages", "Children's marriages", 5_000_000.0),
        FieldDef::input("property_purchase", "Property purchases", 3_000_000.0),
        FieldDef::formula(
            "onetime_deferred_total",
            "Total one-time expenses (deferred)",
            "={marriages}+{property_purchase}",
        ),
        FieldDef::formula(
            "onetime_grand_total",
            "Total one-time expenses",
            "={onetime_must_total}+{onetime_deferred_total}",
        ),
        // --- Recurring expenses (monthly amounts) ---
        FieldDef::input("grocery", "Grocery and vegetables", 35_000.0).recurring(),
        FieldDef::input("utilities", "Water and electricity", 3_000.0).recurring(),
        FieldDef::input("vehicle_insurance", "Vehicle insurance", 2_000.0).recurring(),
        FieldDef::input("property_tax", "Property tax", 1_000.0).recurring(),
        FieldDef::input("medical_insurance", "Medical insurance", 4_500.0).recurring(),
        FieldDef::input("fuel", "Transport fuel", 10_000.0).recurring(),
        FieldDef::input("vehicle_maintenance", "Vehicle maintenance", 1_000.0).recurring(),
        FieldDef::input("house_repairs", "House repairs", 1_250.0).recurring(),
        FieldDef::input("domestic_help", "Domestic help", 5_000.0).recurring(),
        FieldDef::input("entertainment", "Entertainment and eating out", 10_000.0).recurring(),
        FieldDef::input("telecom", "Internet and mobile", 2_000.0).recurring(),
        FieldDef::input("streaming_cable", "TV, OTT and cable", 1_250.0).recurring(),
        FieldDef::input("domestic_travel", "Travel and leisure (inland)", 15_000.0).recurring(),
        FieldDef::input("swp_tax_provision", "SWP capital-gains tax provision", 1_335.0).recurring(),
        FieldDef::input("functions_gifts", "Functions and gifts", 1_000.0).recurring(),
        FieldDef::formula(
            EXPENSES_MUST_TOTAL,
            "Total monthly expenses (must)",
            "={grocery} + {utilities} + {vehicle_insurance} + {property_tax} + {medical_insurance} + {fuel} + {vehicle_maintenance} + {house_repairs} + {domestic_help} + {entertainment} + {telecom} + {streaming_cable} + {domestic_travel} + {swp_tax_provision} + {functions_gifts}",
        ),
        FieldDef::input("foreign_travel", "Travel and leisure (foreign)", 0.0).recurring(),
        FieldDef::input("other_optional", "Other optional expenses", 0.0).recurring(),
        FieldDef::formula(
            EXPENSES_OPTIONAL_TOTAL,
            "Total monthly expenses (optional)",
            "={foreign_travel} + {other_optional}",
        ),
        // --- Investment plan ---
        FieldDef::formula(
            "starting_corpus",
            "Total investable corpus",
            "={pf_accumulation}+{ppf_accumulation}+{superannuation}",
        ),
        FieldDef::formula(
            SWP_INVESTED,
            "Corpus allocated to SWP",
            "={starting_corpus}*({swp_allocation_percent}/100)",
        ),
        FieldDef::formula(
            FD_FUND,
            "Corpus allocated to fixed-income fund",
            "={starting_corpus}*({fd_allocation_percent}/100)",
        ),
        FieldDef::formula(
            SWP_YEARLY_WITHDRAWAL,
            "SWP yearly withdrawal",
            "={swp_monthly_withdrawal} * 12",
        ),
        FieldDef::formula(
            SWP_YEARLY_INTEREST,
            "SWP yearly interest",
            "={swp_invested}*(1+{swp_monthly_rate})**12-{swp_invested}",
        ),
        FieldDef::formula(
            SWP_ENDING_BALANCE,
            "SWP balance after withdrawals",
            "={swp_invested}+{swp_yearly_interest}-{swp_yearly_withdrawal}",
        ),
        FieldDef::formula(
            SWP_NET_CHANGE,
            "SWP corpus net change",
            "={swp_ending_balance}-{swp_invested}",
        ),
        FieldDef::formula(
            NORMAL_FD_INCOME,
            "Income from normal-rate FDs",
            "=(({fd_fund}-{scheme_a_invested}-{scheme_b_invested})*({normal_fd_split_percent}/100))*({normal_fd_rate}/100)",
        ),
        FieldDef::formula(
            SENIOR_FD_INCOME_INITIAL,
            "Income from senior-rate FDs (scheme years)",
            "=(({fd_fund}-{scheme_a_invested}-{scheme_b_invested})*({senior_fd_split_percent}/100))*({senior_fd_rate}/100)",
        ),
        FieldDef::formula(
            SCHEME_A_INCOME,
            "Income from scheme A",
            "={scheme_a_invested} * ({scheme_a_rate}/100)",
        ),
        FieldDef::formula(
            SCHEME_B_INCOME,
            "Income from scheme B",
            "={scheme_b_invested} * ({scheme_b_rate}/100)",
        ),
        FieldDef::input(
            SENIOR_FD_INCOME_REINVESTED,
            "Income from senior-rate FDs (post maturity)",
            0.0,
        ),
        FieldDef::formula(
            RENTAL_INCOME,
            "Yearly rental income",
            "={current_monthly_rental}*12",
        ),
        FieldDef::formula(
            "existing_annuity_income",
            "Yearly income from existing annuities",
            "={existing_annuity_monthly}*12",
        ),
        FieldDef::formula(
            "new_annuity_income",
            "Yearly income from new annuities",
            "={new_annuity_monthly}*12",
        ),
        FieldDef::formula("pension_income", "Yearly pension income", "={pension_monthly}*12"),
        FieldDef::formula(
            "consulting_income",
            "Yearly consulting income",
            "={consulting_income_monthly}*12",
        ),
        FieldDef::formula(
            "total_income",
            "Total yearly income from all sources",
            "={normal_fd_income}+{senior_fd_income_initial}+{senior_fd_income_reinvested}+{scheme_a_income}+{scheme_b_income}+{rental_income}+{dividend_income}+{agriculture_income}+{existing_annuity_income}+{new_annuity_income}+{pension_income}+{trading_income}+{property_income}+{consulting_income}+{swp_yearly_withdrawal}+{swp_net_change}",
        ),
    ])
}
