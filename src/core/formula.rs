//! Formula text handling: normalization, parsing, and evaluation.
//!
//! A formula is a `=`-prefixed arithmetic expression over `{field}`
//! references, e.g. `=(1 + {swp_growth_rate}/100) ** (1 / 12) - 1`. Formulas
//! are parsed once into an AST and re-evaluated against different contexts;
//! there is no name resolution beyond field lookups and the fixed function
//! table below.

use std::sync::Arc;

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use super::types::Context;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FormulaError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("evaluation error: {0}")]
    Eval(String),
}

pub type FormulaResult<T> = Result<T, FormulaError>;

/// Canonicalize raw field text. Text without the `=` marker is a literal and
/// comes back unchanged. Formula text is stripped of the marker, NFKC-folded,
/// and visually-similar minus and quote code points are rewritten to ASCII.
pub fn normalize(raw: &str) -> String {
    let Some(body) = raw.strip_prefix('=') else {
        return raw.to_string();
    };

    let folded: String = body.trim().nfkc().collect();
    folded
        .chars()
        .map(|c| match c {
            '\u{2212}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}' => '-',
            '\u{201c}' | '\u{201d}' | '\u{201e}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Field(String),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: Func,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Min,
    Max,
    Abs,
    Sqrt,
    Floor,
    Ceil,
    Exp,
    Log,
    Log10,
}

impl Func {
    fn from_name(name: &str) -> Option<Func> {
        match name {
            "min" => Some(Func::Min),
            "max" => Some(Func::Max),
            "abs" => Some(Func::Abs),
            "sqrt" => Some(Func::Sqrt),
            "floor" => Some(Func::Floor),
            "ceil" => Some(Func::Ceil),
            "exp" => Some(Func::Exp),
            "log" => Some(Func::Log),
            "log10" => Some(Func::Log10),
            _ => None,
        }
    }

    fn check_arity(self, name: &str, count: usize) -> FormulaResult<()> {
        let ok = match self {
            Func::Min | Func::Max => count >= 2,
            _ => count == 1,
        };
        if ok {
            Ok(())
        } else {
            Err(FormulaError::Parse(format!(
                "wrong number of arguments for {name}: got {count}"
            )))
        }
    }
}

impl Expr {
    /// Evaluate against a context. Field references read the context's
    /// current numeric view (missing or unresolved fields read as 0).
    pub fn evaluate(&self, ctx: &Context) -> FormulaResult<f64> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Field(name) => Ok(ctx.number(name)),
            Expr::Negate(operand) => Ok(-operand.evaluate(ctx)?),
            Expr::Binary { op, left, right } => {
                let l = left.evaluate(ctx)?;
                let r = right.evaluate(ctx)?;
                match op {
                    BinaryOp::Add => Ok(l + r),
                    BinaryOp::Sub => Ok(l - r),
                    BinaryOp::Mul => Ok(l * r),
                    BinaryOp::Div => {
                        if r == 0.0 {
                            Err(FormulaError::Eval("division by zero".to_string()))
                        } else {
                            Ok(l / r)
                        }
                    }
                    BinaryOp::Pow => Ok(l.powf(r)),
                }
            }
            Expr::Call { func, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.evaluate(ctx)?);
                }
                Ok(apply_func(*func, &values))
            }
        }
    }
}

fn apply_func(func: Func, values: &[f64]) -> f64 {
    match func {
        Func::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Func::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Func::Abs => values[0].abs(),
        Func::Sqrt => values[0].sqrt(),
        Func::Floor => values[0].floor(),
        Func::Ceil => values[0].ceil(),
        Func::Exp => values[0].exp(),
        Func::Log => values[0].ln(),
        Func::Log10 => values[0].log10(),
    }
}

/// A formula compiled once at catalog construction. Parse failures are kept
/// and resurface on every evaluation attempt so the caller can degrade the
/// field to 0 with a diagnostic.
#[derive(Debug, Clone)]
pub struct CompiledFormula {
    source: String,
    compiled: Result<Arc<Expr>, FormulaError>,
}

impl CompiledFormula {
    pub fn compile(raw: &str) -> Self {
        let compiled = parse(&normalize(raw)).map(Arc::new);
        Self {
            source: raw.to_string(),
            compiled,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> Option<&Arc<Expr>> {
        self.compiled.as_ref().ok()
    }

    pub fn evaluate(&self, ctx: &Context) -> FormulaResult<f64> {
        match &self.compiled {
            Ok(expr) => expr.evaluate(ctx),
            Err(e) => Err(e.clone()),
        }
    }
}

/// Parse normalized arithmetic text (marker already stripped) into an AST.
pub fn parse(expression: &str) -> FormulaResult<Expr> {
    let mut parser = Parser::new(expression)?;
    let expr = parser.parse_additive()?;
    if parser.current != Token::Eof {
        return Err(FormulaError::Parse(format!(
            "unexpected input after expression: {}",
            parser.current.describe()
        )));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    FieldRef(String),
    Plus,
    Minus,
    Star,
    Slash,
    StarStar,
    LeftParen,
    RightParen,
    Comma,
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {n}"),
            Token::Ident(name) => format!("identifier '{name}'"),
            Token::FieldRef(name) => format!("field reference '{{{name}}}'"),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::StarStar => "'**'".to_string(),
            Token::LeftParen => "'('".to_string(),
            Token::RightParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Eof => "end of expression".to_string(),
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    current: Token,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> FormulaResult<Self> {
        let mut parser = Self {
            input,
            pos: 0,
            current: Token::Eof,
        };
        parser.advance()?;
        Ok(parser)
    }

    // === Scanning ===

    fn advance(&mut self) -> FormulaResult<()> {
        self.skip_whitespace();
        self.current = self.scan_token()?;
        Ok(())
    }

    fn scan_token(&mut self) -> FormulaResult<Token> {
        if self.is_at_end() {
            return Ok(Token::Eof);
        }

        let c = self.peek_char().unwrap();
        match c {
            '+' => {
                self.bump_char();
                Ok(Token::Plus)
            }
            '-' => {
                self.bump_char();
                Ok(Token::Minus)
            }
            '*' => {
                self.bump_char();
                if self.peek_char() == Some('*') {
                    self.bump_char();
                    Ok(Token::StarStar)
                } else {
                    Ok(Token::Star)
                }
            }
            '/' => {
                self.bump_char();
                Ok(Token::Slash)
            }
            '(' => {
                self.bump_char();
                Ok(Token::LeftParen)
            }
            ')' => {
                self.bump_char();
                Ok(Token::RightParen)
            }
            ',' => {
                self.bump_char();
                Ok(Token::Comma)
            }
            '{' => self.scan_field_ref(),
            _ if c.is_ascii_digit() || c == '.' => Ok(self.scan_number()),
            _ if c.is_ascii_alphabetic() || c == '_' => Ok(self.scan_identifier()),
            _ => Err(FormulaError::Parse(format!("unexpected character '{c}'"))),
        }
    }

    fn scan_field_ref(&mut self) -> FormulaResult<Token> {
        self.bump_char();
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c == '}' {
                let name = &self.input[start..self.pos];
                self.bump_char();
                if name.is_empty() {
                    return Err(FormulaError::Parse("empty field reference".to_string()));
                }
                return Ok(Token::FieldRef(name.to_string()));
            }
            self.bump_char();
        }
        Err(FormulaError::Parse(
            "unterminated field reference".to_string(),
        ))
    }

    fn scan_number(&mut self) -> Token {
        let start = self.pos;
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.bump_char();
        }
        if self.peek_char() == Some('.') {
            self.bump_char();
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.bump_char();
            }
        }
        if self.peek_char().is_some_and(|c| c == 'e' || c == 'E') {
            self.bump_char();
            if self.peek_char().is_some_and(|c| c == '+' || c == '-') {
                self.bump_char();
            }
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.bump_char();
            }
        }
        let text = &self.input[start..self.pos];
        Token::Number(text.parse().unwrap_or(0.0))
    }

    fn scan_identifier(&mut self) -> Token {
        let start = self.pos;
        while self
            .peek_char()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump_char();
        }
        Token::Ident(self.input[start..self.pos].to_string())
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump_char(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_whitespace()) {
            self.bump_char();
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn expect(&mut self, expected: &Token) -> FormulaResult<()> {
        if &self.current == expected {
            self.advance()
        } else {
            Err(FormulaError::Parse(format!(
                "expected {}, got {}",
                expected.describe(),
                self.current.describe()
            )))
        }
    }

    // === Grammar ===
    //
    // additive       := multiplicative (('+' | '-') multiplicative)*
    // multiplicative := unary (('*' | '/') unary)*
    // unary          := ('-' | '+') unary | power
    // power          := primary ('**' unary)?
    // primary        := number | '{' field '}' | func '(' args ')' | '(' additive ')'
    //
    // '**' is right-associative and binds tighter than unary minus on its
    // left but looser on its right: -2**2 is -(2**2), 2**-1 is 2**(-1).

    fn parse_additive(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> FormulaResult<Expr> {
        if self.current == Token::Minus {
            self.advance()?;
            let operand = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(operand)));
        }
        if self.current == Token::Plus {
            self.advance()?;
            return self.parse_unary();
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> FormulaResult<Expr> {
        let base = self.parse_primary()?;
        if self.current == Token::StarStar {
            self.advance()?;
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> FormulaResult<Expr> {
        match self.current.clone() {
            Token::Number(n) => {
                self.advance()?;
                Ok(Expr::Number(n))
            }
            Token::FieldRef(name) => {
                self.advance()?;
                Ok(Expr::Field(name))
            }
            Token::Ident(name) => {
                self.advance()?;
                if self.current != Token::LeftParen {
                    return Err(FormulaError::Parse(format!("unknown identifier '{name}'")));
                }
                let func = Func::from_name(&name)
                    .ok_or_else(|| FormulaError::Parse(format!("unknown function '{name}'")))?;
                self.advance()?;
                let args = self.parse_args()?;
                func.check_arity(&name, args.len())?;
                Ok(Expr::Call { func, args })
            }
            Token::LeftParen => {
                self.advance()?;
                let expr = self.parse_additive()?;
                self.expect(&Token::RightParen)?;
                Ok(expr)
            }
            other => Err(FormulaError::Parse(format!(
                "unexpected {}",
                other.describe()
            ))),
        }
    }

    fn parse_args(&mut self) -> FormulaResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.current == Token::RightParen {
            self.advance()?;
            return Ok(args);
        }
        loop {
            args.push(self.parse_additive()?);
            match self.current {
                Token::Comma => self.advance()?,
                Token::RightParen => {
                    self.advance()?;
                    return Ok(args);
                }
                _ => {
                    return Err(FormulaError::Parse(format!(
                        "expected ',' or ')', got {}",
                        self.current.describe()
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    fn eval(expression: &str, ctx: &Context) -> FormulaResult<f64> {
        parse(&normalize(expression))?.evaluate(ctx)
    }

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn literal_text_passes_through_unchanged() {
        assert_eq!(normalize("15000"), "15000");
        assert_eq!(normalize("Male"), "Male");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn normalize_strips_marker_and_trims() {
        assert_eq!(normalize("= {a} + {b} "), "{a} + {b}");
    }

    #[test]
    fn normalize_folds_unicode_minus_and_quotes() {
        assert_eq!(normalize("={a} \u{2212} 1"), "{a} - 1");
        assert_eq!(normalize("={a} \u{2013} 1"), "{a} - 1");
        assert_eq!(normalize("=\u{201c}2\u{201d} + 1"), "\"2\" + 1");
    }

    #[test]
    fn normalize_applies_nfkc() {
        // fullwidth digits and operators fold to ASCII
        assert_eq!(normalize("=\u{ff11}\u{ff0b}\u{ff12}"), "1+2");
    }

    #[test]
    fn arithmetic_precedence() {
        let ctx = Context::new();
        assert_approx(eval("=2+3*4", &ctx).unwrap(), 14.0);
        assert_approx(eval("=(2+3)*4", &ctx).unwrap(), 20.0);
        assert_approx(eval("=7/2", &ctx).unwrap(), 3.5);
        assert_approx(eval("=10-4-3", &ctx).unwrap(), 3.0);
    }

    #[test]
    fn exponent_matches_legacy_semantics() {
        let ctx = Context::new();
        assert_approx(eval("=-2**2", &ctx).unwrap(), -4.0);
        assert_approx(eval("=2**-1", &ctx).unwrap(), 0.5);
        assert_approx(eval("=2**3**2", &ctx).unwrap(), 512.0);
        assert_approx(eval("=(-2)**2", &ctx).unwrap(), 4.0);
    }

    #[test]
    fn field_references_resolve_from_context() {
        let mut ctx = Context::new();
        ctx.set_literal("a", 2.5);
        ctx.set_literal("b", 4.0);
        assert_approx(eval("={a}+{b}", &ctx).unwrap(), 6.5);
        assert_approx(eval("={a}*{b}", &ctx).unwrap(), 10.0);
    }

    #[test]
    fn missing_reference_reads_as_zero() {
        let ctx = Context::new();
        assert_approx(eval("={nowhere}+3", &ctx).unwrap(), 3.0);
    }

    #[test]
    fn min_and_max_are_variadic() {
        let ctx = Context::new();
        assert_approx(eval("=min(3, 1, 2)", &ctx).unwrap(), 1.0);
        assert_approx(eval("=max(3, 1, 2)", &ctx).unwrap(), 3.0);
        assert_approx(eval("=min(5, max(1, 2))", &ctx).unwrap(), 2.0);
    }

    #[test]
    fn min_requires_two_arguments() {
        assert!(parse("min(3)").is_err());
    }

    #[test]
    fn dangling_operator_is_a_parse_error() {
        assert!(parse(&normalize("={x}+")).is_err());
    }

    #[test]
    fn division_by_zero_is_an_eval_error() {
        let ctx = Context::new();
        assert!(matches!(
            eval("=1/0", &ctx),
            Err(FormulaError::Eval(_))
        ));
        // {missing} reads as 0, so this divides by zero too
        assert!(eval("=1/{missing}", &ctx).is_err());
    }

    #[test]
    fn unknown_names_are_errors() {
        assert!(parse("banana").is_err());
        assert!(parse("banana(1)").is_err());
    }

    #[test]
    fn unterminated_field_reference_is_a_parse_error() {
        assert!(parse("{a + 1").is_err());
        assert!(parse("{}").is_err());
    }

    #[test]
    fn compiled_formula_keeps_parse_failures() {
        let ctx = Context::new();
        let bad = CompiledFormula::compile("={x}+");
        assert!(bad.evaluate(&ctx).is_err());
        assert!(bad.evaluate(&ctx).is_err());
        assert_eq!(bad.source(), "={x}+");
    }

    #[test]
    fn monthly_rate_formula_evaluates() {
        let mut ctx = Context::new();
        ctx.set_literal("swp_growth_rate", 10.0);
        let rate = eval("=(1 + {swp_growth_rate}/100) ** (1 / 12) - 1", &ctx).unwrap();
        assert_approx(rate, 1.1f64.powf(1.0 / 12.0) - 1.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]
        #[test]
        fn binary_operators_round_trip(a in -1e9f64..1e9, b in -1e9f64..1e9) {
            let mut ctx = Context::new();
            ctx.set_literal("a", a);
            ctx.set_literal("b", b);
            prop_assert!((eval("={a}+{b}", &ctx).unwrap() - (a + b)).abs() <= 1e-6, "add round-trip failed");
            prop_assert!((eval("={a}-{b}", &ctx).unwrap() - (a - b)).abs() <= 1e-6, "sub round-trip failed");
            prop_assert!((eval("={a}*{b}", &ctx).unwrap() - (a * b)).abs() <= 1.0, "mul round-trip failed");
            prop_assert!(eval("=min({a},{b})", &ctx).unwrap() == a.min(b), "min round-trip failed");
            prop_assert!(eval("=max({a},{b})", &ctx).unwrap() == a.max(b), "max round-trip failed");
        }

        #[test]
        fn division_round_trips(a in -1e9f64..1e9, b in 1e-3f64..1e9) {
            let mut ctx = Context::new();
            ctx.set_literal("a", a);
            ctx.set_literal("b", b);
            prop_assert!((eval("={a}/{b}", &ctx).unwrap() - (a / b)).abs() <= 1e-6, "div round-trip failed");
        }

        #[test]
        fn exponent_round_trips(a in 1e-3f64..1e3, b in -4.0f64..4.0) {
            let mut ctx = Context::new();
            ctx.set_literal("a", a);
            ctx.set_literal("b", b);
            let expected = a.powf(b);
            let actual = eval("={a}**{b}", &ctx).unwrap();
            prop_assert!((actual - expected).abs() <= expected.abs() * 1e-12 + 1e-12);
        }
    }
}
