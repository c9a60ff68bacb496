//! Branch conditions: a small, side-effect free expression language.
//!
//! ```text
//! expr       := or
//! or         := and (("||" | "or") and)*
//! and        := not (("&&" | "and") not)*
//! not        := ("!" | "not") not | comparison
//! comparison := unary (("==" | "!=" | "<" | "<=" | ">" | ">=") unary)?
//! unary      := "-" unary | primary
//! primary    := literal | path | path "(" args ")" | "(" expr ")"
//! ```

use std::cmp::Ordering;
use std::fmt;

use crate::error::{SqlateError, SqlateResult};
use crate::interface::{Value, VariableLookup};

/// Deepest nesting of parentheses, `!` and `-` accepted in one expression.
pub const MAX_EXPRESSION_DEPTH: usize = 64;

/// Decides branch conditions.
///
/// Implementations must be pure reads of the lookup.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, lookup: &dyn VariableLookup) -> SqlateResult<Value>;

    /// Evaluates a branch condition of a built template. Evaluators with a
    /// syntax of their own only need [`ExpressionEvaluator::evaluate`].
    fn evaluate_condition(
        &self,
        condition: &Condition,
        lookup: &dyn VariableLookup,
    ) -> SqlateResult<Value> {
        self.evaluate(condition.as_str(), lookup)
    }

    /// Names of the parameters an expression reads, used for debug logging.
    fn identifiers(&self, _expression: &str) -> Vec<String> {
        Vec::new()
    }
}

/// A function callable from expressions, e.g. `SF.isNotEmpty(name)`.
pub type Function = fn(&[Value]) -> Result<Value, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Path(String),
    Call(String, Vec<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

/// A branch condition as written in the template, parsed once when the
/// template is built.
#[derive(Debug, Clone)]
pub struct Condition {
    source: String,
    /// `None` when the source is not valid default syntax; the error surfaces
    /// only if the branch is evaluated.
    parsed: Option<Expr>,
}

impl Condition {
    pub fn new<S: Into<String>>(source: S) -> Self {
        let source = source.into();
        let parsed = parse_expression(&source).ok();
        Self { source, parsed }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Condition {}

impl PartialEq<str> for Condition {
    fn eq(&self, other: &str) -> bool {
        self.source == other
    }
}

impl PartialEq<&str> for Condition {
    fn eq(&self, other: &&str) -> bool {
        self.source == *other
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

type ParseResult<T> = Result<T, String>;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser {
            input,
            pos: 0,
            depth: 0,
        }
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= MAX_EXPRESSION_DEPTH {
            return Err(format!(
                "expression nested deeper than {MAX_EXPRESSION_DEPTH} levels at position {}",
                self.pos
            ));
        }
        self.depth = self.depth.saturating_add(1);
        let result = parse(self);
        self.depth = self.depth.saturating_sub(1);
        result
    }

    fn rest(&self) -> &'a str {
        self.input.get(self.pos..).unwrap_or_default()
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn consume(&mut self, s: &str) -> bool {
        if self.peek(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    /// Consumes a word operator such as `and`, but not the prefix of `android`.
    fn consume_word(&mut self, word: &str) -> bool {
        let follows_ident = self
            .rest()
            .get(word.len()..)
            .and_then(|after| after.chars().next())
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        !follows_ident && self.consume(word)
    }

    fn consume_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn unexpected(&self, expected: &str) -> String {
        match self.rest().chars().next() {
            Some(c) => format!("expected {expected} at position {}, found '{c}'", self.pos),
            None => format!("expected {expected}, found end of expression"),
        }
    }

    fn parse(mut self) -> ParseResult<Expr> {
        let expr = self.parse_or()?;
        self.consume_whitespace();
        if self.eof() {
            Ok(expr)
        } else {
            Err(self.unexpected("end of expression"))
        }
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        loop {
            self.consume_whitespace();
            if self.consume("||") || self.consume_word("or") {
                let right = self.parse_and()?;
                left = Expr::Or(Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_not()?;
        loop {
            self.consume_whitespace();
            if self.consume("&&") || self.consume_word("and") {
                let right = self.parse_not()?;
                left = Expr::And(Box::new(left), Box::new(right));
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        self.consume_whitespace();
        if self.peek("!=") {
            return Err(self.unexpected("an operand"));
        }
        if self.consume("!") || self.consume_word("not") {
            Ok(Expr::Not(Box::new(self.nested(Self::parse_not)?)))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let left = self.parse_unary()?;
        self.consume_whitespace();
        let op = if self.consume("==") {
            CompareOp::Eq
        } else if self.consume("!=") {
            CompareOp::Ne
        } else if self.consume("<=") {
            CompareOp::Le
        } else if self.consume(">=") {
            CompareOp::Ge
        } else if self.consume("<") {
            CompareOp::Lt
        } else if self.consume(">") {
            CompareOp::Gt
        } else {
            return Ok(left);
        };
        let right = self.parse_unary()?;
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        self.consume_whitespace();
        if self.consume("-") {
            Ok(Expr::Neg(Box::new(self.nested(Self::parse_unary)?)))
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        self.consume_whitespace();
        let Some(c) = self.rest().chars().next() else {
            return Err(self.unexpected("an operand"));
        };

        if c == '(' {
            self.pos += 1;
            let expr = self.nested(Self::parse_or)?;
            self.consume_whitespace();
            if !self.consume(")") {
                return Err(self.unexpected("')'"));
            }
            return Ok(expr);
        }
        if c == '\'' || c == '"' {
            return self.parse_string(c);
        }
        if c.is_ascii_digit() {
            return self.parse_number();
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let path = self.consume_path();
            return match path {
                "null" => Ok(Expr::Literal(Value::Null)),
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                _ => {
                    self.consume_whitespace();
                    if self.consume("(") {
                        let args = self.nested(Self::parse_args)?;
                        Ok(Expr::Call(path.to_owned(), args))
                    } else {
                        Ok(Expr::Path(path.to_owned()))
                    }
                }
            };
        }

        Err(self.unexpected("an operand"))
    }

    fn parse_args(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        self.consume_whitespace();
        if self.consume(")") {
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            self.consume_whitespace();
            if self.consume(",") {
                continue;
            }
            if self.consume(")") {
                return Ok(args);
            }
            return Err(self.unexpected("',' or ')'"));
        }
    }

    fn consume_path(&mut self) -> &'a str {
        let start = self.pos;
        let len = self
            .rest()
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
            .unwrap_or(self.rest().len());
        self.pos += len;
        self.input.get(start..self.pos).unwrap_or_default()
    }

    fn parse_number(&mut self) -> ParseResult<Expr> {
        let start = self.pos;
        let digits = |s: &str| s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        self.pos += digits(self.rest());
        let is_float = self.peek(".")
            && self
                .rest()
                .chars()
                .nth(1)
                .is_some_and(|c| c.is_ascii_digit());
        if is_float {
            self.pos += 1;
            self.pos += digits(self.rest());
        }
        let text = self.input.get(start..self.pos).unwrap_or_default();
        if is_float {
            text.parse::<f64>()
                .map(|f| Expr::Literal(Value::Float(f)))
                .map_err(|e| format!("invalid number '{text}': {e}"))
        } else {
            text.parse::<i64>()
                .map(|i| Expr::Literal(Value::Int(i)))
                .map_err(|e| format!("invalid number '{text}': {e}"))
        }
    }

    fn parse_string(&mut self, quote: char) -> ParseResult<Expr> {
        self.pos += 1;
        let mut value = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            if c == quote {
                self.pos += i + 1;
                return Ok(Expr::Literal(Value::String(value)));
            }
            if c == '\\' {
                match chars.next() {
                    Some((_, escaped)) => value.push(escaped),
                    None => break,
                }
            } else {
                value.push(c);
            }
        }
        Err(format!("unterminated string literal (expected {quote})"))
    }
}

fn parse_expression(expression: &str) -> ParseResult<Expr> {
    Parser::new(expression).parse()
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, String> {
    match op {
        CompareOp::Eq => return Ok(values_equal(left, right)),
        CompareOp::Ne => return Ok(!values_equal(left, right)),
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {}
    }

    let ordering = match (left, right) {
        (Value::Null, _) | (_, Value::Null) => return Ok(false),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (l, r) => match (as_number(l), as_number(r)) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => {
                return Err(format!(
                    "cannot compare {} with {}",
                    left.type_name(),
                    right.type_name()
                ));
            }
        },
    };

    Ok(match (op, ordering) {
        (_, None) => false,
        (CompareOp::Lt, Some(o)) => o == Ordering::Less,
        (CompareOp::Le, Some(o)) => o != Ordering::Greater,
        (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
        (CompareOp::Ge, Some(o)) => o != Ordering::Less,
        (CompareOp::Eq | CompareOp::Ne, Some(_)) => false,
    })
}

#[allow(
    clippy::cast_precision_loss,
    reason = "mixed int/float comparison is approximate by nature"
)]
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Null | Value::Bool(_) | Value::String(_) | Value::List(_) | Value::Map(_) => None,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            as_number(left) == as_number(right)
        }
        _ => left == right,
    }
}

fn expect_bool(value: &Value, operator: &str) -> Result<bool, String> {
    value
        .as_bool()
        .ok_or_else(|| format!("'{operator}' needs boolean operands, found {}", value.type_name()))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::List(items) => items.is_empty(),
        Value::Map(map) => map.is_empty(),
        Value::Bool(_) | Value::Int(_) | Value::Float(_) => false,
    }
}

fn single(args: &[Value]) -> Result<&Value, String> {
    match args {
        [value] => Ok(value),
        _ => Err(format!("expected 1 argument, found {}", args.len())),
    }
}

fn string_pair(args: &[Value]) -> Result<Option<(&str, &str)>, String> {
    match args {
        [Value::String(l), Value::String(r)] => Ok(Some((l, r))),
        [Value::Null, _] | [_, Value::Null] => Ok(None),
        [l, r] => Err(format!(
            "expected two strings, found {} and {}",
            l.type_name(),
            r.type_name()
        )),
        _ => Err(format!("expected 2 arguments, found {}", args.len())),
    }
}

fn sf_is_empty(args: &[Value]) -> Result<Value, String> {
    single(args).map(|v| Value::Bool(is_empty(v)))
}

fn sf_is_not_empty(args: &[Value]) -> Result<Value, String> {
    single(args).map(|v| Value::Bool(!is_empty(v)))
}

fn sf_is_blank(args: &[Value]) -> Result<Value, String> {
    single(args).map(|v| {
        Value::Bool(match v {
            Value::String(s) => s.trim().is_empty(),
            other => is_empty(other),
        })
    })
}

fn sf_is_not_blank(args: &[Value]) -> Result<Value, String> {
    sf_is_blank(args).map(|v| Value::Bool(v.as_bool() == Some(false)))
}

fn sf_contains(args: &[Value]) -> Result<Value, String> {
    if let [Value::List(items), needle] = args {
        return Ok(Value::Bool(items.iter().any(|item| values_equal(item, needle))));
    }
    string_pair(args).map(|pair| Value::Bool(pair.is_some_and(|(s, sub)| s.contains(sub))))
}

fn sf_starts_with(args: &[Value]) -> Result<Value, String> {
    string_pair(args).map(|pair| Value::Bool(pair.is_some_and(|(s, p)| s.starts_with(p))))
}

fn sf_ends_with(args: &[Value]) -> Result<Value, String> {
    string_pair(args).map(|pair| Value::Bool(pair.is_some_and(|(s, p)| s.ends_with(p))))
}

fn sf_size(args: &[Value]) -> Result<Value, String> {
    let len = match single(args)? {
        Value::Null => 0,
        Value::String(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        other => return Err(format!("{} has no size", other.type_name())),
    };
    i64::try_from(len)
        .map(Value::Int)
        .map_err(|e| e.to_string())
}

/// The stock [`ExpressionEvaluator`].
///
/// Functions are kept in an ordered list and looked up first match wins, so a
/// function registered later with [`DefaultEvaluator::register`] shadows a
/// built-in of the same name.
#[derive(Debug, Clone)]
pub struct DefaultEvaluator {
    functions: Vec<(String, Function)>,
}

impl Default for DefaultEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultEvaluator {
    pub fn new() -> Self {
        let builtins: [(&str, Function); 8] = [
            ("SF.isEmpty", sf_is_empty),
            ("SF.isNotEmpty", sf_is_not_empty),
            ("SF.isBlank", sf_is_blank),
            ("SF.isNotBlank", sf_is_not_blank),
            ("SF.contains", sf_contains),
            ("SF.startsWith", sf_starts_with),
            ("SF.endsWith", sf_ends_with),
            ("SF.size", sf_size),
        ];
        Self {
            functions: builtins
                .into_iter()
                .map(|(name, f)| (name.to_owned(), f))
                .collect(),
        }
    }

    pub fn register<N: Into<String>>(&mut self, name: N, function: Function) -> &mut Self {
        self.functions.insert(0, (name.into(), function));
        self
    }

    fn function(&self, name: &str) -> Option<Function> {
        self.functions
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, f)| *f)
    }

    fn eval(&self, expr: &Expr, lookup: &dyn VariableLookup) -> Result<Value, String> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Path(path) => lookup
                .get_path(path)
                .map(|value| value.cloned().unwrap_or(Value::Null)),
            Expr::Call(name, args) => {
                let function = self
                    .function(name)
                    .ok_or_else(|| format!("unknown function '{name}'"))?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, lookup))
                    .collect::<Result<Vec<_>, _>>()?;
                function(&args).map_err(|e| format!("{name}: {e}"))
            }
            Expr::Not(inner) => {
                let value = self.eval(inner, lookup)?;
                expect_bool(&value, "!").map(|b| Value::Bool(!b))
            }
            Expr::Neg(inner) => match self.eval(inner, lookup)? {
                Value::Int(i) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| format!("cannot negate {i}")),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(format!("cannot negate a {}", other.type_name())),
            },
            Expr::And(left, right) => {
                if !expect_bool(&self.eval(left, lookup)?, "&&")? {
                    return Ok(Value::Bool(false));
                }
                expect_bool(&self.eval(right, lookup)?, "&&").map(Value::Bool)
            }
            Expr::Or(left, right) => {
                if expect_bool(&self.eval(left, lookup)?, "||")? {
                    return Ok(Value::Bool(true));
                }
                expect_bool(&self.eval(right, lookup)?, "||").map(Value::Bool)
            }
            Expr::Compare(op, left, right) => {
                let left = self.eval(left, lookup)?;
                let right = self.eval(right, lookup)?;
                compare(*op, &left, &right).map(Value::Bool)
            }
        }
    }
}

fn collect_paths(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Path(path) => {
            if !out.contains(path) {
                out.push(path.clone());
            }
        }
        Expr::Call(_, args) => {
            for arg in args {
                collect_paths(arg, out);
            }
        }
        Expr::Not(inner) | Expr::Neg(inner) => collect_paths(inner, out),
        Expr::And(left, right) | Expr::Or(left, right) | Expr::Compare(_, left, right) => {
            collect_paths(left, out);
            collect_paths(right, out);
        }
    }
}

impl ExpressionEvaluator for DefaultEvaluator {
    fn evaluate(&self, expression: &str, lookup: &dyn VariableLookup) -> SqlateResult<Value> {
        let expr =
            parse_expression(expression).map_err(|e| SqlateError::evaluation(expression, e))?;
        self.eval(&expr, lookup)
            .map_err(|e| SqlateError::evaluation(expression, e))
    }

    fn evaluate_condition(
        &self,
        condition: &Condition,
        lookup: &dyn VariableLookup,
    ) -> SqlateResult<Value> {
        let Some(expr) = &condition.parsed else {
            return self.evaluate(condition.as_str(), lookup);
        };
        self.eval(expr, lookup)
            .map_err(|e| SqlateError::evaluation(condition.as_str(), e))
    }

    fn identifiers(&self, expression: &str) -> Vec<String> {
        let mut paths = Vec::new();
        if let Ok(expr) = parse_expression(expression) {
            collect_paths(&expr, &mut paths);
        }
        paths
    }
}
