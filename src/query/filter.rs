//! # Filter Expression Language
//!
//! Boolean expressions over entity fields, e.g.
//! `(name eq "Milk" or name eq "Eggs") and price lt 2.55`.
//!
//! Precedence, loosest first: `or`, `and`, `not`. Parentheses group. The AST
//! is a binary tree; chains of the same operator associate to the left.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::errors::{QueryError, QueryResult};
use super::lexer::{tokenize, TokenKind, TokenStream};

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl FilterOperator {
    /// Keyword in the filter language
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Ne => "ne",
            FilterOperator::Lt => "lt",
            FilterOperator::Le => "le",
            FilterOperator::Gt => "gt",
            FilterOperator::Ge => "ge",
        }
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "eq" => Some(FilterOperator::Eq),
            "ne" => Some(FilterOperator::Ne),
            "lt" => Some(FilterOperator::Lt),
            "le" => Some(FilterOperator::Le),
            "gt" => Some(FilterOperator::Gt),
            "ge" => Some(FilterOperator::Ge),
            _ => None,
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Ne => "<>",
            FilterOperator::Lt => "<",
            FilterOperator::Le => "<=",
            FilterOperator::Gt => ">",
            FilterOperator::Ge => ">=",
        }
    }
}

/// A parsed filter expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterExpr {
    Compare {
        field: String,
        operator: FilterOperator,
        /// String, number, boolean or null
        value: Value,
    },
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    pub fn compare(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self::Compare {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::compare(field, FilterOperator::Eq, value)
    }

    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        Self::compare(field, FilterOperator::Lt, value)
    }

    pub fn gt(field: impl Into<String>, value: Value) -> Self {
        Self::compare(field, FilterOperator::Gt, value)
    }

    pub fn and(left: FilterExpr, right: FilterExpr) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: FilterExpr, right: FilterExpr) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    pub fn negate(inner: FilterExpr) -> Self {
        Self::Not(Box::new(inner))
    }

    /// Parses the filter language
    pub fn parse(input: &str) -> QueryResult<Self> {
        parse_filter(input)
    }

    /// Every field referenced by a comparison, in source order
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            FilterExpr::Compare { field, .. } => out.push(field),
            FilterExpr::And(l, r) | FilterExpr::Or(l, r) => {
                l.collect_fields(out);
                r.collect_fields(out);
            }
            FilterExpr::Not(inner) => inner.collect_fields(out),
        }
    }

    /// Renders the expression as a raw SQL boolean with columns qualified by `table`
    pub fn to_sql(&self, table: &str) -> String {
        let mut out = String::new();
        self.render(&mut out, &Style::Sql { table });
        out
    }

    /// Evaluates the expression against a stored row with SQL three-valued
    /// logic; an unknown result does not match
    pub fn matches(&self, row: &Map<String, Value>) -> bool {
        self.eval(row) == Some(true)
    }

    fn eval(&self, row: &Map<String, Value>) -> Option<bool> {
        match self {
            FilterExpr::Compare {
                field,
                operator,
                value,
            } => {
                let actual = row.get(field).unwrap_or(&Value::Null);
                compare_values(actual, *operator, value)
            }
            FilterExpr::And(l, r) => match (l.eval(row), r.eval(row)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            FilterExpr::Or(l, r) => match (l.eval(row), r.eval(row)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            FilterExpr::Not(inner) => inner.eval(row).map(|b| !b),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            FilterExpr::Or(..) => 1,
            FilterExpr::And(..) => 2,
            FilterExpr::Not(_) | FilterExpr::Compare { .. } => 3,
        }
    }

    fn render(&self, out: &mut String, style: &Style<'_>) {
        match self {
            FilterExpr::Compare {
                field,
                operator,
                value,
            } => style.comparison(out, field, *operator, value),
            FilterExpr::Or(l, r) => {
                l.render_child(out, style, 1);
                out.push_str(style.keyword(" or ", " OR "));
                // Right operand of the same level is grouped so the tree
                // shape survives a re-parse
                r.render_child(out, style, 2);
            }
            FilterExpr::And(l, r) => {
                l.render_child(out, style, 2);
                out.push_str(style.keyword(" and ", " AND "));
                r.render_child(out, style, 3);
            }
            FilterExpr::Not(inner) => {
                out.push_str(style.keyword("not ", "NOT "));
                match inner.as_ref() {
                    FilterExpr::Compare { .. } => inner.render(out, style),
                    _ => {
                        out.push('(');
                        inner.render(out, style);
                        out.push(')');
                    }
                }
            }
        }
    }

    fn render_child(&self, out: &mut String, style: &Style<'_>, min_precedence: u8) {
        if self.precedence() < min_precedence {
            out.push('(');
            self.render(out, style);
            out.push(')');
        } else {
            self.render(out, style);
        }
    }
}

/// Re-serializes into the filter language; `parse(x.to_string()) == x`
impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.render(&mut out, &Style::Language);
        f.write_str(&out)
    }
}

enum Style<'a> {
    Language,
    Sql { table: &'a str },
}

impl Style<'_> {
    fn keyword(&self, language: &'static str, sql: &'static str) -> &'static str {
        match self {
            Style::Language => language,
            Style::Sql { .. } => sql,
        }
    }

    fn comparison(&self, out: &mut String, field: &str, operator: FilterOperator, value: &Value) {
        match self {
            Style::Language => {
                out.push_str(field);
                out.push(' ');
                out.push_str(operator.as_str());
                out.push(' ');
                match value {
                    Value::String(s) => {
                        out.push('"');
                        for c in s.chars() {
                            if c == '"' || c == '\\' {
                                out.push('\\');
                            }
                            out.push(c);
                        }
                        out.push('"');
                    }
                    other => out.push_str(&other.to_string()),
                }
            }
            Style::Sql { table } => {
                out.push_str(table);
                out.push('.');
                out.push_str(field);
                match (operator, value) {
                    (FilterOperator::Eq, Value::Null) => out.push_str(" IS NULL"),
                    (FilterOperator::Ne, Value::Null) => out.push_str(" IS NOT NULL"),
                    (op, value) => {
                        out.push(' ');
                        out.push_str(op.sql());
                        out.push(' ');
                        out.push_str(&sql_literal(value));
                    }
                }
            }
        }
    }
}

fn sql_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

/// Applies one comparison the way the SQL rendering would
fn compare_values(actual: &Value, operator: FilterOperator, expected: &Value) -> Option<bool> {
    match (operator, expected) {
        (FilterOperator::Eq, Value::Null) => return Some(actual.is_null()),
        (FilterOperator::Ne, Value::Null) => return Some(!actual.is_null()),
        _ => {}
    }
    if actual.is_null() || expected.is_null() {
        return None;
    }

    let ordering = order_values(actual, expected);
    Some(match operator {
        FilterOperator::Eq => ordering == Some(Ordering::Equal),
        FilterOperator::Ne => ordering != Some(Ordering::Equal),
        FilterOperator::Lt => ordering == Some(Ordering::Less),
        FilterOperator::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        FilterOperator::Gt => ordering == Some(Ordering::Greater),
        FilterOperator::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
    })
}

/// Orders two JSON scalars of the same kind; mixed kinds are incomparable
pub(crate) fn order_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64()?;
            let b = b.as_f64()?;
            a.partial_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Parses the `filters` parameter.
pub fn parse_filter(input: &str) -> QueryResult<FilterExpr> {
    let tokens = tokenize(input).map_err(|e| QueryError::filter(e.position, e.message))?;
    if tokens.is_empty() {
        return Err(QueryError::filter(0, "empty filter expression"));
    }

    let mut parser = FilterParser {
        stream: TokenStream::new(tokens, input.len()),
    };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.stream.peek() {
        return Err(QueryError::filter(
            parser.stream.position(),
            format!("unexpected {}", token),
        ));
    }
    Ok(expr)
}

struct FilterParser {
    stream: TokenStream,
}

impl FilterParser {
    fn parse_or(&mut self) -> QueryResult<FilterExpr> {
        let mut left = self.parse_and()?;
        while self.stream.eat_keyword("or") {
            let right = self.parse_and()?;
            left = FilterExpr::or(left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> QueryResult<FilterExpr> {
        let mut left = self.parse_term()?;
        while self.stream.eat_keyword("and") {
            let right = self.parse_term()?;
            left = FilterExpr::and(left, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> QueryResult<FilterExpr> {
        let negated = self.stream.eat_keyword("not");

        let inner = if self.stream.eat(&TokenKind::LParen) {
            let expr = self.parse_or()?;
            if !self.stream.eat(&TokenKind::RParen) {
                return Err(self.error("expected ')'"));
            }
            expr
        } else {
            self.parse_comparison()?
        };

        Ok(if negated {
            FilterExpr::negate(inner)
        } else {
            inner
        })
    }

    fn parse_comparison(&mut self) -> QueryResult<FilterExpr> {
        let field = match self.stream.peek() {
            Some(TokenKind::Ident(name)) if !is_reserved(name) => name.clone(),
            Some(other) => return Err(self.error(format!("expected field name, found {}", other))),
            None => return Err(self.error("expected field name")),
        };
        self.stream.advance();

        let operator = match self.stream.peek() {
            Some(TokenKind::Ident(word)) => FilterOperator::from_keyword(word)
                .ok_or_else(|| self.error(format!("unknown operator '{}'", word)))?,
            Some(other) => return Err(self.error(format!("expected operator, found {}", other))),
            None => return Err(self.error("expected operator")),
        };
        self.stream.advance();

        let value = self.parse_literal()?;
        Ok(FilterExpr::compare(field, operator, value))
    }

    fn parse_literal(&mut self) -> QueryResult<Value> {
        let position = self.stream.position();
        let value = match self.stream.peek() {
            Some(TokenKind::Str(s)) => Value::String(s.clone()),
            Some(TokenKind::Number(raw)) => parse_number(raw)
                .ok_or_else(|| QueryError::filter(position, format!("invalid number {}", raw)))?,
            Some(TokenKind::Ident(word)) => match word.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "null" => Value::Null,
                other => {
                    return Err(QueryError::filter(
                        position,
                        format!("expected literal, found '{}' (strings must be double-quoted)", other),
                    ))
                }
            },
            Some(other) => {
                return Err(QueryError::filter(
                    position,
                    format!("expected literal, found {}", other),
                ))
            }
            None => return Err(QueryError::filter(position, "expected literal")),
        };
        self.stream.advance();
        Ok(value)
    }

    fn error(&self, message: impl Into<String>) -> QueryError {
        QueryError::filter(self.stream.position(), message)
    }
}

fn is_reserved(word: &str) -> bool {
    matches!(word, "and" | "or" | "not")
}

/// Integers stay exact up to the `u64` range; anything else is an `f64`
fn parse_number(raw: &str) -> Option<Value> {
    if !raw.contains(['.', 'e', 'E']) {
        if let Ok(n) = raw.parse::<i64>() {
            return Some(Value::Number(n.into()));
        }
        if let Ok(n) = raw.parse::<u64>() {
            return Some(Value::Number(n.into()));
        }
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}
