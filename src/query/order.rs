//! # Ordering Language
//!
//! `order := clause (',' clause)*`, `clause := field ('asc' | 'desc')?`

use serde::{Deserialize, Serialize};

use super::errors::{QueryError, QueryResult};
use super::lexer::{tokenize, TokenKind, TokenStream};
use crate::schema::SortDirection;

/// One ordering clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Parses the `order` parameter.
pub fn parse_order(input: &str) -> QueryResult<Vec<OrderBy>> {
    let tokens = tokenize(input).map_err(|e| QueryError::order(e.position, e.message))?;
    let mut stream = TokenStream::new(tokens, input.len());
    let mut clauses = Vec::new();

    if stream.is_done() {
        return Ok(clauses);
    }

    loop {
        let position = stream.position();
        let field = match stream.advance() {
            Some(TokenKind::Ident(name)) => name,
            Some(other) => {
                return Err(QueryError::order(
                    position,
                    format!("expected field name, found {}", other),
                ))
            }
            None => return Err(QueryError::order(position, "expected field name")),
        };

        let direction = if stream.eat_keyword("asc") {
            SortDirection::Asc
        } else if stream.eat_keyword("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };
        clauses.push(OrderBy { field, direction });

        if stream.eat(&TokenKind::Comma) {
            continue;
        }
        if let Some(token) = stream.peek() {
            return Err(QueryError::order(
                stream.position(),
                format!("unexpected {}", token),
            ));
        }
        return Ok(clauses);
    }
}
