//! # Field Selection Language
//!
//! Parses the `fields` parameter, e.g.
//! `id,title,comments.limit(5).order(chronological){id,body},author`.
//!
//! Bare names become plain fields of the enclosing entity. Any item with a
//! dotted path, a modifier or a brace group addresses a relation and yields an
//! [`IncludeRequest`] keyed by its full dotted path. Whether a bare name is
//! really a relation can only be decided against the schema, so the planner
//! promotes those later.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::errors::{QueryError, QueryResult};
use super::lexer::{tokenize, TokenKind, TokenStream};
use crate::schema::SortDirection;

/// Caller's request for one relation path
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IncludeRequest {
    /// Dotted path from the root entity
    pub path: String,
    /// True when a brace group listed the fields
    pub explicit: bool,
    /// Fields listed in the brace group (may name nested relations)
    pub fields: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// `chronological` is ascending, `reverse-chronological` descending
    pub order: Option<SortDirection>,
}

impl IncludeRequest {
    fn implicit(path: String) -> Self {
        Self {
            path,
            ..Default::default()
        }
    }
}

/// Parsed `fields` parameter
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    /// Plain names at the top level, in order
    pub fields: Vec<String>,
    /// Every addressed relation path, including intermediate segments
    pub includes: BTreeMap<String, IncludeRequest>,
}

impl Selection {
    pub fn parse(input: &str) -> QueryResult<Self> {
        parse_selection(input)
    }

    pub fn include(&self, path: &str) -> Option<&IncludeRequest> {
        self.includes.get(path)
    }
}

/// Parses the `fields` parameter.
pub fn parse_selection(input: &str) -> QueryResult<Selection> {
    let tokens = tokenize(input).map_err(|e| QueryError::selection(e.position, e.message))?;
    let mut parser = SelectionParser {
        stream: TokenStream::new(tokens, input.len()),
        includes: BTreeMap::new(),
    };

    let mut fields = Vec::new();
    if !parser.stream.is_done() {
        parser.parse_list(None, &mut fields)?;
    }
    if let Some(token) = parser.stream.peek() {
        return Err(QueryError::selection(
            parser.stream.position(),
            format!("unexpected {}", token),
        ));
    }

    Ok(Selection {
        fields,
        includes: parser.includes,
    })
}

const MODIFIERS: [&str; 3] = ["limit", "offset", "order"];

#[derive(Default)]
struct Modifiers {
    limit: Option<u64>,
    offset: Option<u64>,
    order: Option<SortDirection>,
}

impl Modifiers {
    fn is_empty(&self) -> bool {
        self.limit.is_none() && self.offset.is_none() && self.order.is_none()
    }
}

struct SelectionParser {
    stream: TokenStream,
    includes: BTreeMap<String, IncludeRequest>,
}

impl SelectionParser {
    /// `selection := item (',' item)*`
    fn parse_list(&mut self, prefix: Option<&str>, fields: &mut Vec<String>) -> QueryResult<()> {
        loop {
            self.parse_item(prefix, fields)?;
            if !self.stream.eat(&TokenKind::Comma) {
                return Ok(());
            }
        }
    }

    fn parse_item(&mut self, prefix: Option<&str>, fields: &mut Vec<String>) -> QueryResult<()> {
        let mut segments = vec![self.expect_ident("expected field or relation name")?];

        // Extend the path until a modifier call or something else shows up
        while self.stream.peek() == Some(&TokenKind::Dot) {
            if self.is_modifier_ahead() {
                break;
            }
            self.stream.advance();
            segments.push(self.expect_ident("expected relation name after '.'")?);
        }

        let modifiers = self.parse_modifiers()?;

        let mut nested = None;
        if self.stream.eat(&TokenKind::LBrace) {
            if self.stream.peek() == Some(&TokenKind::RBrace) {
                return Err(self.error("empty field group"));
            }
            nested = Some(Vec::new());
        }

        if segments.len() == 1 && modifiers.is_empty() && nested.is_none() {
            let name = segments.remove(0);
            fields.push(name);
            return Ok(());
        }

        // Every intermediate segment is an include with default fields
        let mut path = prefix.map(str::to_string);
        for segment in &segments {
            let next = match path {
                Some(p) => format!("{}.{}", p, segment),
                None => segment.clone(),
            };
            self.includes
                .entry(next.clone())
                .or_insert_with(|| IncludeRequest::implicit(next.clone()));
            path = Some(next);
        }
        let path = path.unwrap_or_default();

        if let Some(mut nested_fields) = nested {
            self.parse_list(Some(&path), &mut nested_fields)?;
            if !self.stream.eat(&TokenKind::RBrace) {
                return Err(self.error("expected '}'"));
            }
            if let Some(include) = self.includes.get_mut(&path) {
                include.explicit = true;
                for field in nested_fields {
                    if !include.fields.contains(&field) {
                        include.fields.push(field);
                    }
                }
            }
        }

        if let Some(include) = self.includes.get_mut(&path) {
            if modifiers.limit.is_some() {
                include.limit = modifiers.limit;
            }
            if modifiers.offset.is_some() {
                include.offset = modifiers.offset;
            }
            if modifiers.order.is_some() {
                include.order = modifiers.order;
            }
        }

        Ok(())
    }

    /// Next tokens are `.limit(`, `.offset(` or `.order(`
    fn is_modifier_ahead(&self) -> bool {
        let is_keyword = matches!(
            self.stream.peek_at(1),
            Some(TokenKind::Ident(word)) if MODIFIERS.contains(&word.as_str())
        );
        is_keyword && self.stream.peek_at(2) == Some(&TokenKind::LParen)
    }

    /// `modifiers := ('.limit(' int ')' | '.offset(' int ')' | '.order(' dir ')')*`
    fn parse_modifiers(&mut self) -> QueryResult<Modifiers> {
        let mut modifiers = Modifiers::default();

        while self.stream.peek() == Some(&TokenKind::Dot) && self.is_modifier_ahead() {
            self.stream.advance();
            let position = self.stream.position();
            let name = self.expect_ident("expected modifier")?;
            self.stream.advance(); // '('

            match name.as_str() {
                "limit" if modifiers.limit.is_none() => {
                    modifiers.limit = Some(self.expect_integer()?);
                }
                "offset" if modifiers.offset.is_none() => {
                    modifiers.offset = Some(self.expect_integer()?);
                }
                "order" if modifiers.order.is_none() => {
                    let word = self.expect_ident("expected chronological or reverse-chronological")?;
                    modifiers.order = Some(match word.as_str() {
                        "chronological" => SortDirection::Asc,
                        "reverse-chronological" => SortDirection::Desc,
                        other => {
                            return Err(QueryError::selection(
                                position,
                                format!("unknown order '{}'", other),
                            ))
                        }
                    });
                }
                other => {
                    return Err(QueryError::selection(
                        position,
                        format!("duplicate modifier '{}'", other),
                    ))
                }
            }

            if !self.stream.eat(&TokenKind::RParen) {
                return Err(self.error("expected ')'"));
            }
        }

        Ok(modifiers)
    }

    fn expect_ident(&mut self, message: &str) -> QueryResult<String> {
        match self.stream.peek() {
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                self.stream.advance();
                Ok(name)
            }
            Some(other) => Err(self.error(format!("{}, found {}", message, other))),
            None => Err(self.error(message)),
        }
    }

    fn expect_integer(&mut self) -> QueryResult<u64> {
        let position = self.stream.position();
        match self.stream.advance() {
            Some(TokenKind::Number(raw)) => raw
                .parse::<u64>()
                .map_err(|_| QueryError::selection(position, format!("expected non-negative integer, found {}", raw))),
            Some(other) => Err(QueryError::selection(
                position,
                format!("expected integer, found {}", other),
            )),
            None => Err(QueryError::selection(position, "expected integer")),
        }
    }

    fn error(&self, message: impl Into<String>) -> QueryError {
        QueryError::selection(self.stream.position(), message)
    }
}
