// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `%{field}` string templates.
//!
//! Templates are compiled once into a list of literal and reference tokens,
//! so malformed expressions are reported at configuration time rather than
//! per event.
//!
//! ```text
//! "%{@message}"          top-level field
//! "%{[meta][region]}"    nested field
//! "logs.%{type}"         literal text mixed with references
//! "%{@timestamp}"        event time, RFC 3339
//! ```
//!
//! A reference that does not resolve on the event renders as its literal
//! `%{...}` text.

use crate::event::{Event, TIMESTAMP_FIELD};
use chrono::SecondsFormat;
use serde_json::Value;
use thiserror::Error;

/// Template compilation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unterminated reference at byte {offset} in template '{template}'")]
    Unterminated { template: String, offset: usize },

    #[error("empty reference at byte {offset} in template '{template}'")]
    EmptyReference { template: String, offset: usize },

    #[error("invalid field path '{reference}' in template '{template}'")]
    InvalidPath { template: String, reference: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Reference { raw: String, path: Vec<String> },
}

/// A compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    tokens: Vec<Token>,
}

impl Template {
    /// Compile a template expression.
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("%{") {
            literal.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or_else(|| TemplateError::Unterminated {
                template: source.to_string(),
                offset: offset + start,
            })?;

            let reference = &after[..end];
            if reference.trim().is_empty() {
                return Err(TemplateError::EmptyReference {
                    template: source.to_string(),
                    offset: offset + start,
                });
            }
            let path = parse_path(reference).ok_or_else(|| TemplateError::InvalidPath {
                template: source.to_string(),
                reference: reference.to_string(),
            })?;

            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            tokens.push(Token::Reference {
                raw: format!("%{{{}}}", reference),
                path,
            });

            let consumed = start + 2 + end + 1;
            offset += consumed;
            rest = &rest[consumed..];
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            tokens,
        })
    }

    /// The original expression.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the template has no field references.
    pub fn is_static(&self) -> bool {
        self.tokens
            .iter()
            .all(|t| matches!(t, Token::Literal(_)))
    }

    /// Render the template against an event.
    pub fn render(&self, event: &Event) -> String {
        let mut out = String::with_capacity(self.source.len());
        for token in &self.tokens {
            match token {
                Token::Literal(s) => out.push_str(s),
                Token::Reference { raw, path } => match resolve(event, path) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(raw),
                },
            }
        }
        out
    }
}

/// Parse `name` or `[a][b]` into path segments.
fn parse_path(reference: &str) -> Option<Vec<String>> {
    if !reference.starts_with('[') {
        if reference.contains('[') || reference.contains(']') {
            return None;
        }
        return Some(vec![reference.to_string()]);
    }

    let mut path = Vec::new();
    let mut rest = reference;
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let close = inner.find(']')?;
        let segment = &inner[..close];
        if segment.is_empty() || segment.contains('[') {
            return None;
        }
        path.push(segment.to_string());
        rest = &inner[close + 1..];
    }
    Some(path)
}

fn resolve(event: &Event, path: &[String]) -> Option<String> {
    if path.len() == 1 && path[0] == TIMESTAMP_FIELD && event.get(TIMESTAMP_FIELD).is_none() {
        return Some(event.timestamp().to_rfc3339_opts(SecondsFormat::Millis, true));
    }

    match event.get_path(path)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
