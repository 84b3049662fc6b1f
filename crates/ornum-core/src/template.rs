//! # Format Templates
//!
//! Turns a raw receipt number into its printed form.
//!
//! ## Syntax
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Placeholder     Output                        2025-10-05, raw 42      │
//! │  ───────────     ──────                        ──────────────────      │
//! │  {YEAR}          4-digit year                  2025                    │
//! │  {MONTH}         2-digit month                 10                      │
//! │  {DAY}           2-digit day                   05                      │
//! │  {PREFIX}        series prefix (may be empty)  OR                      │
//! │  {NUMBER}        raw number, unpadded          42                      │
//! │  {NUMBER:6}      raw number, zero-padded       000042                  │
//! │  {{ / }}         literal brace                 { / }                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Placeholder names are case-insensitive.
//!
//! ## Single Pass
//! The source is tokenized once into [`Segment`]s and rendering only
//! concatenates them. Substituted values are never scanned again, so a prefix
//! such as `"NUMBER"` or `"{YEAR}"` is printed literally no matter where it
//! sits in the template.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::str::FromStr;

use crate::error::TemplateError;
use crate::MAX_NUMBER_WIDTH;

/// One parsed piece of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segment {
    Literal(String),
    Year,
    Month,
    Day,
    Prefix,
    /// `width: None` inserts the number unpadded.
    Number { width: Option<usize> },
}

/// A parsed, validated format template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl FormatTemplate {
    /// Parses a template.
    ///
    /// ## Rules
    /// - Must not be empty
    /// - Every `{` opens a placeholder closed by the next `}` (or is `{{`)
    /// - A lone `}` must be written `}}`
    /// - Only `NUMBER` takes a width, at most [`MAX_NUMBER_WIDTH`]
    /// - Must contain at least one `NUMBER` placeholder
    ///
    /// ## Example
    /// ```rust
    /// use ornum_core::template::FormatTemplate;
    ///
    /// assert!(FormatTemplate::parse("OR-{YEAR}-{NUMBER:6}").is_ok());
    /// assert!(FormatTemplate::parse("OR-{YEAR}").is_err());
    /// assert!(FormatTemplate::parse("OR-{NUMBER").is_err());
    /// ```
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        if source.trim().is_empty() {
            return Err(TemplateError::Empty);
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((position, c)) = chars.next() {
            match c {
                '{' => {
                    if matches!(chars.peek(), Some((_, '{'))) {
                        chars.next();
                        literal.push('{');
                        continue;
                    }

                    let mut token = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        match inner {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err(TemplateError::Unclosed { position }),
                            other => token.push(other),
                        }
                    }
                    if !closed {
                        return Err(TemplateError::Unclosed { position });
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(parse_placeholder(&token)?);
                }
                '}' => {
                    if matches!(chars.peek(), Some((_, '}'))) {
                        chars.next();
                        literal.push('}');
                    } else {
                        return Err(TemplateError::UnmatchedBrace { position });
                    }
                }
                other => literal.push(other),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if !segments.iter().any(|s| matches!(s, Segment::Number { .. })) {
            return Err(TemplateError::MissingNumber);
        }

        Ok(FormatTemplate {
            source: source.to_string(),
            segments,
        })
    }

    /// Renders the template for one raw number.
    ///
    /// Deterministic: the same `(prefix, raw, date)` always yields the same
    /// string. A missing prefix renders as an empty string.
    pub fn render(&self, prefix: Option<&str>, raw: i64, date: NaiveDate) -> String {
        let mut out = String::with_capacity(self.source.len() + 16);

        for segment in &self.segments {
            // Writing into a String cannot fail
            let _ = match segment {
                Segment::Literal(text) => out.write_str(text),
                Segment::Year => write!(out, "{:04}", date.year()),
                Segment::Month => write!(out, "{:02}", date.month()),
                Segment::Day => write!(out, "{:02}", date.day()),
                Segment::Prefix => out.write_str(prefix.unwrap_or_default()),
                Segment::Number { width: Some(width) } => {
                    write!(out, "{:0width$}", raw, width = *width)
                }
                Segment::Number { width: None } => write!(out, "{}", raw),
            };
        }

        out
    }

    /// The original template text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl FromStr for FormatTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormatTemplate::parse(s)
    }
}

/// Parses the inside of `{...}`.
fn parse_placeholder(token: &str) -> Result<Segment, TemplateError> {
    let (name, width) = match token.split_once(':') {
        Some((name, width)) => (name.trim(), Some(width.trim())),
        None => (token.trim(), None),
    };
    let upper = name.to_ascii_uppercase();

    let segment = match upper.as_str() {
        "YEAR" => Segment::Year,
        "MONTH" => Segment::Month,
        "DAY" => Segment::Day,
        "PREFIX" => Segment::Prefix,
        "NUMBER" => {
            let width = match width {
                None => None,
                Some(value) => Some(parse_width(&upper, value)?),
            };
            return Ok(Segment::Number {
                width: width.filter(|w| *w > 0),
            });
        }
        _ => return Err(TemplateError::UnknownPlaceholder(name.to_string())),
    };

    if let Some(value) = width {
        return Err(TemplateError::InvalidWidth {
            placeholder: upper,
            value: value.to_string(),
        });
    }

    Ok(segment)
}

fn parse_width(placeholder: &str, value: &str) -> Result<usize, TemplateError> {
    let width: usize = value.parse().map_err(|_| TemplateError::InvalidWidth {
        placeholder: placeholder.to_string(),
        value: value.to_string(),
    })?;

    if width > MAX_NUMBER_WIDTH {
        return Err(TemplateError::WidthTooLarge {
            width,
            max: MAX_NUMBER_WIDTH,
        });
    }

    Ok(width)
}

// =============================================================================
// Unit Tests
// =============================================================================
