//! Line-oriented tokenizer for the `section NAME ... end` configuration format.

use crate::error::{ConfigError, Result};

/// Right-hand side of a `key = value` line, before it is checked against the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RawValue {
    Quoted(String),
    Bare(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StatementKind {
    Section(String),
    End,
    Param { key: String, value: RawValue },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Statement {
    pub line: usize,
    pub kind: StatementKind,
}

/// Replace `/* */` and `#` comments with spaces, keeping newlines so line numbers survive.
fn strip_comments(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut line = 1;
    let mut in_quote = false;
    let mut block_start: Option<usize> = None;

    while let Some(c) = chars.next() {
        if c == '\n' {
            line += 1;
            in_quote = false;
            out.push('\n');
            continue;
        }
        if block_start.is_some() {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                block_start = None;
                out.push_str("  ");
            } else {
                out.push(' ');
            }
            continue;
        }
        match c {
            '"' => {
                in_quote = !in_quote;
                out.push(c);
            }
            '/' if !in_quote && chars.peek() == Some(&'*') => {
                chars.next();
                block_start = Some(line);
                out.push_str("  ");
            }
            '#' if !in_quote => {
                while chars.peek().is_some_and(|&next| next != '\n') {
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }

    match block_start {
        Some(line) => Err(ConfigError::UnterminatedComment { line }),
        None => Ok(out),
    }
}

fn syntax(line: usize, message: impl Into<String>) -> ConfigError {
    ConfigError::Syntax {
        line,
        message: message.into(),
    }
}

fn parse_value(line: usize, text: &str) -> Result<RawValue> {
    if let Some(rest) = text.strip_prefix('"') {
        let Some(end) = rest.find('"') else {
            return Err(syntax(line, "unterminated string"));
        };
        if !rest[end + 1..].trim().is_empty() {
            return Err(syntax(line, "unexpected text after string"));
        }
        return Ok(RawValue::Quoted(rest[..end].to_string()));
    }
    if text.is_empty() {
        return Err(syntax(line, "missing value"));
    }
    if text.split_whitespace().count() != 1 {
        return Err(syntax(line, format!("unexpected text in value `{text}`")));
    }
    Ok(RawValue::Bare(text.to_string()))
}

fn is_identifier(word: &str) -> bool {
    !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub(crate) fn statements(text: &str) -> Result<Vec<Statement>> {
    let stripped = strip_comments(text)?;
    let mut out = Vec::new();

    for (idx, raw_line) in stripped.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let kind = if let Some((key, value)) = trimmed.split_once('=') {
            let key = key.trim();
            if !is_identifier(key) {
                return Err(syntax(line, format!("invalid parameter name `{key}`")));
            }
            StatementKind::Param {
                key: key.to_string(),
                value: parse_value(line, value.trim())?,
            }
        } else {
            let mut words = trimmed.split_whitespace();
            match (words.next(), words.next(), words.next()) {
                (Some("section"), Some(name), None) if is_identifier(name) => {
                    StatementKind::Section(name.to_string())
                }
                (Some("section"), _, _) => {
                    return Err(syntax(line, "expected `section NAME`"));
                }
                (Some("end"), None, None) => StatementKind::End,
                _ => return Err(syntax(line, format!("unrecognized line `{trimmed}`"))),
            }
        };
        out.push(Statement { line, kind });
    }

    Ok(out)
}

/// Parse a decimal or `0x`-prefixed hexadecimal integer, optionally negative.
pub(crate) fn parse_int(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = parse_unsigned(digits)?;
    let value = i64::try_from(magnitude).ok()?;
    Some(if negative { -value } else { value })
}

pub(crate) fn parse_unsigned(text: &str) -> Option<u64> {
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}
