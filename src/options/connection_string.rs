//! Key/value connection string parsing
//!
//! Format: `key=value;key=value;...`
//!
//! * keys are canonicalized through the registry (case and separators ignored)
//! * values are trimmed; wrap a value in `'` or `"` to keep `;` or surrounding
//!   whitespace, doubling the quote character to escape it
//! * values are never percent-decoded, so Windows paths keep their backslashes

use super::ParsedOptions;
use crate::{Error, Result};
use std::borrow::Cow;
use std::iter::Peekable;
use std::str::Chars;

/// Parse a key/value connection string
pub fn parse(input: &str) -> Result<ParsedOptions> {
    let mut parsed = ParsedOptions::default();
    for (key, value) in split_pairs(input)? {
        parsed.options.insert_raw(&key, value)?;
    }
    Ok(parsed)
}

/// Split into `(key, value)` pairs, honoring quoted values
fn split_pairs(input: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut chars = input.chars().peekable();

    while chars.peek().is_some() {
        let mut key = String::new();
        let mut has_value = false;
        for c in chars.by_ref() {
            match c {
                '=' => {
                    has_value = true;
                    break;
                }
                ';' => break,
                _ => key.push(c),
            }
        }

        let key = key.trim();
        if !has_value {
            if !key.is_empty() {
                return Err(Error::format(format!("missing '=' after '{}'", key)));
            }
            continue;
        }
        if key.is_empty() {
            return Err(Error::format("empty option key"));
        }

        let value = read_value(&mut chars, key)?;
        pairs.push((key.to_string(), value));
    }

    Ok(pairs)
}

/// Read a value up to the next unquoted `;`
fn read_value(chars: &mut Peekable<Chars<'_>>, key: &str) -> Result<String> {
    while chars.next_if(|c| c.is_whitespace()).is_some() {}

    let quote = match chars.peek() {
        Some(&q @ ('"' | '\'')) => q,
        _ => {
            let value: String = chars.by_ref().take_while(|c| *c != ';').collect();
            return Ok(value.trim().to_string());
        }
    };
    chars.next();

    let mut value = String::new();
    loop {
        match chars.next() {
            Some(c) if c == quote => {
                if chars.next_if_eq(&quote).is_some() {
                    value.push(quote);
                } else {
                    break;
                }
            }
            Some(c) => value.push(c),
            None => {
                return Err(Error::format(format!(
                    "unterminated quoted value for '{}'",
                    key
                )));
            }
        }
    }

    for c in chars.by_ref() {
        if c == ';' {
            break;
        }
        if !c.is_whitespace() {
            return Err(Error::format(format!(
                "unexpected '{}' after quoted value for '{}'",
                c, key
            )));
        }
    }
    Ok(value)
}

/// Quote a value for output when the bare form would not survive parsing
pub(crate) fn quote_value(value: &str) -> Cow<'_, str> {
    let needs_quotes = value.contains(';')
        || value.starts_with(['"', '\''])
        || value.trim() != value;
    if needs_quotes {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}
