//! URI parsing
//!
//! Supports:
//! * `mysqlx://[user[:password]@]host-spec[/schema][?key=value&...]`
//! * `mysqlx+ssh://...` (the transport decoration does not change option semantics)
//!
//! See [`hosts`](super::hosts) for the accepted host specifications. Userinfo,
//! schema, query keys and query values are percent-decoded. Certificate paths
//! in the query may be wrapped in parentheses, e.g. `ssl-ca=(c:%5Cclient.pfx)`.

use super::hosts::parse_uri_host_spec;
use super::registry::{canonicalize, ValueKind};
use super::{ConnectOption, ParsedOptions};
use crate::protocol::SCHEME;
use crate::{Error, Result};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left unescaped in serialized URI components (RFC 3986 unreserved)
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Whether the input uses URI syntax rather than key/value syntax
///
/// A `://` after the first `=` or `;` belongs to a key/value value.
pub(crate) fn is_uri(input: &str) -> bool {
    input
        .split_once("://")
        .is_some_and(|(scheme, _)| !scheme.contains(['=', ';']))
}

/// Parse a connection URI
pub fn parse(input: &str) -> Result<ParsedOptions> {
    let input = input.trim();
    let (scheme, rest) = split_scheme(input)?;

    let base_scheme = scheme.split('+').next().unwrap_or_default();
    if !base_scheme.eq_ignore_ascii_case(SCHEME) {
        // Foreign protocol family: keep defaults so the caller reports a
        // semantic error instead of a grammar one.
        tracing::debug!(scheme, "ignoring URI with foreign scheme");
        return Ok(ParsedOptions::default());
    }
    if scheme.len() > base_scheme.len() {
        tracing::debug!(scheme, "ignoring transport decoration in scheme");
    }

    let (body, query) = match rest.split_once('?') {
        Some((body, query)) => (body, Some(query)),
        None => (rest, None),
    };

    let (authority, path) = split_authority(body)?;
    let (userinfo, host_spec) = match authority.rfind('@') {
        Some(at) => (Some(&authority[..at]), &authority[at + 1..]),
        None => (None, authority),
    };

    let mut parsed = ParsedOptions {
        hosts: parse_uri_host_spec(host_spec)?,
        ..Default::default()
    };

    if let Some(userinfo) = userinfo {
        let (user, password) = match userinfo.split_once(':') {
            Some((user, password)) => (user, Some(password)),
            None => (userinfo, None),
        };
        parsed
            .options
            .insert(ConnectOption::User, decode_component(user.trim())?)?;
        if let Some(password) = password {
            parsed
                .options
                .insert(ConnectOption::Password, decode_component(password.trim())?)?;
        }
    }

    if let Some(path) = path {
        let schema = decode_component(path)?;
        if !schema.is_empty() {
            parsed.options.insert(ConnectOption::Database, schema)?;
        }
    }

    if let Some(query) = query {
        parse_query(query, &mut parsed)?;
    }

    Ok(parsed)
}

fn split_scheme(input: &str) -> Result<(&str, &str)> {
    let (scheme, rest) = input
        .split_once("://")
        .ok_or_else(|| Error::format("missing '://' after URI scheme"))?;

    let valid = scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid {
        return Err(Error::format(format!("invalid URI scheme '{}'", scheme)));
    }
    Ok((scheme, rest))
}

/// Split `authority[/schema]` at the first `/` outside a bracketed host list
///
/// `@` is a legal path character, so the userinfo separator is only looked
/// for inside the authority.
fn split_authority(body: &str) -> Result<(&str, Option<&str>)> {
    let unbalanced = || Error::format(format!("unbalanced brackets in host '{}'", body));
    let mut depth = 0usize;
    for (i, c) in body.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.checked_sub(1).ok_or_else(unbalanced)?,
            '/' if depth == 0 => return Ok((&body[..i], Some(&body[i + 1..]))),
            _ => {}
        }
    }
    if depth != 0 {
        return Err(unbalanced());
    }
    Ok((body, None))
}

fn parse_query(query: &str, parsed: &mut ParsedOptions) -> Result<()> {
    for pair in query.split('&') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }

        let (raw_key, raw_value) = match pair.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (pair, None),
        };

        let key = decode_component(raw_key.trim())?;
        let option = canonicalize(&key)?;

        let value = match raw_value {
            Some(raw) => {
                let value = decode_component(raw.trim())?;
                if option.kind() == ValueKind::Path {
                    strip_path_parens(&value).to_string()
                } else {
                    value
                }
            }
            None if option.allows_bare_key() => "true".to_string(),
            None => {
                return Err(Error::argument(format!(
                    "option `{}` requires a value",
                    option
                )));
            }
        };

        parsed.options.insert(option, value)?;
    }
    Ok(())
}

/// Remove the parentheses that may wrap a certificate path
///
/// A trailing `)` is optional: `(..\certs\client.pfx` is accepted as well.
pub(crate) fn strip_path_parens(value: &str) -> &str {
    match value.strip_prefix('(') {
        Some(inner) => inner.strip_suffix(')').unwrap_or(inner),
        None => value,
    }
}

/// Percent-decode a URI component, rejecting malformed escapes
pub(crate) fn decode_component(raw: &str) -> Result<String> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return Err(Error::format(format!("invalid percent-encoding in '{}'", raw)));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| Error::format(format!("percent-encoded value '{}' is not UTF-8", raw)))
}

/// Percent-encode a URI component
pub(crate) fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}
