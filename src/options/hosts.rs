//! Host specifications
//!
//! Both surface syntaxes can name more than one host:
//!
//! * `host`, `host:port`, `[ipv6]`, `[ipv6%zone]:port`
//! * `host1:port,host2` (plain failover list)
//! * `(address=host1:port,priority=90),(address=[::1],priority=10)` (prioritized list)
//!
//! In a URI the lists are wrapped in one more pair of brackets.

use super::uri::decode_component;
use crate::protocol::constants::priority;
use crate::{Error, Result};
use std::fmt;
use std::net::Ipv6Addr;

/// Host as written in the input, before defaults are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    /// Hostname, IPv4 or IPv6 literal (brackets and zone stripped)
    pub address: String,
    /// Explicit port, if any
    pub port: Option<u16>,
    /// Explicit priority, if any
    pub priority: Option<u8>,
}

/// Fully resolved host entry of a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostEntry {
    /// Hostname, IPv4 or IPv6 literal (no brackets, no zone)
    pub address: String,
    /// Port
    pub port: u16,
    /// Failover priority (higher is tried first)
    pub priority: Option<u8>,
}

impl HostSpec {
    /// Apply the default port
    pub fn resolve(self, default_port: u16) -> HostEntry {
        HostEntry {
            address: self.address,
            port: self.port.unwrap_or(default_port),
            priority: self.priority,
        }
    }
}

impl HostEntry {
    /// Create a host entry without priority
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            priority: None,
        }
    }

    /// Whether the address is an IPv6 literal
    pub fn is_ipv6(&self) -> bool {
        self.address.contains(':')
    }

    /// Address with brackets around IPv6 literals
    pub fn bracketed_address(&self) -> String {
        if self.is_ipv6() {
            format!("[{}]", self.address)
        } else {
            self.address.clone()
        }
    }
}

impl fmt::Display for HostEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bracketed_address(), self.port)
    }
}

/// Parse a host list as found in a `server=` value or inside URI list brackets.
///
/// `bare_ipv6` allows an unbracketed IPv6 literal as the whole value; this is
/// only unambiguous in the key/value syntax where the port is a separate key.
pub(crate) fn parse_host_list(text: &str, bare_ipv6: bool) -> Result<Vec<HostSpec>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    if let Some(inner) = bracketed_list(text) {
        return parse_host_list(inner, false);
    }

    let hosts = if text.starts_with('(') {
        split_top_level(text, ',')
            .into_iter()
            .map(parse_priority_entry)
            .collect::<Result<Vec<_>>>()?
    } else {
        let tokens = split_top_level(text, ',');
        let bare_ipv6 = bare_ipv6 && tokens.len() == 1;
        tokens
            .into_iter()
            .map(|token| {
                if token.trim().is_empty() {
                    return Err(Error::format("empty entry in host list"));
                }
                parse_host_token(token, bare_ipv6)
            })
            .collect::<Result<Vec<_>>>()?
    };

    check_priorities(&hosts)?;
    Ok(hosts)
}

/// Contents of `[...]` when the brackets wrap a whole host list rather than
/// a single IPv6 literal
fn bracketed_list(text: &str) -> Option<&str> {
    if !text.starts_with('[') {
        return None;
    }
    let close = find_closing_bracket(text)?;
    if close + 1 != text.len() {
        return None;
    }
    let inner = &text[1..close];
    (inner.trim_start().starts_with('(') || split_top_level(inner, ',').len() > 1).then_some(inner)
}

/// Parse the host part of a URI (between `@` and the schema path).
pub(crate) fn parse_uri_host_spec(spec: &str) -> Result<Vec<HostSpec>> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Ok(Vec::new());
    }

    if spec.starts_with('[') {
        let close = find_closing_bracket(spec)
            .ok_or_else(|| Error::format(format!("unbalanced brackets in host '{}'", spec)))?;
        let inner = &spec[1..close];
        let rest = &spec[close + 1..];

        let inner_trimmed = inner.trim_start();
        if inner_trimmed.starts_with('(') || split_top_level(inner, ',').len() > 1 {
            if !rest.is_empty() {
                return Err(Error::format(format!(
                    "unexpected '{}' after host list",
                    rest
                )));
            }
            let hosts = parse_host_list(inner, false)?;
            if hosts.is_empty() {
                return Err(Error::format("empty host list"));
            }
            return Ok(hosts);
        }
    }

    Ok(vec![parse_host_token(spec, false)?])
}

/// Parse a single `host[:port]` or `[ipv6][:port]` token.
fn parse_host_token(token: &str, bare_ipv6: bool) -> Result<HostSpec> {
    let token = token.trim();

    if token.starts_with('[') {
        let close = token
            .find(']')
            .ok_or_else(|| Error::format(format!("missing ']' in host '{}'", token)))?;
        let address = validate_ipv6(&token[1..close])?;
        let rest = &token[close + 1..];
        let port = if rest.is_empty() {
            None
        } else if let Some(port) = rest.strip_prefix(':') {
            Some(parse_port(port)?)
        } else {
            return Err(Error::format(format!("unexpected '{}' after IPv6 literal", rest)));
        };
        return Ok(HostSpec {
            address,
            port,
            priority: None,
        });
    }

    match token.matches(':').count() {
        0 => Ok(HostSpec {
            address: decode_hostname(token)?,
            port: None,
            priority: None,
        }),
        1 => {
            let (host, port) = token.split_at(token.find(':').unwrap_or(token.len()));
            Ok(HostSpec {
                address: decode_hostname(host)?,
                port: Some(parse_port(&port[1..])?),
                priority: None,
            })
        }
        _ if bare_ipv6 => Ok(HostSpec {
            address: validate_ipv6(token)?,
            port: None,
            priority: None,
        }),
        _ => Err(Error::format(format!(
            "IPv6 address '{}' must be enclosed in brackets",
            token
        ))),
    }
}

/// Parse `(address=host[:port],priority=N)`
fn parse_priority_entry(entry: &str) -> Result<HostSpec> {
    let entry = entry.trim();
    let inner = entry
        .strip_prefix('(')
        .and_then(|e| e.strip_suffix(')'))
        .ok_or_else(|| Error::format(format!("malformed host entry '{}'", entry)))?;

    let mut host: Option<HostSpec> = None;
    let mut priority: Option<u8> = None;

    for part in split_top_level(inner, ',') {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| Error::format(format!("expected key=value in host entry, got '{}'", part.trim())))?;
        match key.trim().to_ascii_lowercase().as_str() {
            "address" => {
                if host.is_some() {
                    return Err(Error::format("address is given twice in host entry"));
                }
                host = Some(parse_host_token(value, false)?);
            }
            "priority" => {
                if priority.is_some() {
                    return Err(Error::format("priority is given twice in host entry"));
                }
                priority = Some(parse_priority(value)?);
            }
            other => {
                return Err(Error::format(format!("unknown host entry key '{}'", other)));
            }
        }
    }

    let mut host =
        host.ok_or_else(|| Error::format(format!("host entry '{}' has no address", entry)))?;
    host.priority = priority;
    Ok(host)
}

fn parse_priority(value: &str) -> Result<u8> {
    let value = value.trim();
    value
        .parse::<u8>()
        .ok()
        .filter(|p| (priority::MIN..=priority::MAX).contains(p))
        .ok_or_else(|| {
            Error::argument(format!(
                "priority must be an integer between {} and {}, got '{}'",
                priority::MIN,
                priority::MAX,
                value
            ))
        })
}

/// Either every host has a priority or none does
pub(crate) fn check_priorities(hosts: &[HostSpec]) -> Result<()> {
    let prioritized = hosts.iter().filter(|h| h.priority.is_some()).count();
    if prioritized != 0 && prioritized != hosts.len() {
        return Err(Error::argument(
            "either assign a priority to every host or to none of them",
        ));
    }
    Ok(())
}

/// Strip an optional `%zone` and validate the literal
fn validate_ipv6(literal: &str) -> Result<String> {
    let literal = literal.trim();
    let address = literal.split('%').next().unwrap_or_default();
    address
        .parse::<Ipv6Addr>()
        .map_err(|_| Error::format(format!("invalid IPv6 address '{}'", literal)))?;
    Ok(address.to_string())
}

/// Percent-decode a hostname or IPv4 token and check its characters
fn decode_hostname(host: &str) -> Result<String> {
    let host = host.trim();
    if host.is_empty() {
        return Err(Error::format("missing host name"));
    }
    let decoded = decode_component(host)?;
    if decoded
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '.' || c == '_')
    {
        Ok(decoded)
    } else {
        Err(Error::format(format!("invalid host '{}'", host)))
    }
}

fn parse_port(port: &str) -> Result<u16> {
    let port = port.trim();
    port.parse::<u16>()
        .map_err(|_| Error::format(format!("invalid port '{}'", port)))
}

/// Index of the `]` matching the `[` at position 0
fn find_closing_bracket(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on `sep` outside of brackets and parentheses
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(address: &str, port: Option<u16>, priority: Option<u8>) -> HostSpec {
        HostSpec {
            address: address.to_string(),
            port,
            priority,
        }
    }

    #[test]
    fn test_single_hosts() {
        assert_eq!(
            parse_uri_host_spec("localhost:33060").unwrap(),
            vec![spec("localhost", Some(33060), None)]
        );
        assert_eq!(
            parse_uri_host_spec("127.0.0.1").unwrap(),
            vec![spec("127.0.0.1", None, None)]
        );
        assert_eq!(
            parse_uri_host_spec("[::1]").unwrap(),
            vec![spec("::1", None, None)]
        );
        assert_eq!(
            parse_uri_host_spec("[2606:b400:440:1040:bd41:e449:45ee:2e1a]:33060").unwrap(),
            vec![spec("2606:b400:440:1040:bd41:e449:45ee:2e1a", Some(33060), None)]
        );
    }

    #[test]
    fn test_zone_is_stripped() {
        let hosts = parse_uri_host_spec("[fe80::bd41:e449:45ee:2e1a%17]").unwrap();
        assert_eq!(hosts[0].address, "fe80::bd41:e449:45ee:2e1a");
    }

    #[test]
    fn test_unbracketed_ipv6_rejected_in_uri() {
        let err =
            parse_uri_host_spec("2606:b400:440:1040:bd41:e449:45ee:2e1a:33060").unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_port_inside_brackets_rejected() {
        let err =
            parse_uri_host_spec("[2606:b400:440:1040:bd41:e449:45ee:2e1a:33060]").unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_priority_list() {
        let hosts = parse_uri_host_spec(
            "[(address=[fe80::bd41:e449:45ee:2e1a%17]:3305,priority=100),(address=db2,priority=50)]",
        )
        .unwrap();
        assert_eq!(
            hosts,
            vec![
                spec("fe80::bd41:e449:45ee:2e1a", Some(3305), Some(100)),
                spec("db2", None, Some(50)),
            ]
        );
    }

    #[test]
    fn test_priority_list_bare_ipv6_address_rejected() {
        let err = parse_uri_host_spec("[(address=fe80::bd41:e449:45ee:2e1a%17,priority=100)]")
            .unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_priority_out_of_range() {
        let err = parse_uri_host_spec("[(address=db1,priority=101)]").unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn test_mixed_priorities_rejected() {
        let err = parse_host_list("(address=db1,priority=10),(address=db2)", false).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn test_plain_list() {
        let hosts = parse_uri_host_spec("[db1:3306,[::1]:33061,db3]").unwrap();
        assert_eq!(
            hosts,
            vec![
                spec("db1", Some(3306), None),
                spec("::1", Some(33061), None),
                spec("db3", None, None),
            ]
        );
    }

    #[test]
    fn test_bare_ipv6_in_key_value_syntax() {
        assert_eq!(
            parse_host_list("::1", true).unwrap(),
            vec![spec("::1", None, None)]
        );
        assert!(parse_host_list("::1,db2", true).is_err());
    }

    #[test]
    fn test_invalid_host_characters() {
        let err = parse_uri_host_spec("uid=myuser;server=localhost").unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_hostnames_are_percent_decoded() {
        assert_eq!(
            parse_uri_host_spec("db%2Done:3306").unwrap(),
            vec![spec("db-one", Some(3306), None)]
        );
        assert!(matches!(
            parse_uri_host_spec("db%2Fone"),
            Err(Error::Format(_))
        ));
        assert!(matches!(parse_uri_host_spec("db%zz"), Err(Error::Format(_))));
    }

    #[test]
    fn test_empty_host_with_port_rejected() {
        assert!(matches!(parse_uri_host_spec(":5"), Err(Error::Format(_))));
        assert!(matches!(parse_host_list(":5", true), Err(Error::Format(_))));
        assert!(matches!(
            parse_host_list("(address=:5,priority=1)", false),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_bracketed_list_in_key_value_syntax() {
        assert_eq!(
            parse_host_list("[(address=a,priority=1),(address=b:3307,priority=2)]", true).unwrap(),
            vec![spec("a", None, Some(1)), spec("b", Some(3307), Some(2))]
        );
        assert_eq!(
            parse_host_list("[a,b:3307]", true).unwrap(),
            vec![spec("a", None, None), spec("b", Some(3307), None)]
        );
        assert_eq!(
            parse_host_list("[::1]", true).unwrap(),
            vec![spec("::1", None, None)]
        );
    }

    #[test]
    fn test_entry_display() {
        assert_eq!(HostEntry::new("::1", 33060).to_string(), "[::1]:33060");
        assert_eq!(HostEntry::new("db", 1).to_string(), "db:1");
    }
}
