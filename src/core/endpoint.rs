//! # Endpoint URL Parsing
//!
//! Turn an endpoint URL into a host and port suitable for DNS resolution.
//!
//! Accepted forms are `scheme://host:port/path`, `host:port`, bare `host`,
//! and bracketed IPv6 literals such as `scheme://[::1]:4840`. The scheme and
//! path are carried along for diagnostics only; this core never interprets
//! them. A missing or zero port falls back to [`DEFAULT_PORT`], as does a
//! numeric port above 65535.

use crate::config::DEFAULT_PORT;
use crate::error::{Result, TransportError};
use std::fmt;

/// A resolved endpoint target: the host to look up and the port to dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl Endpoint {
    /// Parse an endpoint URL.
    pub fn parse(url: &str) -> Result<Self> {
        let rest = match url.find("://") {
            Some(idx) => &url[idx + 3..],
            None => url,
        };

        // drop any path component
        let authority = match rest.find('/') {
            Some(idx) => &rest[..idx],
            None => rest,
        };

        if authority.is_empty() {
            return Err(TransportError::Resolution(format!(
                "endpoint URL '{url}' has no host"
            )));
        }

        let (host, port_text) = split_authority(authority, url)?;

        let port = match port_text {
            None => DEFAULT_PORT,
            Some(text) => {
                let value: u32 = text.parse().map_err(|_| {
                    TransportError::Resolution(format!(
                        "endpoint URL '{url}' has a malformed port '{text}'"
                    ))
                })?;

                // out-of-range ports fall back to the well-known default
                if value == 0 || value > u32::from(u16::MAX) {
                    DEFAULT_PORT
                } else {
                    value as u16
                }
            }
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

/// Split `host[:port]`, honoring IPv6 brackets.
fn split_authority<'a>(authority: &'a str, url: &str) -> Result<(&'a str, Option<&'a str>)> {
    if let Some(stripped) = authority.strip_prefix('[') {
        let close = stripped.find(']').ok_or_else(|| {
            TransportError::Resolution(format!("endpoint URL '{url}' has an unterminated '['"))
        })?;

        let host = &stripped[..close];
        let tail = &stripped[close + 1..];

        return match tail.strip_prefix(':') {
            Some(port) => Ok((host, Some(port))),
            None if tail.is_empty() => Ok((host, None)),
            None => Err(TransportError::Resolution(format!(
                "endpoint URL '{url}' has trailing characters after ']'"
            ))),
        };
    }

    match authority.rsplit_once(':') {
        // more than one ':' means an unbracketed IPv6 literal
        Some((host, _)) if host.contains(':') => Ok((authority, None)),
        Some((host, port)) => Ok((host, Some(port))),
        None => Ok((authority, None)),
    }
}
