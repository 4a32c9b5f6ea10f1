//! Endpoint abstraction for client connection URIs.
//!
//! Parses the URI handed to `connect` into either an in-process endpoint or a
//! remote socket.io server address.

use std::fmt;
use std::str::FromStr;

/// Scheme of a remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
    Ws,
    Wss,
}

impl Scheme {
    /// Returns true if the scheme requires TLS.
    #[must_use]
    pub const fn is_secure(self) -> bool {
        matches!(self, Self::Https | Self::Wss)
    }

    /// Default port for the scheme.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Http | Self::Ws => 80,
            Self::Https | Self::Wss => 443,
        }
    }

    /// URI scheme without the `://` separator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }
}

/// Connection endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// In-process transport: `inproc://name`
    Inproc(String),
    /// Remote server: `http[s]://host[:port][/path]` or `ws[s]://...`
    Remote {
        scheme: Scheme,
        host: String,
        port: u16,
        path: String,
    },
}

impl Endpoint {
    /// Parse an endpoint from a string.
    ///
    /// Supported formats:
    /// - `inproc://name`
    /// - `http://host:port/path`, `https://host`
    /// - `ws://host:port`, `wss://host/socket.io`
    ///
    /// # Examples
    ///
    /// ```
    /// use siobridge_core::endpoint::Endpoint;
    ///
    /// let endpoint = Endpoint::parse("inproc://chat").unwrap();
    /// assert!(endpoint.is_inproc());
    ///
    /// let endpoint = Endpoint::parse("wss://example.com").unwrap();
    /// assert_eq!(endpoint.to_string(), "wss://example.com:443/");
    /// ```
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        s.parse()
    }

    /// Returns true if this is an inproc endpoint.
    pub fn is_inproc(&self) -> bool {
        matches!(self, Endpoint::Inproc(_))
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(name) = s.strip_prefix("inproc://") {
            if name.is_empty() {
                return Err(EndpointError::InvalidInprocName(
                    "inproc name cannot be empty".to_string(),
                ));
            }
            return Ok(Endpoint::Inproc(name.to_string()));
        }

        let (scheme, rest) = if let Some(rest) = s.strip_prefix("https://") {
            (Scheme::Https, rest)
        } else if let Some(rest) = s.strip_prefix("http://") {
            (Scheme::Http, rest)
        } else if let Some(rest) = s.strip_prefix("wss://") {
            (Scheme::Wss, rest)
        } else if let Some(rest) = s.strip_prefix("ws://") {
            (Scheme::Ws, rest)
        } else {
            return Err(EndpointError::InvalidScheme(s.to_string()));
        };

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        let (host, port) = split_authority(authority, scheme)?;

        Ok(Endpoint::Remote {
            scheme,
            host,
            port,
            path: path.to_string(),
        })
    }
}

fn split_authority(authority: &str, scheme: Scheme) -> Result<(String, u16), EndpointError> {
    if authority.is_empty() {
        return Err(EndpointError::InvalidHost(authority.to_string()));
    }

    // IPv6 literal: [::1]:3000
    if let Some(stripped) = authority.strip_prefix('[') {
        let close = stripped
            .find(']')
            .ok_or_else(|| EndpointError::InvalidHost(authority.to_string()))?;
        let host = &stripped[..close];
        let port = match stripped[close + 1..].strip_prefix(':') {
            Some(p) => parse_port(p)?,
            None => scheme.default_port(),
        };
        return Ok((format!("[{host}]"), port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => Ok((host.to_string(), parse_port(port)?)),
        Some(_) => Err(EndpointError::InvalidHost(authority.to_string())),
        None => Ok((authority.to_string(), scheme.default_port())),
    }
}

fn parse_port(s: &str) -> Result<u16, EndpointError> {
    s.parse::<u16>()
        .map_err(|_| EndpointError::InvalidPort(s.to_string()))
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Inproc(name) => write!(f, "inproc://{name}"),
            Endpoint::Remote {
                scheme,
                host,
                port,
                path,
            } => write!(f, "{}://{host}:{port}{path}", scheme.as_str()),
        }
    }
}

/// Errors that can occur when parsing endpoints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid scheme in endpoint: {0}")]
    InvalidScheme(String),
    #[error("invalid host: {0}")]
    InvalidHost(String),
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("invalid inproc name: {0}")]
    InvalidInprocName(String),
}
