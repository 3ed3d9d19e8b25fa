use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 9292;

/// Where the server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("empty listen address")]
    Empty,
    #[error("missing host in listen address {0:?}")]
    MissingHost(String),
    #[error("invalid port in listen address {0:?}")]
    InvalidPort(String),
}

impl Endpoint {
    /// Parses a listen address.
    ///
    /// Anything containing a `/` is a Unix domain socket path. Otherwise the
    /// string is `host[:port]` (`[v6addr]:port` for IPv6), with the port
    /// defaulting to [`DEFAULT_PORT`].
    ///
    /// ```
    /// # use tack::server::endpoint::Endpoint;
    /// assert_eq!(
    ///     Endpoint::parse("localhost").unwrap(),
    ///     Endpoint::Tcp { host: "localhost".into(), port: 9292 }
    /// );
    /// assert!(matches!(Endpoint::parse("/tmp/app.sock").unwrap(), Endpoint::Unix(_)));
    /// ```
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EndpointError::Empty);
        }
        if s.contains('/') {
            return Ok(Endpoint::Unix(PathBuf::from(s)));
        }

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| EndpointError::MissingHost(s.to_string()))?;
            let port = match after {
                "" => None,
                p => Some(
                    p.strip_prefix(':')
                        .ok_or_else(|| EndpointError::InvalidPort(s.to_string()))?,
                ),
            };
            (host, port)
        } else {
            match s.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (s, None),
            }
        };

        if host.is_empty() {
            return Err(EndpointError::MissingHost(s.to_string()));
        }

        let port = match port {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| EndpointError::InvalidPort(s.to_string()))?,
            None => DEFAULT_PORT,
        };

        Ok(Endpoint::Tcp {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Endpoint::Tcp { host, port } => write!(f, "{host}:{port}"),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

impl std::str::FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}
