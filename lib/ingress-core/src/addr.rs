use std::fmt;
use std::net::SocketAddr;

/// A backend endpoint address: either a resolved socket address or a
/// `host:port` name pending resolution by the server's connector.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Addr {
    Socket(SocketAddr),
    Name(NameAddr),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NameAddr {
    host: String,
    port: u16,
}

impl NameAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for NameAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Addr::Socket(s) => write!(f, "{}", s),
            Addr::Name(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid address `{0}`")]
pub struct InvalidAddr(String);

impl std::str::FromStr for Addr {
    type Err = InvalidAddr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(sock) = s.parse::<SocketAddr>() {
            return Ok(Addr::Socket(sock));
        }
        let (host, port) = s.rsplit_once(':').ok_or_else(|| InvalidAddr(s.to_string()))?;
        let port: u16 = port.parse().map_err(|_| InvalidAddr(s.to_string()))?;
        if host.is_empty() {
            return Err(InvalidAddr(s.to_string()));
        }
        Ok(Addr::Name(NameAddr::new(host, port)))
    }
}

impl Addr {
    pub fn port(&self) -> u16 {
        match self {
            Addr::Socket(s) => s.port(),
            Addr::Name(n) => n.port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_socket_addr() {
        let addr: Addr = "10.0.0.1:8080".parse().unwrap();
        assert!(matches!(addr, Addr::Socket(_)));
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn parses_name_addr() {
        let addr: Addr = "backend.internal:9000".parse().unwrap();
        match addr {
            Addr::Name(n) => {
                assert_eq!(n.host(), "backend.internal");
                assert_eq!(n.port(), 9000);
            }
            _ => panic!("expected a NameAddr"),
        }
    }

    #[test]
    fn rejects_missing_port() {
        assert!("backend.internal".parse::<Addr>().is_err());
    }
}
