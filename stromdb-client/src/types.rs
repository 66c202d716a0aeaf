//! Endpoint and subscription vocabulary shared across the client.

use std::fmt;
use std::str::FromStr;

use crate::error::ClientError;

/// A host/port pair identifying one node.
///
/// The host is kept as a string so DNS names survive until connect time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }

    /// Parses a `host:port` pair.
    pub fn parse(s: &str) -> Result<Self, ClientError> {
        let (host, port) = s.rsplit_once(':').ok_or_else(|| {
            ClientError::InvalidArgument(format!("invalid endpoint '{s}': expected host:port"))
        })?;
        if host.is_empty() {
            return Err(ClientError::InvalidArgument(format!(
                "invalid endpoint '{s}': empty host"
            )));
        }
        let port = port.parse().map_err(|_| {
            ClientError::InvalidArgument(format!("invalid endpoint '{s}': bad port"))
        })?;
        Ok(Endpoint::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}

/// Addresses of one discovered node. At least one side is always set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEndpoints {
    pub tcp_endpoint: Option<Endpoint>,
    pub secure_tcp_endpoint: Option<Endpoint>,
}

impl NodeEndpoints {
    pub fn new(
        tcp_endpoint: Option<Endpoint>,
        secure_tcp_endpoint: Option<Endpoint>,
    ) -> Result<Self, ClientError> {
        if tcp_endpoint.is_none() && secure_tcp_endpoint.is_none() {
            return Err(ClientError::InvalidArgument(
                "both tcp endpoint and secure tcp endpoint are none".to_string(),
            ));
        }
        Ok(NodeEndpoints {
            tcp_endpoint,
            secure_tcp_endpoint,
        })
    }

    /// A node reachable over plain TCP.
    pub fn insecure(endpoint: Endpoint) -> Self {
        NodeEndpoints {
            tcp_endpoint: Some(endpoint),
            secure_tcp_endpoint: None,
        }
    }

    /// A node requiring a secure channel.
    pub fn secure(endpoint: Endpoint) -> Self {
        NodeEndpoints {
            tcp_endpoint: None,
            secure_tcp_endpoint: Some(endpoint),
        }
    }
}

/// Client-facing reason a subscription ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionDropReason {
    /// The subscriber asked to unsubscribe.
    UserInitiated,
    AccessDenied,
    NotFound,
    PersistentSubscriptionDeleted,
    MaxSubscribersReached,
    /// Failed while the subscription was still being established.
    SubscribingError,
    ServerError,
    NotAuthenticated,
    /// The connection carrying the subscription went away.
    ConnectionClosed,
    /// A wire reason code this driver does not know, passed through.
    Unknown(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parse() {
        let endpoint = Endpoint::parse("db.example.com:1113").unwrap();
        assert_eq!(endpoint.host, "db.example.com");
        assert_eq!(endpoint.port, 1113);
        assert_eq!(endpoint.to_string(), "db.example.com:1113");

        let endpoint: Endpoint = "127.0.0.1:2113".parse().unwrap();
        assert_eq!(endpoint, Endpoint::new("127.0.0.1", 2113));
    }

    #[test]
    fn test_endpoint_parse_rejects_malformed() {
        assert!(matches!(
            Endpoint::parse("no-port"),
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            Endpoint::parse(":1113"),
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            Endpoint::parse("host:notaport"),
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            Endpoint::parse("host:70000"),
            Err(ClientError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_node_endpoints_require_at_least_one() {
        assert!(NodeEndpoints::new(None, None).is_err());

        let endpoints = NodeEndpoints::insecure(Endpoint::new("localhost", 1113));
        assert!(endpoints.tcp_endpoint.is_some());
        assert!(endpoints.secure_tcp_endpoint.is_none());

        let endpoints = NodeEndpoints::secure(Endpoint::new("localhost", 1114));
        assert!(endpoints.tcp_endpoint.is_none());
        assert!(endpoints.secure_tcp_endpoint.is_some());
    }
}
