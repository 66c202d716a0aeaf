//! Endpoint discovery: resolving which node to connect to next.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::ClientError;
use crate::types::{Endpoint, NodeEndpoints};

/// Resolves the node to connect to after a (re)connect is decided.
///
/// The connection logic depends only on this contract, so cluster-aware
/// resolvers can be plugged in without touching operation or subscription
/// code.
#[async_trait]
pub trait EndpointDiscoverer: fmt::Debug + Send + Sync {
    /// Returns the endpoints of the next node to try.
    ///
    /// `failed_endpoint` is the endpoint the previous connection attempt
    /// failed against, if any.
    async fn discover(
        &self,
        failed_endpoint: Option<&Endpoint>,
    ) -> Result<NodeEndpoints, ClientError>;
}

/// Resolves a fixed connection target on every call.
///
/// The connection string is parsed per call; a malformed target is a
/// configuration error and is never retried internally.
#[derive(Debug)]
pub struct SingleEndpointDiscoverer {
    connection_string: String,
    use_tls: bool,
}

impl SingleEndpointDiscoverer {
    pub fn new(connection_string: impl Into<String>, use_tls: bool) -> Self {
        SingleEndpointDiscoverer {
            connection_string: connection_string.into(),
            use_tls,
        }
    }
}

#[async_trait]
impl EndpointDiscoverer for SingleEndpointDiscoverer {
    async fn discover(
        &self,
        _failed_endpoint: Option<&Endpoint>,
    ) -> Result<NodeEndpoints, ClientError> {
        // Accept an optional scheme prefix, e.g. "tcp://host:port".
        let target = match self.connection_string.split_once("://") {
            Some((_, rest)) => rest,
            None => self.connection_string.as_str(),
        };
        let endpoint = Endpoint::parse(target)?;

        Ok(if self.use_tls {
            NodeEndpoints::secure(endpoint)
        } else {
            NodeEndpoints::insecure(endpoint)
        })
    }
}

/// Cycles through a fixed candidate list, skipping the endpoint that just
/// failed while an alternative exists.
#[derive(Debug)]
pub struct RoundRobinEndpointDiscoverer {
    candidates: Vec<Endpoint>,
    use_tls: bool,
    cursor: AtomicUsize,
}

impl RoundRobinEndpointDiscoverer {
    pub fn new(candidates: Vec<Endpoint>, use_tls: bool) -> Result<Self, ClientError> {
        if candidates.is_empty() {
            return Err(ClientError::InvalidArgument(
                "candidate list cannot be empty".to_string(),
            ));
        }
        Ok(RoundRobinEndpointDiscoverer {
            candidates,
            use_tls,
            cursor: AtomicUsize::new(0),
        })
    }

    fn wrap(&self, endpoint: Endpoint) -> NodeEndpoints {
        if self.use_tls {
            NodeEndpoints::secure(endpoint)
        } else {
            NodeEndpoints::insecure(endpoint)
        }
    }
}

#[async_trait]
impl EndpointDiscoverer for RoundRobinEndpointDiscoverer {
    async fn discover(
        &self,
        failed_endpoint: Option<&Endpoint>,
    ) -> Result<NodeEndpoints, ClientError> {
        for _ in 0..self.candidates.len() {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.candidates.len();
            let candidate = &self.candidates[index];

            if let Some(failed) = failed_endpoint {
                if candidate == failed && self.candidates.len() > 1 {
                    continue;
                }
            }

            return Ok(self.wrap(candidate.clone()));
        }

        // Every candidate equals the failed endpoint; take the first.
        Ok(self.wrap(self.candidates[0].clone()))
    }
}
