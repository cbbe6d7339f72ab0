//! Per-invocation choice between the streaming and buffered paths.

use streamgate_core::RouteConfig;
use streamgate_http::{Method, NormalizedRequest};

use crate::error::BridgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchDecision {
    Streaming,
    Buffered,
}

/// `(method, path substring)` pairs that are eligible for streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingRoutes {
    rules: Vec<(Method, String)>,
}

impl StreamingRoutes {
    /// No route streams.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with(mut self, method: Method, path_contains: impl Into<String>) -> Self {
        self.rules.push((method, path_contains.into()));
        self
    }

    pub fn from_config(routes: &[RouteConfig]) -> Result<Self, BridgeError> {
        let mut rules = Self::empty();
        for route in routes {
            let method = Method::from_bytes(route.method.to_ascii_uppercase().as_bytes())
                .map_err(|_| {
                    BridgeError::InvalidRoute(format!("invalid method {:?}", route.method))
                })?;
            if route.path_contains.is_empty() {
                return Err(BridgeError::InvalidRoute(format!(
                    "empty path for {}",
                    route.method
                )));
            }
            rules = rules.with(method, route.path_contains.clone());
        }
        Ok(rules)
    }

    pub fn decide(&self, request: &NormalizedRequest) -> DispatchDecision {
        let eligible = self.rules.iter().any(|(method, segment)| {
            request.method() == method && request.path().contains(segment.as_str())
        });
        if eligible {
            DispatchDecision::Streaming
        } else {
            DispatchDecision::Buffered
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for StreamingRoutes {
    fn default() -> Self {
        Self::empty().with(Method::POST, "/chat")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use streamgate_http::HeaderMap;

    fn request(method: Method, path: &str) -> NormalizedRequest {
        NormalizedRequest::new(method, path, None, HeaderMap::new(), Bytes::new())
    }

    #[test]
    fn default_streams_post_chat_only() {
        let routes = StreamingRoutes::default();
        assert_eq!(
            routes.decide(&request(Method::POST, "/chat")),
            DispatchDecision::Streaming
        );
        assert_eq!(
            routes.decide(&request(Method::POST, "/api/chat/stream")),
            DispatchDecision::Streaming
        );
        assert_eq!(
            routes.decide(&request(Method::GET, "/chat")),
            DispatchDecision::Buffered
        );
        assert_eq!(
            routes.decide(&request(Method::POST, "/health")),
            DispatchDecision::Buffered
        );
    }

    #[test]
    fn empty_routes_never_stream() {
        let routes = StreamingRoutes::empty();
        assert!(routes.is_empty());
        assert_eq!(
            routes.decide(&request(Method::POST, "/chat")),
            DispatchDecision::Buffered
        );
    }

    #[test]
    fn from_config_builds_rules() {
        let routes = StreamingRoutes::from_config(&[
            RouteConfig::new("POST", "/chat"),
            RouteConfig::new("get", "/events"),
        ])
        .unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(
            routes.decide(&request(Method::GET, "/events/1")),
            DispatchDecision::Streaming
        );
    }

    #[test]
    fn from_config_rejects_empty_path() {
        let err = StreamingRoutes::from_config(&[RouteConfig::new("POST", "")]).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRoute(_)));
    }
}
