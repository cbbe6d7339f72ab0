//! Invocation event parsing and normalization.
//!
//! Accepts both the HTTP API v2 / function URL payload (`rawPath`,
//! `rawQueryString`, `requestContext.http.method`, `cookies`) and the REST
//! API v1 payload (`httpMethod`, `path`, `queryStringParameters`). Unknown
//! fields are ignored.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use streamgate_http::{HeaderMap, Method, NormalizedRequest};
use url::form_urlencoded;

use crate::error::BridgeError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_query_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_string_parameters: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_value_query_string_parameters: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_context: Option<RequestContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
}

impl InvocationEvent {
    pub fn from_value(value: serde_json::Value) -> Result<Self, BridgeError> {
        serde_json::from_value(value).map_err(|e| BridgeError::MalformedInvocation(e.to_string()))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, BridgeError> {
        serde_json::from_slice(bytes).map_err(|e| BridgeError::MalformedInvocation(e.to_string()))
    }

    fn http_context(&self) -> Option<&HttpContext> {
        self.request_context.as_ref()?.http.as_ref()
    }

    /// The request method, from the v2 request context or the v1 field.
    pub fn method(&self) -> Option<&str> {
        self.http_context()
            .and_then(|h| h.method.as_deref())
            .or(self.http_method.as_deref())
    }

    /// `rawPath`, then the routing context path, then the v1 path, then `/`.
    pub fn resolved_path(&self) -> &str {
        non_empty(self.raw_path.as_deref())
            .or_else(|| non_empty(self.http_context().and_then(|h| h.path.as_deref())))
            .or_else(|| non_empty(self.path.as_deref()))
            .unwrap_or("/")
    }

    /// `rawQueryString` as sent, otherwise the v1 parameter maps
    /// re-encoded. The multi-value map wins when both are present.
    pub fn resolved_query(&self) -> Option<String> {
        if let Some(raw) = non_empty(self.raw_query_string.as_deref()) {
            return Some(raw.to_string());
        }
        let mut query = form_urlencoded::Serializer::new(String::new());
        match (
            &self.multi_value_query_string_parameters,
            &self.query_string_parameters,
        ) {
            (Some(multi), _) if !multi.is_empty() => {
                for (name, values) in multi {
                    for value in values {
                        query.append_pair(name, value);
                    }
                }
            }
            (_, Some(single)) => {
                query.extend_pairs(single);
            }
            _ => return None,
        }
        Some(query.finish()).filter(|q| !q.is_empty())
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_context.as_ref()?.request_id.as_deref()
    }

    /// Decode the body into raw bytes.
    pub fn decoded_body(&self) -> Result<Vec<u8>, BridgeError> {
        match &self.body {
            None => Ok(Vec::new()),
            Some(body) if self.is_base64_encoded => STANDARD
                .decode(body.trim())
                .map_err(|e| BridgeError::MalformedInvocation(format!("invalid base64 body: {e}"))),
            Some(body) => Ok(body.as_bytes().to_vec()),
        }
    }

    /// Build the canonical request for this invocation.
    pub fn normalize(&self) -> Result<NormalizedRequest, BridgeError> {
        let raw_method = self
            .method()
            .ok_or_else(|| BridgeError::MalformedInvocation("missing request method".to_string()))?;
        let method = Method::from_bytes(raw_method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                BridgeError::MalformedInvocation(format!("invalid method {raw_method:?}"))
            })?;

        let mut headers = HeaderMap::new();
        for (name, value) in self.headers.iter().flatten() {
            headers.insert(name.as_str(), value.as_str());
        }
        if let Some(cookies) = self.cookies.as_ref().filter(|c| !c.is_empty()) {
            if !headers.contains("cookie") {
                headers.insert("cookie", cookies.join("; "));
            }
        }

        let body = self.decoded_body()?;
        let request = NormalizedRequest::new(
            method,
            self.resolved_path(),
            self.resolved_query(),
            headers,
            body,
        );
        Ok(match self.request_id() {
            Some(id) => request.with_request_id(id),
            None => request,
        })
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

/// Parse and normalize a raw JSON event in one step.
pub fn normalize_value(value: serde_json::Value) -> Result<NormalizedRequest, BridgeError> {
    InvocationEvent::from_value(value)?.normalize()
}
