//! Conversions between hyper/http types and bridge types.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::request::Parts;
use http::StatusCode;
use streamgate_bridge::event::{HttpContext, RequestContext};
use streamgate_bridge::{BridgeError, InvocationEvent};
use streamgate_http::{HttpError, Preamble};

/// Convert a status code from u16.
pub fn status_from_u16(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Build the invocation event the platform would deliver for this request.
///
/// The body is always base64 encoded so binary payloads survive. Header
/// values that are not visible ASCII are dropped.
pub fn event_from_parts(
    parts: &Parts,
    body: &Bytes,
    request_id: String,
    peer: Option<SocketAddr>,
) -> InvocationEvent {
    let mut headers = BTreeMap::new();
    let mut cookies = Vec::new();
    for (name, value) in &parts.headers {
        let Ok(value) = value.to_str() else { continue };
        if *name == http::header::COOKIE {
            cookies.extend(
                value
                    .split(';')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(String::from),
            );
        } else {
            headers.insert(name.as_str().to_string(), value.to_string());
        }
    }

    InvocationEvent {
        raw_path: Some(parts.uri.path().to_string()),
        raw_query_string: Some(parts.uri.query().unwrap_or_default().to_string()),
        headers: Some(headers),
        cookies: (!cookies.is_empty()).then_some(cookies),
        body: (!body.is_empty()).then(|| STANDARD.encode(body)),
        is_base64_encoded: !body.is_empty(),
        request_context: Some(RequestContext {
            request_id: Some(request_id),
            http: Some(HttpContext {
                method: Some(parts.method.to_string()),
                path: Some(parts.uri.path().to_string()),
                source_ip: peer.map(|p| p.ip().to_string()),
            }),
        }),
        ..Default::default()
    }
}

/// Build the response head for a committed preamble.
pub fn response_head(preamble: &Preamble) -> Result<(StatusCode, http::HeaderMap), HttpError> {
    Ok((status_from_u16(preamble.status), preamble.headers.to_http()?))
}

/// Status for an invocation that failed before any response was committed.
pub fn status_for_error(err: &BridgeError) -> StatusCode {
    match err {
        BridgeError::MalformedInvocation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
