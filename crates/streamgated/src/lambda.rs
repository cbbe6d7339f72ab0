//! Lambda runtime glue.
//!
//! Each invocation gets its own output channel. The handler returns as soon
//! as the preamble is committed, handing the receiver to the runtime as the
//! response stream; the bridge keeps writing into the channel from a
//! spawned task until the application ends the response.

use http::header::SET_COOKIE;
use lambda_runtime::{Error, LambdaEvent, MetadataPrelude, StreamResponse, service_fn};
use serde_json::Value;
use streamgate_bridge::{Bridge, ChannelReceiver, output_channel};
use streamgate_http::{HttpError, Preamble};
use streamgate_trigger::convert::status_from_u16;
use tracing::{debug, error, warn};

pub async fn run(bridge: Bridge, channel_capacity: usize) -> anyhow::Result<()> {
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let bridge = bridge.clone();
        async move { handle(bridge, channel_capacity, event).await }
    }))
    .await
    .map_err(|e| anyhow::anyhow!("lambda runtime failed: {e}"))
}

async fn handle(
    bridge: Bridge,
    channel_capacity: usize,
    event: LambdaEvent<Value>,
) -> Result<StreamResponse<ChannelReceiver>, Error> {
    let request_id = event.context.request_id.clone();
    let (channel, mut rx) = output_channel(channel_capacity);
    let invocation = tokio::spawn(async move { bridge.invoke(event.payload, channel).await });

    let Some(preamble) = rx.recv_preamble().await else {
        return match invocation.await? {
            Ok(outcome) => {
                warn!(%request_id, ?outcome, "invocation finished without a response");
                Err(format!("invocation finished without a response ({outcome:?})").into())
            }
            Err(e) => {
                warn!(%request_id, error = %e, "invocation failed before responding");
                Err(e.into())
            }
        };
    };

    tokio::spawn(async move {
        match invocation.await {
            Ok(Ok(outcome)) => debug!(%request_id, ?outcome, "invocation finished"),
            Ok(Err(e)) => warn!(%request_id, error = %e, "invocation failed while streaming"),
            Err(e) => error!(%request_id, error = %e, "invocation task panicked"),
        }
    });

    Ok(StreamResponse {
        metadata_prelude: metadata_prelude(preamble)?,
        stream: rx,
    })
}

/// Convert a preamble into the metadata the runtime sends ahead of the body.
/// `set-cookie` headers travel in the prelude's cookie list.
fn metadata_prelude(preamble: Preamble) -> Result<MetadataPrelude, HttpError> {
    let mut headers = preamble.headers.to_http()?;
    let cookies = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(String::from)
        .collect();
    headers.remove(SET_COOKIE);

    Ok(MetadataPrelude {
        status_code: status_from_u16(preamble.status),
        headers,
        cookies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use serde_json::json;
    use streamgate_bridge::framework_fn;
    use streamgate_http::HeaderMap;

    fn lambda_event(payload: Value) -> LambdaEvent<Value> {
        LambdaEvent::new(payload, lambda_runtime::Context::default())
    }

    #[test]
    fn set_cookie_moves_to_prelude_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "text/plain");
        headers.insert("Set-Cookie", "session=abc; HttpOnly");

        let prelude = metadata_prelude(Preamble::new(201, headers)).unwrap();
        assert_eq!(prelude.status_code, http::StatusCode::CREATED);
        assert_eq!(prelude.headers.get("content-type").unwrap(), "text/plain");
        assert!(prelude.headers.get("set-cookie").is_none());
        assert_eq!(prelude.cookies, vec!["session=abc; HttpOnly".to_string()]);
    }

    #[test]
    fn every_set_cookie_reaches_the_prelude() {
        let mut headers = HeaderMap::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("set-cookie", "b=2; Secure");

        let prelude = metadata_prelude(Preamble::new(200, headers)).unwrap();
        assert!(prelude.headers.is_empty());
        assert_eq!(prelude.cookies, vec!["a=1".to_string(), "b=2; Secure".to_string()]);
    }

    #[tokio::test]
    async fn handler_streams_the_channel() {
        let bridge = Bridge::new(framework_fn(|_req, mut res| async move {
            res.set_header("content-type", "text/event-stream")?;
            res.write_chunk("data: a\n\n").await?;
            res.end_with("data: b\n\n").await?;
            Ok(())
        }));
        let payload = json!({
            "rawPath": "/chat",
            "requestContext": { "http": { "method": "POST" } }
        });

        let response = handle(bridge, 4, lambda_event(payload)).await.unwrap();
        assert_eq!(response.metadata_prelude.status_code, http::StatusCode::OK);
        let body: Vec<_> = response.stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(body.concat(), b"data: a\n\ndata: b\n\n");
    }

    #[tokio::test]
    async fn malformed_event_is_an_invocation_error() {
        let bridge = Bridge::new(framework_fn(|_req, res| async move {
            res.end().await?;
            Ok(())
        }));
        let err = handle(bridge, 4, lambda_event(json!({ "rawPath": "/" })))
            .await
            .err()
            .expect("malformed event rejected");
        assert!(err.to_string().contains("malformed invocation"));
    }
}
