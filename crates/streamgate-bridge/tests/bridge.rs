use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use serde_json::{Value, json};
use streamgate_bridge::{
    Bridge, BridgeError, ChannelError, Frame, Framework, IDEMPOTENCY_HEADER, Outcome, REPLAY_HEADER,
    StreamingRoutes, framework_fn, output_channel,
};
use streamgate_http::{HeaderMap, Method, Response};

fn event(method: &str, path: &str, body: &str) -> Value {
    json!({
        "rawPath": path,
        "rawQueryString": "",
        "headers": { "content-type": "application/json" },
        "body": body,
        "isBase64Encoded": false,
        "requestContext": {
            "requestId": "req-test",
            "http": { "method": method, "path": path }
        }
    })
}

/// Run one invocation and collect every frame the consumer saw.
async fn run(bridge: Bridge, event: Value) -> (Result<Outcome, BridgeError>, Vec<Frame>) {
    let (channel, mut rx) = output_channel(16);
    let task = tokio::spawn(async move { bridge.invoke(event, channel).await });
    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(frame);
    }
    (task.await.unwrap(), frames)
}

fn preamble_count(frames: &[Frame]) -> usize {
    frames
        .iter()
        .filter(|f| matches!(f, Frame::Preamble(_)))
        .count()
}

fn body(frames: &[Frame]) -> Vec<u8> {
    frames
        .iter()
        .filter_map(|f| match f {
            Frame::Data(b) => Some(b.to_vec()),
            _ => None,
        })
        .flatten()
        .collect()
}

/// Writes `chunks` one at a time, then ends.
fn chunked_app(chunks: Vec<&'static str>) -> impl Framework {
    framework_fn(move |_req, mut res| {
        let chunks = chunks.clone();
        async move {
            res.set_header("content-type", "text/plain")?;
            for chunk in chunks {
                res.write_chunk(chunk).await?;
            }
            res.end().await?;
            Ok(())
        }
    })
}

#[tokio::test]
async fn non_streaming_route_buffers_into_one_write() {
    let bridge = Bridge::new(chunked_app(vec!["a", "b", "c"]));
    let (outcome, frames) = run(bridge, event("GET", "/health", "")).await;

    assert_eq!(outcome.unwrap(), Outcome::Buffered);
    assert_eq!(frames.len(), 3);
    assert!(matches!(&frames[0], Frame::Preamble(p) if p.status == 200));
    assert_eq!(frames[1], Frame::Data(Bytes::from("abc")));
    assert_eq!(frames[2], Frame::End);
}

#[tokio::test]
async fn preamble_exactly_once_and_first() {
    for chunks in [vec![], vec!["only"], vec!["one ", "two ", "three ", "four"]] {
        let expected: String = chunks.concat();
        let data_frames = chunks.len();
        let bridge = Bridge::new(chunked_app(chunks));
        let (outcome, frames) = run(bridge, event("POST", "/chat", "{}")).await;

        assert_eq!(outcome.unwrap(), Outcome::Streamed);
        assert_eq!(preamble_count(&frames), 1);
        assert!(matches!(frames[0], Frame::Preamble(_)));
        assert_eq!(frames.len(), data_frames + 2);
        assert_eq!(frames.last(), Some(&Frame::End));
        assert_eq!(body(&frames), expected.as_bytes());
    }
}

#[tokio::test]
async fn failure_before_first_byte_falls_back_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = {
        let calls = calls.clone();
        let seen = seen.clone();
        framework_fn(move |mut req, mut res| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            seen.lock().unwrap().push((
                req.headers().get(REPLAY_HEADER).map(String::from),
                req.headers().get(IDEMPOTENCY_HEADER).map(String::from),
            ));
            async move {
                let body = req.take_body()?;
                if attempt == 0 {
                    anyhow::bail!("upstream not ready");
                }
                res.set_status(200)?;
                res.write_chunk("fallback:").await?;
                res.end_with(body).await?;
                Ok(())
            }
        })
    };

    let (outcome, frames) = run(Bridge::new(app), event("POST", "/chat", "hi")).await;

    assert_eq!(outcome.unwrap(), Outcome::FellBack);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(preamble_count(&frames), 1);
    assert_eq!(body(&frames), b"fallback:hi");
    assert_eq!(frames.last(), Some(&Frame::End));

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], (None, None));
    assert_eq!(
        seen[1],
        (Some("1".to_string()), Some("req-test".to_string()))
    );
}

#[tokio::test]
async fn abandoned_streaming_response_falls_back() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = {
        let calls = calls.clone();
        framework_fn(move |_req, res| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    drop(res);
                    return Ok(());
                }
                res.end_with("ok").await?;
                Ok(())
            }
        })
    };

    let (outcome, frames) = run(Bridge::new(app), event("POST", "/chat", "")).await;
    assert_eq!(outcome.unwrap(), Outcome::FellBack);
    assert_eq!(body(&frames), b"ok");
}

#[tokio::test]
async fn fallback_can_be_disabled() {
    let app = framework_fn(|_req, _res| async { anyhow::bail!("no stream for you") });
    let bridge = Bridge::new(app).with_fallback(false);

    let (outcome, frames) = run(bridge, event("POST", "/chat", "")).await;
    assert!(matches!(outcome, Err(BridgeError::StreamSetupFailure(_))));
    assert!(frames.is_empty());
}

#[tokio::test]
async fn failure_after_first_byte_aborts_without_fallback() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = {
        let calls = calls.clone();
        framework_fn(move |_req, mut res| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                res.write_chunk("partial").await?;
                anyhow::bail!("model stream broke");
            }
        })
    };

    let (outcome, frames) = run(Bridge::new(app), event("POST", "/chat", "")).await;

    match outcome {
        Err(BridgeError::StreamFailureAfterFlush(cause)) => {
            assert!(cause.to_string().contains("model stream broke"));
        }
        other => panic!("expected StreamFailureAfterFlush, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(preamble_count(&frames), 1);
    assert_eq!(frames[1], Frame::Data(Bytes::from("partial")));
    assert!(matches!(&frames[2], Frame::Abort(reason) if reason.contains("model stream broke")));
    assert!(!frames.contains(&Frame::End));
}

#[tokio::test]
async fn header_case_variants_yield_one_header() {
    let app = framework_fn(|_req, mut res| async move {
        res.set_header("Content-Type", "text/plain")?;
        res.set_header("content-type", "text/event-stream")?;
        res.end_with("data: x\n\n").await?;
        Ok(())
    });

    let (_, frames) = run(Bridge::new(app), event("POST", "/chat", "")).await;
    let Frame::Preamble(preamble) = &frames[0] else {
        panic!("first frame must be the preamble");
    };
    assert_eq!(preamble.headers.len(), 1);
    assert_eq!(
        preamble.headers.get("Content-Type"),
        Some("text/event-stream")
    );
}

#[tokio::test]
async fn base64_body_reaches_the_application_decoded() {
    let app = framework_fn(|mut req, res| async move {
        let length = req.headers().get("content-length").unwrap_or("").to_string();
        let body = req.take_body()?;
        let mut echoed = format!("{length}:").into_bytes();
        echoed.extend_from_slice(&body);
        res.end_with(echoed).await?;
        Ok(())
    });
    let ev = json!({
        "rawPath": "/upload",
        "headers": { "content-length": "8" },
        "body": "aGVsbG8=",
        "isBase64Encoded": true,
        "requestContext": { "http": { "method": "POST" } }
    });

    let (outcome, frames) = run(Bridge::new(app), ev).await;
    assert_eq!(outcome.unwrap(), Outcome::Buffered);
    assert_eq!(body(&frames), b"5:hello");
}

#[tokio::test]
async fn early_disconnect_releases_the_wait() {
    let app = framework_fn(|_req, mut res| async move {
        res.write_chunk("first").await?;
        tokio::time::sleep(Duration::from_secs(3600)).await;
        res.end().await?;
        Ok(())
    });
    let bridge = Bridge::new(app);
    let (channel, mut rx) = output_channel(4);
    let task =
        tokio::spawn(async move { bridge.invoke(event("POST", "/chat", ""), channel).await });

    assert!(matches!(rx.recv().await, Some(Frame::Preamble(_))));
    assert_eq!(rx.recv().await, Some(Frame::Data(Bytes::from("first"))));
    drop(rx);

    let outcome = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("completion wait released")
        .unwrap();
    assert_eq!(outcome.unwrap(), Outcome::Disconnected);
}

#[tokio::test]
async fn malformed_event_never_reaches_the_application() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = {
        let calls = calls.clone();
        framework_fn(move |_req, res| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                res.end().await?;
                Ok(())
            }
        })
    };

    let (outcome, frames) = run(Bridge::new(app), json!({ "rawPath": "/chat" })).await;
    assert!(matches!(outcome, Err(BridgeError::MalformedInvocation(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(frames.is_empty());
}

#[tokio::test]
async fn buffered_application_error_surfaces() {
    let app = framework_fn(|_req, _res| async { anyhow::bail!("database down") });
    let (outcome, frames) = run(Bridge::new(app), event("GET", "/items", "")).await;
    assert!(matches!(outcome, Err(BridgeError::Framework(_))));
    assert!(frames.is_empty());
}

#[tokio::test]
async fn writer_may_finish_in_a_spawned_task() {
    let app = framework_fn(|_req, mut res| async move {
        tokio::spawn(async move {
            for token in ["a", "b"] {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let _ = res.write_chunk(token).await;
            }
            let _ = res.end().await;
        });
        Ok(())
    });

    let (outcome, frames) = run(Bridge::new(app), event("POST", "/chat", "")).await;
    assert_eq!(outcome.unwrap(), Outcome::Streamed);
    assert_eq!(body(&frames), b"ab");
}

#[tokio::test]
async fn send_writes_a_streaming_response_value() {
    let app = framework_fn(|_req, res| async move {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "text/event-stream");
        let tokens = futures_util::stream::iter(["x", "y", "z"].map(Bytes::from));
        res.send(Response::streaming(200, headers, tokens)).await?;
        Ok(())
    });

    let (outcome, frames) = run(Bridge::new(app), event("POST", "/chat", "")).await;
    assert_eq!(outcome.unwrap(), Outcome::Streamed);
    assert_eq!(frames.len(), 5);
    assert_eq!(body(&frames), b"xyz");
}

#[tokio::test]
async fn custom_routes_select_streaming() {
    let bridge = Bridge::new(chunked_app(vec!["1", "2"]))
        .with_routes(StreamingRoutes::empty().with(Method::GET, "/events"));

    let (outcome, frames) = run(bridge.clone(), event("GET", "/events/live", "")).await;
    assert_eq!(outcome.unwrap(), Outcome::Streamed);
    assert_eq!(frames.len(), 4);

    let (outcome, frames) = run(bridge, event("POST", "/chat", "")).await;
    assert_eq!(outcome.unwrap(), Outcome::Buffered);
    assert_eq!(frames.len(), 3);
}

#[tokio::test]
async fn consumer_gone_before_dispatch_is_a_disconnect() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = {
        let calls = calls.clone();
        framework_fn(move |_req, res| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                res.end_with("unseen").await?;
                Ok(())
            }
        })
    };
    let (channel, rx) = output_channel(4);
    drop(rx);

    let outcome = Bridge::new(app)
        .invoke(event("POST", "/chat", ""), channel)
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Disconnected);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn channel_errors_are_typed() {
    let (channel, _rx) = output_channel(1);
    assert_eq!(
        channel.append(Bytes::from("x")).await,
        Err(ChannelError::MissingPreamble)
    );
}
