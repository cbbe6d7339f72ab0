//! HTTP trigger handler.
//!
//! `HttpTrigger` runs a hyper HTTP/1.1 server that turns every request
//! into an invocation of a [`Bridge`], streaming the output channel back
//! to the client as it fills.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use streamgate_bridge::{Bridge, ChannelError, output_channel};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::convert;

/// Response body produced by the trigger: either the live output channel
/// or a short error message.
pub type TriggerBody = UnsyncBoxBody<Bytes, ChannelError>;

/// Local HTTP trigger server.
pub struct HttpTrigger {
    bind_addr: SocketAddr,
    bridge: Bridge,
    channel_capacity: usize,
    next_id: Arc<AtomicU64>,
}

impl HttpTrigger {
    /// Create a new HTTP trigger bound to the given address.
    pub fn new(bind_addr: SocketAddr, bridge: Bridge) -> Self {
        Self {
            bind_addr,
            bridge,
            channel_capacity: 16,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Bind and serve until the shutdown signal is received.
    pub async fn serve(self, shutdown: tokio::sync::watch::Receiver<bool>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .context("failed to bind HTTP trigger")?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener. Spawns a tokio task per
    /// connection using HTTP/1.1.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let local_addr = listener.local_addr().context("listener has no local address")?;
        info!(addr = %local_addr, "HTTP trigger listening");

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, peer_addr) = accept_result.context("accept failed")?;
                    let bridge = self.bridge.clone();
                    let capacity = self.channel_capacity;
                    let next_id = self.next_id.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let svc = service_fn(move |req: Request<Incoming>| {
                            let bridge = bridge.clone();
                            let request_id = format!("local-{}", next_id.fetch_add(1, Ordering::Relaxed));
                            async move {
                                match handle_request(bridge, capacity, req, request_id, peer_addr).await {
                                    Ok(resp) => Ok::<_, hyper::Error>(resp),
                                    Err(e) => {
                                        error!(%peer_addr, error = %e, "request handler failed");
                                        Ok(text_response(
                                            StatusCode::INTERNAL_SERVER_ERROR,
                                            "Internal Server Error",
                                        ))
                                    }
                                }
                            }
                        });

                        if let Err(e) = http1::Builder::new()
                            .serve_connection(io, svc)
                            .await
                        {
                            debug!(%peer_addr, error = %e, "connection error");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    info!("HTTP trigger shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Run one request through the bridge.
///
/// Returns as soon as the preamble is committed; the body keeps streaming
/// from the output channel after that.
async fn handle_request(
    bridge: Bridge,
    capacity: usize,
    req: Request<Incoming>,
    request_id: String,
    peer_addr: SocketAddr,
) -> anyhow::Result<Response<TriggerBody>> {
    let (parts, body) = req.into_parts();
    let body = body
        .collect()
        .await
        .context("failed to read request body")?
        .to_bytes();
    let event = convert::event_from_parts(&parts, &body, request_id.clone(), Some(peer_addr));

    let (channel, mut rx) = output_channel(capacity);
    let invocation = tokio::spawn(async move { bridge.invoke_event(&event, channel).await });

    let Some(preamble) = rx.recv_preamble().await else {
        let response = match invocation.await.context("invocation task panicked")? {
            Ok(outcome) => {
                warn!(%request_id, ?outcome, "invocation finished without a response");
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "no response")
            }
            Err(e) => {
                warn!(%request_id, error = %e, "invocation failed before responding");
                text_response(convert::status_for_error(&e), &e.to_string())
            }
        };
        return Ok(response);
    };

    tokio::spawn(async move {
        match invocation.await {
            Ok(Ok(outcome)) => debug!(%request_id, ?outcome, "invocation finished"),
            Ok(Err(e)) => warn!(%request_id, error = %e, "invocation failed while streaming"),
            Err(e) => error!(%request_id, error = %e, "invocation task panicked"),
        }
    });

    let (status, headers) = convert::response_head(&preamble)?;
    let stream = StreamBody::new(rx.map_ok(Frame::data));
    let mut response = Response::new(stream.boxed_unsync());
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn text_response(status: StatusCode, message: &str) -> Response<TriggerBody> {
    let body = Full::new(Bytes::from(message.to_string()))
        .map_err(|never| match never {})
        .boxed_unsync();
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}
