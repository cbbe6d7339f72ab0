//! Dual-path dispatch and completion for one invocation.

use std::sync::Arc;

use streamgate_core::StreamingConfig;
use streamgate_http::{IncomingRequest, NormalizedRequest};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::channel::{Delivery, OutputChannel};
use crate::error::{BridgeError, BridgeResult};
use crate::event::{InvocationEvent, normalize_value};
use crate::framework::Framework;
use crate::route::{DispatchDecision, StreamingRoutes};
use crate::writer::ResponseWriter;

/// Set to `1` on a request replayed on the buffered path after a failed
/// streaming attempt.
pub const REPLAY_HEADER: &str = "x-streamgate-replay";

/// Carried on replayed requests so the application can suppress duplicate
/// side effects. A client-supplied value is kept.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// How an invocation was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Streamed,
    Buffered,
    /// Streaming failed before the first byte and the buffered replay
    /// delivered the response.
    FellBack,
    /// The consumer went away before the end of stream.
    Disconnected,
}

/// Drives a [`Framework`] for each invocation.
///
/// Holds no per-invocation state; clone it freely across concurrent
/// invocations.
#[derive(Clone)]
pub struct Bridge {
    framework: Arc<dyn Framework>,
    routes: StreamingRoutes,
    fallback_to_buffered: bool,
}

impl Bridge {
    /// A bridge with the default route rule and fallback enabled.
    pub fn new(framework: impl Framework) -> Self {
        Self {
            framework: Arc::new(framework),
            routes: StreamingRoutes::default(),
            fallback_to_buffered: true,
        }
    }

    pub fn from_config(framework: impl Framework, config: &StreamingConfig) -> BridgeResult<Self> {
        Ok(Self::new(framework)
            .with_routes(StreamingRoutes::from_config(&config.routes)?)
            .with_fallback(config.fallback_to_buffered))
    }

    pub fn with_routes(mut self, routes: StreamingRoutes) -> Self {
        self.routes = routes;
        self
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_to_buffered = enabled;
        self
    }

    pub fn routes(&self) -> &StreamingRoutes {
        &self.routes
    }

    /// Handle a raw JSON invocation event. A malformed event is rejected
    /// before the application is called.
    pub async fn invoke(
        &self,
        event: serde_json::Value,
        channel: OutputChannel,
    ) -> BridgeResult<Outcome> {
        let request = normalize_value(event).inspect_err(|e| {
            warn!(error = %e, "rejecting malformed invocation");
        })?;
        self.handle(request, channel).await
    }

    /// Like [`invoke`](Bridge::invoke) for an already parsed event.
    pub async fn invoke_event(
        &self,
        event: &InvocationEvent,
        channel: OutputChannel,
    ) -> BridgeResult<Outcome> {
        let request = event.normalize().inspect_err(|e| {
            warn!(error = %e, "rejecting malformed invocation");
        })?;
        self.handle(request, channel).await
    }

    /// Dispatch `request` and wait until the consumer finished reading the
    /// channel or went away.
    pub async fn handle(
        &self,
        request: NormalizedRequest,
        channel: OutputChannel,
    ) -> BridgeResult<Outcome> {
        let decision = self.routes.decide(&request);
        info!(
            method = %request.method(),
            path = request.path(),
            request_id = request.request_id().unwrap_or("-"),
            ?decision,
            "dispatching invocation"
        );

        let mut completion = channel.completion();
        let delivered = tokio::select! {
            biased;
            _ = completion.disconnected() => {
                info!(
                    bytes_sent = channel.bytes_sent(),
                    "client disconnected, cancelling dispatch"
                );
                return Ok(Outcome::Disconnected);
            }
            res = self.deliver(decision, &request, &channel) => res,
        };

        let outcome = match delivered {
            Ok(outcome) => outcome,
            Err(e) if channel.delivery() == Delivery::Closed => {
                debug!(error = %e, "dispatch ended after client disconnect");
                return Ok(Outcome::Disconnected);
            }
            Err(e) => return Err(e),
        };

        match completion.wait().await {
            Delivery::Closed => {
                info!(
                    bytes_sent = channel.bytes_sent(),
                    "client disconnected before end of stream"
                );
                Ok(Outcome::Disconnected)
            }
            _ => {
                info!(?outcome, bytes_sent = channel.bytes_sent(), "invocation complete");
                Ok(outcome)
            }
        }
    }

    async fn deliver(
        &self,
        decision: DispatchDecision,
        request: &NormalizedRequest,
        channel: &OutputChannel,
    ) -> BridgeResult<Outcome> {
        match decision {
            DispatchDecision::Buffered => {
                self.run_buffered(request, channel).await?;
                Ok(Outcome::Buffered)
            }
            DispatchDecision::Streaming => match self.run_streaming(request, channel).await {
                Ok(()) => Ok(Outcome::Streamed),
                Err(BridgeError::StreamSetupFailure(cause)) if self.fallback_to_buffered => {
                    warn!(
                        error = %format!("{cause:#}"),
                        "streaming failed before the first byte, replaying on the buffered path"
                    );
                    self.run_buffered(&replay_request(request), channel).await?;
                    Ok(Outcome::FellBack)
                }
                Err(e) => Err(e),
            },
        }
    }

    async fn run_streaming(
        &self,
        request: &NormalizedRequest,
        channel: &OutputChannel,
    ) -> BridgeResult<()> {
        let (writer, finished) = ResponseWriter::streaming(channel.clone());
        let Err(err) = self.attempt(request.to_incoming(), writer, finished).await else {
            return Ok(());
        };
        let cause = into_cause(err);
        if !channel.is_committed() {
            return Err(BridgeError::StreamSetupFailure(cause));
        }

        let reason = format!("{cause:#}");
        error!(
            error = %reason,
            bytes_sent = channel.bytes_sent(),
            "streaming failed after the preamble was sent"
        );
        if !channel.is_ended() {
            // A closed consumer cannot receive the abort; nothing more to do.
            let _ = channel.abort(reason).await;
        }
        Err(BridgeError::StreamFailureAfterFlush(cause))
    }

    async fn run_buffered(
        &self,
        request: &NormalizedRequest,
        channel: &OutputChannel,
    ) -> BridgeResult<()> {
        let (writer, finished, response) = ResponseWriter::buffered();
        self.attempt(request.to_incoming(), writer, finished).await?;
        let response = response.await.map_err(|_| BridgeError::ResponseAbandoned)?;

        debug!(
            status = response.preamble.status,
            body_len = response.body.len(),
            "writing buffered response"
        );
        channel.set_metadata(response.preamble).await?;
        if !response.body.is_empty() {
            channel.append(response.body).await?;
        }
        channel.end().await?;
        Ok(())
    }

    /// Run the application once and wait for it to end the response.
    ///
    /// An application error reported after the response was ended is
    /// logged and otherwise ignored, since the client already has it.
    async fn attempt(
        &self,
        request: IncomingRequest,
        writer: ResponseWriter,
        finished: oneshot::Receiver<()>,
    ) -> BridgeResult<()> {
        let dispatched = self.framework.dispatch(request, writer).await;
        match (dispatched, finished.await) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) => {
                warn!(error = %format!("{e:#}"), "application failed after ending the response");
                Ok(())
            }
            (Err(e), Err(_)) => Err(BridgeError::Framework(e)),
            (Ok(()), Err(_)) => Err(BridgeError::ResponseAbandoned),
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("routes", &self.routes)
            .field("fallback_to_buffered", &self.fallback_to_buffered)
            .finish_non_exhaustive()
    }
}

/// Derive the request used for the buffered replay.
fn replay_request(request: &NormalizedRequest) -> NormalizedRequest {
    let replay = request.with_header(REPLAY_HEADER, "1");
    match request.request_id() {
        Some(id) if !request.headers().contains(IDEMPOTENCY_HEADER) => {
            replay.with_header(IDEMPOTENCY_HEADER, id)
        }
        _ => replay,
    }
}

fn into_cause(err: BridgeError) -> anyhow::Error {
    match err {
        BridgeError::Framework(cause) => cause,
        other => anyhow::Error::new(other),
    }
}
