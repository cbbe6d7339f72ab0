//! streamgate-bridge — runs a request/response application inside a
//! streaming function invocation.
//!
//! # Architecture
//!
//! ```text
//! invocation event (JSON)
//!   │
//!   ▼
//! InvocationEvent::normalize ──► NormalizedRequest
//!   │
//!   ▼
//! Bridge::handle ── route rule ──► Streaming | Buffered
//!   │
//!   ├── Framework::dispatch(IncomingRequest, ResponseWriter)
//!   │      └── ResponseWriter: preamble guard ──► Sink
//!   │              ├── StreamingSink: every chunk straight to the channel
//!   │              └── BufferedSink:  collect, then one preamble + one body
//!   │
//!   ▼
//! OutputChannel ──► ChannelReceiver (platform / local trigger)
//!   │
//!   ▼
//! Completion::wait  (Finished | Closed)
//! ```
//!
//! A streaming attempt that fails before the preamble reached the channel
//! is replayed once on the buffered path. A failure after that point
//! aborts the channel and is returned as
//! [`BridgeError::StreamFailureAfterFlush`].

pub mod channel;
pub mod completion;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod framework;
pub mod route;
pub mod writer;

pub use channel::{ChannelReceiver, Delivery, Frame, OutputChannel, output_channel};
pub use completion::Completion;
pub use dispatcher::{Bridge, IDEMPOTENCY_HEADER, Outcome, REPLAY_HEADER};
pub use error::{BridgeError, ChannelError};
pub use event::InvocationEvent;
pub use framework::{FnFramework, Framework, framework_fn};
pub use route::{DispatchDecision, StreamingRoutes};
pub use writer::ResponseWriter;
