//! streamgate-trigger — local HTTP trigger for the streaming bridge.
//!
//! Serves a [`Bridge`](streamgate_bridge::Bridge) over plain HTTP/1.1 so an
//! application can be exercised with `curl` without deploying it. Each
//! request is turned into the same invocation event the platform would
//! deliver, and the output channel is streamed back as a chunked response.
//!
//! # Architecture
//!
//! ```text
//! HTTP client
//!   │
//!   ▼
//! hyper server
//!   │
//!   ├── Collect body, convert hyper::Request → InvocationEvent (base64 body)
//!   ├── Spawn Bridge::invoke_event with a fresh output channel
//!   ├── Await the preamble → status + headers
//!   ├── Stream channel chunks as the response body
//!   │
//!   ▼
//! HTTP response (chunked)
//! ```

pub mod convert;
pub mod handler;

pub use handler::{HttpTrigger, TriggerBody};
