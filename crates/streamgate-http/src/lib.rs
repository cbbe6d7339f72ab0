//! streamgate request/response value types.
//!
//! These are the shapes the wrapped application sees. They deliberately
//! carry no socket: the whole request body is already in memory when the
//! bridge hands a request to the application, and responses are written
//! through a sink the bridge controls.
//!
//! # Body Model
//!
//! A [`NormalizedRequest`] is immutable and cheap to clone (`Bytes` is
//! reference counted), so the bridge can replay it. The application gets
//! an [`IncomingRequest`] built from it, whose body can be consumed exactly
//! once, either whole via [`IncomingRequest::take_body()`] or in fixed-size
//! chunks via [`IncomingRequest::body_stream()`].
//!
//! A [`Response`] holds either a buffered body or a `Stream<Item = Bytes>`
//! that is drained chunk by chunk by whoever writes it out.
//!
//! # Headers
//!
//! [`HeaderMap`] is a mapping, not a list: names compare case-insensitively
//! and a later insert replaces the earlier value.

pub(crate) mod body;
mod error;
mod header;
mod request;
mod response;

pub use body::{ByteStream, DEFAULT_CHUNK_SIZE, InfallibleByteStream};
pub use error::HttpError;
pub use header::{Header, HeaderMap};
pub use http::Method;
pub use request::{IncomingRequest, NormalizedRequest};
pub use response::{BufferedResponse, Preamble, Response};
