use std::future::Future;

use async_trait::async_trait;
use streamgate_http::IncomingRequest;

use crate::writer::ResponseWriter;

/// A request/response application the bridge can drive.
///
/// `dispatch` must eventually call [`ResponseWriter::end`] (or
/// [`ResponseWriter::send`]). The writer may be moved into a spawned task;
/// the bridge waits for the end signal, not for `dispatch` to return.
#[async_trait]
pub trait Framework: Send + Sync + 'static {
    async fn dispatch(
        &self,
        request: IncomingRequest,
        response: ResponseWriter,
    ) -> anyhow::Result<()>;
}

/// Adapter that turns an async closure into a [`Framework`].
pub struct FnFramework<F> {
    f: F,
}

/// Wrap `f` as a [`Framework`].
pub fn framework_fn<F, Fut>(f: F) -> FnFramework<F>
where
    F: Fn(IncomingRequest, ResponseWriter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnFramework { f }
}

#[async_trait]
impl<F, Fut> Framework for FnFramework<F>
where
    F: Fn(IncomingRequest, ResponseWriter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn dispatch(
        &self,
        request: IncomingRequest,
        response: ResponseWriter,
    ) -> anyhow::Result<()> {
        (self.f)(request, response).await
    }
}

impl<F> std::fmt::Debug for FnFramework<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnFramework").finish_non_exhaustive()
    }
}
