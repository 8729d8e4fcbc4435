use tokio::runtime::Handle;

use crate::{
    content::{resolve_one, Content, Rendered},
    error::{RenderError, RenderResult},
    registry::{Registry, Settlement},
    request::{Request, RequestId},
    sink::HtmlStream,
};

impl Registry {
    /// Render the tree produced by `factory` as a stream.
    ///
    /// The factory receives the [`Request`] its deferred blocks must be
    /// registered against.  The first chunk of the returned stream is the
    /// shell, i.e. everything that resolved without awaiting deferred
    /// blocks; each deferred block then contributes one patch chunk in the
    /// order the blocks settle.  The stream ends once the root and every
    /// deferred block have been written.
    ///
    /// A root that resolves asynchronously is awaited on a detached task;
    /// if it fails, the error is the only item of the stream.
    ///
    /// # Errors
    ///
    /// [`RenderError::DuplicateRequestId`] if `id` is still streaming,
    /// whatever error the factory returned, or
    /// [`RenderError::MissingRuntime`] when the root is pending outside of
    /// a tokio runtime.  No stream is returned in any of these cases and
    /// the request is not left registered.
    pub fn render_to_stream<F, C>(
        &self,
        factory: F,
        id: Option<RequestId>,
    ) -> RenderResult<HtmlStream>
    where
        F: FnOnce(Request) -> RenderResult<C>,
        C: Into<Content>,
    {
        let (key, stream) = self.open(id)?;
        let settlement = Settlement::root(self, &key);

        let content = match factory(Request::new(key.clone(), self.clone())) {
            Ok(content) => content.into(),
            Err(error) => {
                tracing::debug!(request = %key.id, %error, "render factory failed");
                settlement.discard();
                return Err(error);
            }
        };

        match resolve_one(content) {
            Rendered::Ready(html) => settlement.complete(Ok(html)),
            Rendered::Pending(pending) => {
                let Ok(runtime) = Handle::try_current() else {
                    settlement.discard();
                    return Err(RenderError::MissingRuntime);
                };
                runtime.spawn(async move {
                    let outcome = pending.await;
                    settlement.complete(outcome);
                });
            }
        }

        Ok(stream)
    }

    /// Render the tree produced by `factory` to a single string, waiting
    /// for every deferred block.
    ///
    /// # Errors
    ///
    /// Everything [`render_to_stream`](Self::render_to_stream) fails with,
    /// plus the first error surfaced on the stream.
    pub async fn render_to_string<F, C>(
        &self,
        factory: F,
        id: Option<RequestId>,
    ) -> RenderResult<String>
    where
        F: FnOnce(Request) -> RenderResult<C>,
        C: Into<Content>,
    {
        self.render_to_stream(factory, id)?.into_string().await
    }
}

/// [`Registry::render_to_stream`] against the process-wide registry.
///
/// # Errors
///
/// See [`Registry::render_to_stream`].
#[cfg(feature = "global")]
pub fn render_to_stream<F, C>(factory: F, id: Option<RequestId>) -> RenderResult<HtmlStream>
where
    F: FnOnce(Request) -> RenderResult<C>,
    C: Into<Content>,
{
    Registry::global().render_to_stream(factory, id)
}

/// [`Registry::render_to_string`] against the process-wide registry.
///
/// # Errors
///
/// See [`Registry::render_to_string`].
#[cfg(feature = "global")]
pub async fn render_to_string<F, C>(factory: F, id: Option<RequestId>) -> RenderResult<String>
where
    F: FnOnce(Request) -> RenderResult<C>,
    C: Into<Content>,
{
    Registry::global().render_to_string(factory, id).await
}
