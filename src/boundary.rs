//! Catching failures of pending content.
//!
//! An [`ErrorBoundary`] replaces pending children that fail, or that take
//! longer than an optional timeout, with its catch content.  Deferred
//! blocks with an [`on_error`](crate::SuspenseProps::on_error) handler
//! cover their own children already; a boundary is what guards a pending
//! fallback, or any pending content outside of a deferred block.

use std::{fmt, time::Duration};

use futures::FutureExt;

use crate::{
    content::{resolve_one, Content, Rendered},
    error::{RenderError, RenderResult},
    suspense::OnError,
};

type TimeoutError = Box<dyn FnOnce(Duration) -> RenderError + Send>;

pub struct ErrorBoundary {
    catch: OnError,
    timeout: Option<Duration>,
    timeout_error: Option<TimeoutError>,
}

impl ErrorBoundary {
    /// Render `catch` when the children fail.
    pub fn new(catch: impl Into<Content>) -> Self {
        Self {
            catch: OnError::Render(catch.into()),
            timeout: None,
            timeout_error: None,
        }
    }

    /// Render whatever `handler` derives from the error when the children
    /// fail.
    pub fn with_handler<F, C>(handler: F) -> Self
    where
        F: FnOnce(&RenderError) -> C + Send + 'static,
        C: Into<Content>,
    {
        Self {
            catch: OnError::Handler(Box::new(move |error| handler(error).into())),
            timeout: None,
            timeout_error: None,
        }
    }

    /// Fail children that have not settled after `timeout` with
    /// [`RenderError::Timeout`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the error children fail with on timeout, in place of
    /// [`RenderError::Timeout`].  Only takes effect together with
    /// [`timeout`](Self::timeout).
    pub fn timeout_error<F>(mut self, error: F) -> Self
    where
        F: FnOnce(Duration) -> RenderError + Send + 'static,
    {
        self.timeout_error = Some(Box::new(error));
        self
    }

    /// Guard `children`.  Children available synchronously are returned
    /// unchanged.  Failures of the catch content itself propagate.
    pub fn render(self, children: impl Into<Content>) -> Rendered {
        let children = match resolve_one(children.into()) {
            Rendered::Ready(html) => return Rendered::Ready(html),
            Rendered::Pending(children) => children,
        };
        let Self {
            catch,
            timeout,
            timeout_error,
        } = self;

        Rendered::Pending(
            async move {
                let result: RenderResult<String> = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, children).await {
                        Ok(result) => result,
                        Err(_) => Err(match timeout_error {
                            Some(error) => error(limit),
                            None => RenderError::Timeout(limit),
                        }),
                    },
                    None => children.await,
                };
                match result {
                    Ok(html) => Ok(html),
                    Err(error) => {
                        tracing::debug!(%error, "error boundary caught a failure");
                        resolve_one(catch.into_content(&error)).into_pending().await
                    }
                }
            }
            .boxed(),
        )
    }
}

impl fmt::Debug for ErrorBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorBoundary")
            .field("catch", &self.catch)
            .field("timeout", &self.timeout)
            .field("timeout_error", &self.timeout_error.is_some())
            .finish()
    }
}
