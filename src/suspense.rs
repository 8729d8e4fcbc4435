//! Deferred blocks.
//!
//! A deferred block renders its children right away when they are
//! available synchronously.  Otherwise it renders its fallback inside a
//! placeholder, counts itself against the request record and detaches a
//! task which, once the children settle, writes the patch replacing that
//! placeholder into the request's output.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use ssr_suspense::{Content, Registry, SuspenseProps};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ssr_suspense::RenderResult<()> {
//! let registry = Registry::new();
//! let html = registry
//!     .render_to_string(
//!         |request| {
//!             let slow = Content::pending(async {
//!                 tokio::time::sleep(Duration::from_millis(5)).await;
//!                 Ok("<p>loaded</p>")
//!             });
//!             request.suspense(SuspenseProps::new("<p>loading</p>", slow))
//!         },
//!         None,
//!     )
//!     .await?;
//!
//! assert!(html.starts_with(r#"<div id="B:1" data-sf><p>loading</p></div>"#));
//! assert!(html.ends_with(r#"<template id="N:1" data-sr><p>loaded</p></template><script id="S:1" data-ss>$RC(1)</script>"#));
//! assert!(registry.is_empty());
//! # Ok(())
//! # }
//! ```

use std::{fmt, panic::AssertUnwindSafe};

use futures::FutureExt;
use tokio::runtime::Handle;

use crate::{
    content::{resolve_one, Content, Rendered},
    error::{RenderError, RenderResult},
    registry::{Registry, Settlement, Slot},
    request::RequestId,
    script,
};

/// What to render in place of children that failed.
pub enum OnError {
    /// Fixed content.
    Render(Content),
    /// Content derived from the error.
    Handler(Box<dyn FnOnce(&RenderError) -> Content + Send>),
}

impl OnError {
    pub(crate) fn into_content(self, error: &RenderError) -> Content {
        match self {
            OnError::Render(content) => content,
            OnError::Handler(handler) => handler(error),
        }
    }
}

impl fmt::Debug for OnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnError::Render(content) => f.debug_tuple("Render").field(content).finish(),
            OnError::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

/// The arguments of a deferred block.
#[derive(Debug)]
pub struct SuspenseProps {
    pub(crate) request_id: Option<RequestId>,
    pub(crate) fallback: Content,
    pub(crate) children: Content,
    pub(crate) on_error: Option<OnError>,
}

impl SuspenseProps {
    pub fn new(fallback: impl Into<Content>, children: impl Into<Content>) -> Self {
        Self {
            request_id: None,
            fallback: fallback.into(),
            children: children.into(),
            on_error: None,
        }
    }

    /// The request this block belongs to.  Blocks created through
    /// [`Request::suspense`](crate::Request::suspense) get it filled in.
    pub fn request_id(mut self, id: impl Into<RequestId>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Render `content` instead of failing the stream when the children
    /// fail.
    pub fn on_error(mut self, content: impl Into<Content>) -> Self {
        self.on_error = Some(OnError::Render(content.into()));
        self
    }

    /// Like [`on_error`](Self::on_error), with the content derived from
    /// the error.
    pub fn on_error_with<F, C>(mut self, handler: F) -> Self
    where
        F: FnOnce(&RenderError) -> C + Send + 'static,
        C: Into<Content>,
    {
        self.on_error = Some(OnError::Handler(Box::new(move |error| handler(error).into())));
        self
    }
}

impl Registry {
    /// Render a deferred block.
    ///
    /// Returns the children as is when they resolve synchronously; nothing
    /// gets registered in that case, and empty children render as an empty
    /// string.  Otherwise returns the placeholder wrapping the fallback,
    /// pending if the fallback itself is.  A failing fallback fails
    /// whatever contains it, ultimately the root render.
    ///
    /// # Errors
    ///
    /// With pending children, [`RenderError::MissingRequestId`] when no
    /// request id was set, [`RenderError::MissingRequestRecord`] when the
    /// request is not being streamed by this registry and
    /// [`RenderError::MissingRuntime`] outside of a tokio runtime.
    pub fn suspense(&self, props: SuspenseProps) -> RenderResult<Rendered> {
        self.defer(props, None)
    }

    /// [`suspense`](Self::suspense), restricted to one generation of the
    /// request record when `generation` is given.
    pub(crate) fn defer(
        &self,
        props: SuspenseProps,
        generation: Option<u64>,
    ) -> RenderResult<Rendered> {
        let SuspenseProps {
            request_id,
            fallback,
            children,
            on_error,
        } = props;

        let children = match resolve_one(children) {
            Rendered::Ready(html) => return Ok(Rendered::Ready(html)),
            Rendered::Pending(children) => children,
        };

        let id = request_id.ok_or(RenderError::MissingRequestId)?;
        let runtime = Handle::try_current().map_err(|_| RenderError::MissingRuntime)?;
        let Slot { key, run, shell } = self.register(&id, generation)?;
        let settlement = Settlement::block(self, &key, run);

        runtime.spawn(async move {
            let outcome = AssertUnwindSafe(async move {
                match children.await {
                    Ok(html) => Ok(html),
                    Err(error) => recover(error, on_error).await,
                }
            })
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(RenderError::Task(format!("deferred block {run} panicked"))));

            shell.wait().await;
            settlement.complete(outcome);
        });

        Ok(resolve_one(fallback).map(move |html| script::placeholder(run, &html)))
    }
}

async fn recover(error: RenderError, on_error: Option<OnError>) -> RenderResult<String> {
    let Some(on_error) = on_error else {
        return Err(error);
    };
    tracing::debug!(%error, "deferred block failed, rendering its error content");
    resolve_one(on_error.into_content(&error))
        .into_pending()
        .await
}

/// Render a deferred block against the process-wide registry.
///
/// # Errors
///
/// See [`Registry::suspense`].
#[cfg(feature = "global")]
pub fn suspense(props: SuspenseProps) -> RenderResult<Rendered> {
    Registry::global().suspense(props)
}
