//! This crate renders HTML on the server with out-of-order streaming.  A
//! page is written out as soon as its synchronous part, the shell, is
//! known, while slower parts of the page are rendered as deferred blocks:
//! they show a fallback first and are patched into the already flushed
//! document later, once their content is ready, by a small script sent
//! along in the same response.
//!
//! ## How it works
//!
//! A streaming render is started with [`Registry::render_to_stream`],
//! which creates a request record for the render and hands the factory
//! building the page a [`Request`].  Whenever the page contains content
//! that cannot be rendered synchronously, wrapping it with
//! [`Request::suspense`] turns it into a deferred block: the block writes
//! its fallback into the shell, wrapped in a placeholder with a unique
//! run id, and detaches a task that waits for the real content.
//!
//! Once the shell has been written, every deferred block that settles
//! writes a patch chunk of the form
//!
//! ```html
//! <template id="N:1" data-sr>...</template><script id="S:1" data-ss>$RC(1)</script>
//! ```
//!
//! to the stream, preceded exactly once per request by the
//! [`SUSPENSE_SCRIPT`](script::SUSPENSE_SCRIPT) defining `$RC`.  Patches
//! are written in the order the blocks settle, not the order they appear
//! in, and the script copes with that.  When the last block of a request
//! settles the stream ends and the request record is removed.
//!
//! Failing children surface as an error item on the stream unless the
//! block was given an [`on_error`](SuspenseProps::on_error) handler, in
//! which case its output is patched in instead.  Sibling blocks are not
//! affected either way.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use futures::StreamExt;
//! use ssr_suspense::{Content, Registry, SuspenseProps};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ssr_suspense::RenderResult<()> {
//! // Usually a single registry is shared by the whole application, see
//! // `Registry::global`.
//! let registry = Registry::new();
//!
//! let mut stream = registry.render_to_stream(
//!     |request| {
//!         let comments = Content::pending(async {
//!             // e.g. a database query
//!             tokio::time::sleep(Duration::from_millis(10)).await;
//!             Ok(Content::text("Great post & thanks!"))
//!         });
//!         Ok(vec![
//!             Content::from("<article>Hello</article><section>"),
//!             request
//!                 .suspense(SuspenseProps::new("Loading comments...", comments))?
//!                 .into(),
//!             Content::from("</section>"),
//!         ])
//!     },
//!     None,
//! )?;
//!
//! // The shell comes first...
//! assert_eq!(
//!     stream.next().await.transpose()?.as_deref(),
//!     Some(r#"<article>Hello</article><section><div id="B:1" data-sf>Loading comments...</div></section>"#),
//! );
//! // ...followed by the patch for the comments.
//! let patch = stream.next().await.transpose()?.unwrap_or_default();
//! assert!(patch.ends_with(
//!     r#"<template id="N:1" data-sr>Great post &amp; thanks!</template><script id="S:1" data-ss>$RC(1)</script>"#
//! ));
//! assert!(stream.next().await.is_none());
//! # Ok(())
//! # }
//! ```
//!
//! # Feature Flags
#![cfg_attr(
    feature = "document-features",
    cfg_attr(doc, doc = ::document_features::document_features!())
)]

mod boundary;
mod config;
pub mod content;
mod error;
mod gate;
mod registry;
mod request;
pub mod script;
mod sink;
mod stream;
mod suspense;


pub use boundary::ErrorBoundary;
pub use config::SuspenseConfig;
pub use content::{escape, Content, Rendered};
pub use error::{RenderError, RenderResult};
pub use registry::Registry;
pub use request::{Request, RequestId};
pub use sink::HtmlStream;
pub use suspense::{OnError, SuspenseProps};

#[cfg(feature = "global")]
pub use stream::{render_to_stream, render_to_string};
#[cfg(feature = "global")]
pub use suspense::suspense;
