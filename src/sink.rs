//! The output channel of a streaming render.
//!
//! The producing half, [`SinkWriter`], lives inside the request record and
//! is only ever written to while the registry lock is held.  The consuming
//! half, [`HtmlStream`], is what callers of
//! [`render_to_stream`](crate::Registry::render_to_stream) receive.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::{
    error::{RenderError, RenderResult},
    request::RequestId,
};

type Chunk = RenderResult<String>;

pub(crate) fn channel(id: RequestId) -> (SinkWriter, HtmlStream) {
    let (sender, receiver) = unbounded_channel();
    (
        SinkWriter {
            sender: Some(sender),
        },
        HtmlStream { id, receiver },
    )
}

/// Append-only, closable writer.  Writes after close are dropped.
#[derive(Debug)]
pub(crate) struct SinkWriter {
    sender: Option<UnboundedSender<Chunk>>,
}

impl SinkWriter {
    /// Whether anything written now could still be observed.
    pub(crate) fn is_open(&self) -> bool {
        self.sender
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }

    pub(crate) fn write(&self, chunk: String) -> bool {
        match &self.sender {
            Some(sender) => sender.send(Ok(chunk)).is_ok(),
            None => false,
        }
    }

    /// Surface an error on the stream.  Returns false when nobody is
    /// listening anymore, in which case the error is only logged.
    pub(crate) fn fail(&self, error: RenderError) -> bool {
        match &self.sender {
            Some(sender) => match sender.send(Err(error)) {
                Ok(()) => true,
                Err(unsent) => {
                    if let Err(error) = unsent.0 {
                        tracing::error!(%error, "render error with no stream left to report to");
                    }
                    false
                }
            },
            None => {
                tracing::error!(%error, "render error after the stream was closed");
                false
            }
        }
    }

    /// Ends the stream.  Closing more than once is a no-op.
    pub(crate) fn close(&mut self) {
        self.sender.take();
    }
}

/// A stream of HTML chunks for one request.
///
/// The first chunk is always the synchronous shell; every later chunk is a
/// self-contained patch for a deferred block.  Errors are yielded in band
/// and do not end the stream by themselves, so sibling blocks that settle
/// afterwards are still delivered.
#[derive(Debug)]
pub struct HtmlStream {
    id: RequestId,
    receiver: UnboundedReceiver<Chunk>,
}

impl HtmlStream {
    pub fn request_id(&self) -> &RequestId {
        &self.id
    }

    /// Drain the whole stream into a single string.
    ///
    /// Fails with the first error seen, discarding whatever remains.
    pub async fn into_string(mut self) -> RenderResult<String> {
        let mut html = String::new();
        while let Some(chunk) = self.next().await {
            html.push_str(&chunk?);
        }
        Ok(html)
    }
}

impl Stream for HtmlStream {
    type Item = Chunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_close() -> anyhow::Result<()> {
        let (mut writer, stream) = channel(RequestId::from(1));
        assert!(writer.is_open());
        assert!(writer.write("a".into()));
        assert!(writer.write("b".into()));
        writer.close();
        writer.close();
        assert!(!writer.is_open());
        assert!(!writer.write("dropped".into()));

        assert_eq!(stream.into_string().await?, "ab");
        Ok(())
    }

    #[tokio::test]
    async fn errors_are_in_band() {
        let (mut writer, stream) = channel(RequestId::from("errors"));
        writer.write("a".into());
        assert!(writer.fail(RenderError::msg("boom")));
        writer.write("b".into());
        writer.close();

        let chunks = stream.collect::<Vec<_>>().await;
        assert_eq!(chunks.len(), 3);
        assert!(matches!(&chunks[1], Err(RenderError::Component(m)) if m == "boom"));
        assert!(matches!(&chunks[2], Ok(b) if b == "b"));
    }

    #[test]
    fn dropped_stream_closes_writer() {
        let (writer, stream) = channel(RequestId::from(2));
        drop(stream);
        assert!(!writer.is_open());
        assert!(!writer.write("lost".into()));
        assert!(!writer.fail(RenderError::msg("lost")));
    }
}
