use tokio::sync::watch::{channel, Receiver, Sender};

/// Signals that the synchronous shell of a request has been written.
///
/// Each request record owns one of these.  Deferred blocks take a
/// [`ShellSubscription`] when they register and wait on it before
/// touching the output, so that no patch can overtake the shell even
/// when the continuation is scheduled on another worker thread before the
/// root render has returned.
///
/// Dropping the gate (which happens when the record is torn down) also
/// releases every waiter; they will then find the record gone and do
/// nothing.
pub(crate) struct ShellGate {
    sender: Sender<bool>,
}

/// A pending wait on a [`ShellGate`].
pub(crate) struct ShellSubscription {
    receiver: Receiver<bool>,
}

impl ShellGate {
    pub(crate) fn new() -> Self {
        let (sender, _) = channel(false);
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> ShellSubscription {
        ShellSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub(crate) fn open(&self) {
        self.sender.send_replace(true);
    }

    pub(crate) fn is_open(&self) -> bool {
        *self.sender.borrow()
    }
}

impl ShellSubscription {
    /// Returns once the shell was written or the gate was dropped.
    pub(crate) async fn wait(mut self) {
        if self.receiver.wait_for(|open| *open).await.is_err() {
            tracing::trace!("shell gate dropped before opening");
        }
    }
}

mod debug {
    use super::*;
    use std::fmt;

    impl fmt::Debug for ShellGate {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("ShellGate")
                .field("open", &self.is_open())
                .field("waiting", &self.sender.receiver_count())
                .finish()
        }
    }

    impl fmt::Debug for ShellSubscription {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("ShellSubscription")
                .field("open", &*self.receiver.borrow())
                .finish()
        }
    }
}
