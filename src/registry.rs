//! Bookkeeping for in-flight streaming renders.
//!
//! A [`Registry`] maps request ids to request records.  A record is
//! created when a streaming render starts and holds the writer of its
//! output, the number of deferred blocks still running, the last run id
//! handed out and whether the patch script went out already.  The record
//! is deleted, closing the output, once the root has been written and the
//! last deferred block has settled, whichever of the two comes last.
//!
//! Every operation looks the record up under the lock, so a continuation
//! never acts on a record that a sibling already closed.  Records are also
//! stamped with a generation: an explicit id may be reused as soon as its
//! record is gone, and work left over from the earlier request must not
//! find its way into the later one.  The lock is only ever held for short
//! synchronous sections.

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;

use crate::{
    config::SuspenseConfig,
    error::{RenderError, RenderResult},
    gate::{ShellGate, ShellSubscription},
    request::RequestId,
    script,
    sink::{self, HtmlStream, SinkWriter},
};

/// Keyed store of request records.
///
/// Cloning is cheap and yields a handle to the same store.  Tests and
/// applications that want isolation simply create their own; everything
/// else may share [`Registry::global`].
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    config: SuspenseConfig,
    state: Mutex<RegistryState>,
}

struct RegistryState {
    requests: HashMap<RequestId, RequestRecord>,
    counter: u64,
    generation: u64,
}

struct RequestRecord {
    generation: u64,
    sink: SinkWriter,
    shell: ShellGate,
    running: usize,
    last_run: u64,
    script_sent: bool,
    root_done: bool,
}

/// Names one particular request record, not just whichever record holds
/// the id right now.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RecordKey {
    pub(crate) id: RequestId,
    pub(crate) generation: u64,
}

/// A registered deferred block.
#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) key: RecordKey,
    pub(crate) run: u64,
    pub(crate) shell: ShellSubscription,
}

/// An outstanding obligation to report back to a request record, either
/// for its root or for one of its deferred blocks.
///
/// Dropping it unfulfilled, e.g. because the task carrying it was
/// cancelled or the factory panicked, reports a failure instead, so the
/// record can never be left waiting forever.
#[derive(Debug)]
pub(crate) struct Settlement {
    registry: Registry,
    key: RecordKey,
    target: Target,
    armed: bool,
}

#[derive(Clone, Copy, Debug)]
enum Target {
    Root,
    Block(u64),
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(SuspenseConfig::default())
    }

    pub fn with_config(config: SuspenseConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                state: Mutex::new(RegistryState {
                    requests: HashMap::new(),
                    counter: 1,
                    generation: 0,
                }),
            }),
        }
    }

    /// The process-wide registry used by the free functions of this crate.
    #[cfg(feature = "global")]
    pub fn global() -> &'static Registry {
        static GLOBAL: std::sync::OnceLock<Registry> = std::sync::OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    pub fn config(&self) -> &SuspenseConfig {
        &self.inner.config
    }

    /// Number of requests currently streaming.
    pub fn len(&self) -> usize {
        self.inner.state.lock().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().requests.is_empty()
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.inner.state.lock().requests.contains_key(id)
    }

    /// Number of deferred blocks of `id` that have not settled yet.
    pub fn running(&self, id: &RequestId) -> Option<usize> {
        self.inner
            .state
            .lock()
            .requests
            .get(id)
            .map(|record| record.running)
    }

    /// Create the record for a new request, allocating an id if none was
    /// given.
    pub(crate) fn open(&self, id: Option<RequestId>) -> RenderResult<(RecordKey, HtmlStream)> {
        let mut state = self.inner.state.lock();
        let id = match id {
            Some(id) if state.requests.contains_key(&id) => {
                return Err(RenderError::DuplicateRequestId(id));
            }
            Some(id) => id,
            None => state.next_id(),
        };

        state.generation += 1;
        let key = RecordKey {
            id,
            generation: state.generation,
        };
        let (sink, stream) = sink::channel(key.id.clone());
        state.requests.insert(
            key.id.clone(),
            RequestRecord {
                generation: key.generation,
                sink,
                shell: ShellGate::new(),
                running: 0,
                last_run: 0,
                script_sent: false,
                root_done: false,
            },
        );
        tracing::debug!(request = %key.id, generation = key.generation, "request opened");
        Ok((key, stream))
    }

    /// Whether the record named by `key` is still streaming.
    pub(crate) fn holds(&self, key: &RecordKey) -> bool {
        self.inner.state.lock().record_mut(key).is_some()
    }

    /// Drop the record named by `key` without writing anything further.
    pub(crate) fn discard(&self, key: &RecordKey) {
        let mut state = self.inner.state.lock();
        if state.record_mut(key).is_some() {
            state.close(&key.id);
            tracing::debug!(request = %key.id, "request discarded");
        }
    }

    /// Count a new deferred block against `id`.  With a `generation`, only
    /// that particular record of `id` will do.
    pub(crate) fn register(&self, id: &RequestId, generation: Option<u64>) -> RenderResult<Slot> {
        let mut state = self.inner.state.lock();
        let record = state
            .requests
            .get_mut(id)
            .filter(|record| generation.map_or(true, |g| g == record.generation))
            .ok_or_else(|| RenderError::MissingRequestRecord(id.clone()))?;
        record.running += 1;
        record.last_run += 1;
        tracing::trace!(request = %id, run = record.last_run, running = record.running, "deferred block registered");
        Ok(Slot {
            key: RecordKey {
                id: id.clone(),
                generation: record.generation,
            },
            run: record.last_run,
            shell: record.shell.subscribe(),
        })
    }

    /// Write the outcome of the root render.
    ///
    /// A successful root opens the shell gate and closes the request right
    /// away when nothing was deferred.  A failed root tears the request
    /// down; deferred blocks still running will find it gone.
    pub(crate) fn complete_root(&self, key: &RecordKey, outcome: RenderResult<String>) {
        let id = &key.id;
        let mut state = self.inner.state.lock();
        let Some(record) = state.record_mut(key) else {
            tracing::debug!(request = %id, "root completed after the request was closed");
            return;
        };

        match outcome {
            Ok(html) => {
                record.sink.write(html);
                record.root_done = true;
                record.shell.open();
                if record.running == 0 {
                    state.close(id);
                }
            }
            Err(error) => {
                tracing::debug!(request = %id, %error, "root render failed");
                record.sink.fail(error);
                state.close(id);
            }
        }
    }

    /// Write the outcome of deferred block `run` and release its slot.
    ///
    /// Whichever call brings the running count back to zero after the root
    /// was written closes the request.
    pub(crate) fn settle(&self, key: &RecordKey, run: u64, outcome: RenderResult<String>) {
        let id = &key.id;
        let auto_script = self.inner.config.auto_script;
        let mut state = self.inner.state.lock();
        let Some(record) = state.record_mut(key) else {
            tracing::debug!(request = %id, run, "deferred block settled after the request was closed");
            return;
        };

        match outcome {
            Ok(html) if record.sink.is_open() => {
                let mut chunk = String::new();
                if !record.script_sent {
                    if auto_script {
                        chunk.push_str(script::SUSPENSE_SCRIPT);
                    }
                    record.script_sent = true;
                }
                chunk.push_str(&script::patch(run, &html));
                record.sink.write(chunk);
                tracing::trace!(request = %id, run, "patch written");
            }
            Ok(_) => {
                tracing::debug!(request = %id, run, "stream no longer consumed, patch dropped");
            }
            Err(error) => {
                tracing::debug!(request = %id, run, %error, "deferred block failed");
                record.sink.fail(error);
            }
        }

        record.running = record.running.saturating_sub(1);
        if record.running == 0 && record.root_done {
            state.close(id);
        }
    }

    #[cfg(test)]
    pub(crate) fn set_counter(&self, counter: u64) {
        self.inner.state.lock().counter = counter;
    }

    #[cfg(test)]
    pub(crate) fn script_sent(&self, id: &RequestId) -> Option<bool> {
        self.inner
            .state
            .lock()
            .requests
            .get(id)
            .map(|record| record.script_sent)
    }
}

impl Settlement {
    pub(crate) fn root(registry: &Registry, key: &RecordKey) -> Self {
        Self::new(registry, key, Target::Root)
    }

    pub(crate) fn block(registry: &Registry, key: &RecordKey, run: u64) -> Self {
        Self::new(registry, key, Target::Block(run))
    }

    fn new(registry: &Registry, key: &RecordKey, target: Target) -> Self {
        Self {
            registry: registry.clone(),
            key: key.clone(),
            target,
            armed: true,
        }
    }

    pub(crate) fn complete(mut self, outcome: RenderResult<String>) {
        self.armed = false;
        self.report(outcome);
    }

    /// Remove the request without reporting anything to its stream.
    pub(crate) fn discard(mut self) {
        self.armed = false;
        self.registry.discard(&self.key);
    }

    fn report(&self, outcome: RenderResult<String>) {
        match self.target {
            Target::Root => self.registry.complete_root(&self.key, outcome),
            Target::Block(run) => self.registry.settle(&self.key, run, outcome),
        }
    }
}

impl Drop for Settlement {
    fn drop(&mut self) {
        if self.armed {
            let reason = match self.target {
                Target::Root => "root render was abandoned".to_string(),
                Target::Block(run) => format!("deferred block {run} was abandoned"),
            };
            tracing::warn!(request = %self.key.id, "{reason}");
            self.report(Err(RenderError::Task(reason)));
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryState {
    /// Auto ids wrap around before the counter overflows and skip ids still
    /// in use, which an explicit numeric id may have claimed.
    fn next_id(&mut self) -> RequestId {
        loop {
            let id = RequestId::Number(self.counter);
            self.counter = match self.counter {
                u64::MAX => 1,
                n => n + 1,
            };
            if !self.requests.contains_key(&id) {
                return id;
            }
        }
    }

    /// The record of `key.id`, provided it is still the one `key` names.
    fn record_mut(&mut self, key: &RecordKey) -> Option<&mut RequestRecord> {
        self.requests
            .get_mut(&key.id)
            .filter(|record| record.generation == key.generation)
    }

    fn close(&mut self, id: &RequestId) {
        if let Some(mut record) = self.requests.remove(id) {
            record.sink.close();
            tracing::debug!(request = %id, runs = record.last_run, "request closed");
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Registry")
            .field("config", &self.inner.config)
            .field("requests", &state.requests.len())
            .field("counter", &state.counter)
            .field("generation", &state.generation)
            .finish()
    }
}

impl fmt::Debug for RequestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRecord")
            .field("generation", &self.generation)
            .field("running", &self.running)
            .field("last_run", &self.last_run)
            .field("script_sent", &self.script_sent)
            .field("root_done", &self.root_done)
            .field("shell", &self.shell)
            .field("open", &self.sink.is_open())
            .finish()
    }
}
