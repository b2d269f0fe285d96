//! Dispatch loop: dedup keys from an input stream and run at most
//! `max_concurrency` processor calls at once.

use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::model::DispatchKey;
use crate::telemetry::job::{record_job_finished, start_job_span};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{Instrument, Span, debug, info, warn};
use uuid::Uuid;

use super::state::{QueueSnapshot, QueueState, Slot};

type SharedState<K> = Arc<Mutex<QueueState<K>>>;

fn lock<K>(state: &SharedState<K>) -> MutexGuard<'_, QueueState<K>> {
    // Only a fatal invariant panic can poison the lock.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A deduplicating, bounded-concurrency dispatcher.
///
/// Keys arrive on `input`. A key that is already queued or running is
/// dropped silently; anything else is queued in arrival order and handed to
/// `processor` on its own task once a slot is free. [`DispatchQueue::run`]
/// returns after `input` closes and every queued and running job finished.
pub struct DispatchQueue<K, P> {
    state: SharedState<K>,
    input: mpsc::Receiver<K>,
    processor: Arc<P>,
    done_tx: mpsc::UnboundedSender<K>,
    done_rx: mpsc::UnboundedReceiver<K>,
}

impl<K, P, Fut> DispatchQueue<K, P>
where
    K: DispatchKey,
    P: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    /// Create a queue reading from `input`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `max_concurrency` is zero.
    pub fn new(max_concurrency: usize, input: mpsc::Receiver<K>, processor: P) -> Result<Self> {
        if max_concurrency == 0 {
            return Err(Error::Config("max_concurrency must be at least 1".to_string()));
        }
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Ok(Self {
            state: Arc::new(Mutex::new(QueueState::new(max_concurrency))),
            input,
            processor: Arc::new(processor),
            done_tx,
            done_rx,
        })
    }

    pub fn from_config(config: &QueueConfig, input: mpsc::Receiver<K>, processor: P) -> Result<Self> {
        config.validate()?;
        Self::new(config.max_concurrency, input, processor)
    }

    /// A read-only handle onto this queue's state, usable while `run` is going.
    pub fn monitor(&self) -> QueueMonitor<K> {
        QueueMonitor {
            state: Arc::clone(&self.state),
        }
    }

    /// Process keys until the input closes and all work has drained.
    pub async fn run(mut self) {
        let max_concurrency = lock(&self.state).snapshot().max_concurrency;
        info!(max_concurrency, "dispatch queue started");

        let mut input_open = true;
        loop {
            if !input_open {
                self.admit();
                if lock(&self.state).is_drained() {
                    break;
                }
            }

            tokio::select! {
                arrival = self.input.recv(), if input_open => match arrival {
                    Some(key) => self.accept(key),
                    None => {
                        let snap = lock(&self.state).snapshot();
                        info!(pending = snap.pending, active = snap.active, "input closed, draining");
                        input_open = false;
                    }
                },
                Some(key) = self.done_rx.recv() => self.acknowledge(key),
            }
        }

        let snap = lock(&self.state).snapshot();
        info!(
            received = snap.counters.received,
            dispatched = snap.counters.dispatched,
            merged = snap.counters.merged,
            rejected = snap.counters.rejected,
            "dispatch queue drained"
        );
    }

    fn accept(&self, key: K) {
        if !key.is_valid() {
            warn!(key = ?key, "received invalid key, ignoring (fix the upstream producer)");
            lock(&self.state).reject();
            record_arrival("rejected");
            return;
        }

        let (queued, admitted) = {
            let mut state = lock(&self.state);
            let queued = state.push(key.clone());
            (queued, state.next_admission())
        };

        if queued {
            debug!(key = ?key, "queued");
            record_arrival("queued");
        } else {
            debug!(key = ?key, "already in flight, merged");
            record_arrival("merged");
        }
        if let Some(next) = admitted {
            self.spawn_job(next);
        }
    }

    fn acknowledge(&self, key: K) {
        let admitted = {
            let mut state = lock(&self.state);
            state.complete(&key);
            state.next_admission()
        };
        metrics::jobs_completed().add(1, &[]);
        debug!(key = ?key, "job acknowledged");

        if let Some(next) = admitted {
            self.spawn_job(next);
        }
    }

    fn admit(&self) {
        let admitted = lock(&self.state).next_admission();
        if let Some(next) = admitted {
            self.spawn_job(next);
        }
    }

    fn spawn_job(&self, key: K) {
        let job_id = Uuid::new_v4();
        let span = start_job_span(&key, &job_id);
        let processor = Arc::clone(&self.processor);
        let completion = Completion {
            key: Some(key.clone()),
            done: self.done_tx.clone(),
            span: span.clone(),
            started: Instant::now(),
            finished: false,
        };

        metrics::jobs_dispatched().add(1, &[]);
        debug!(key = ?key, %job_id, "dispatching");

        tokio::spawn(
            async move {
                (*processor)(key).await;
                completion.succeed();
            }
            .instrument(span),
        );
    }
}

fn record_arrival(result: &'static str) {
    metrics::keys_received().add(1, &[KeyValue::new("result", result)]);
}

/// Reports a job back to the coordinator when the job's future is dropped,
/// whether the processor returned or panicked.
struct Completion<K> {
    key: Option<K>,
    done: mpsc::UnboundedSender<K>,
    span: Span,
    started: Instant,
    finished: bool,
}

impl<K> Completion<K> {
    fn succeed(mut self) {
        self.finished = true;
    }
}

impl<K> Drop for Completion<K> {
    fn drop(&mut self) {
        let duration_ms = self.started.elapsed().as_millis() as u64;
        record_job_finished(&self.span, duration_ms, !self.finished);
        metrics::job_duration_ms().record(duration_ms as f64, &[]);

        if let Some(key) = self.key.take() {
            // Send fails only if the queue itself is gone.
            let _ = self.done.send(key);
        }
    }
}

/// Read-only view of a running [`DispatchQueue`].
pub struct QueueMonitor<K> {
    state: SharedState<K>,
}

impl<K> Clone for QueueMonitor<K> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<K: DispatchKey> QueueMonitor<K> {
    pub fn snapshot(&self) -> QueueSnapshot {
        lock(&self.state).snapshot()
    }

    /// Whether `key` is queued or running, and which.
    pub fn slot(&self, key: &K) -> Option<Slot> {
        lock(&self.state).slot(key)
    }
}
