//! The buffering engine.
//!
//! A [`BufferingHandler`] owns a bounded buffer and one background monitor
//! task. Producers append entries without ever blocking; the monitor wakes
//! once per second, asks the [`TriggerPolicy`] whether a flush is due, and if
//! so swaps the buffer out and hands the batch to the [`Sink`]. A failed send
//! puts the batch back in front of the buffer and waits for the next trigger.
//!
//! Shutdown is cooperative: it raises a `stopping` flag and waits until the
//! monitor has drained the buffer. With a sink that never recovers and no
//! shutdown timeout configured, that wait does not end.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::buffer::BoundedBuffer;
use crate::entry::{LogBatch, LogEntry};
use crate::policy::{FlushReason, TriggerPolicy};
use crate::sink::Sink;

/// How often the monitor evaluates the trigger policy.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Settings for one buffering engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerConfig {
    /// Maximum time between flushes
    pub flush_interval: Duration,

    /// Buffered entries that trigger a flush
    pub flush_capacity: usize,

    /// Entries held before the oldest is evicted
    pub max_buffer_entries: usize,

    /// Stop waiting for the drain after this long. `None` waits forever.
    pub shutdown_timeout: Option<Duration>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(10),
            flush_capacity: 10,
            max_buffer_entries: 100,
            shutdown_timeout: None,
        }
    }
}

impl HandlerConfig {
    pub fn new(flush_capacity: usize, flush_interval: Duration, max_buffer_entries: usize) -> Self {
        Self {
            flush_interval,
            flush_capacity,
            max_buffer_entries,
            shutdown_timeout: None,
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }
}

/// Lifecycle of the monitor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MonitorState {
    /// Flushing on size or interval triggers
    Running = 0,

    /// Shutdown requested; flushing every poll until the buffer is empty
    Draining = 1,

    /// The monitor task has exited
    Stopped = 2,
}

impl MonitorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => MonitorState::Running,
            1 => MonitorState::Draining,
            _ => MonitorState::Stopped,
        }
    }
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorState::Running => write!(f, "running"),
            MonitorState::Draining => write!(f, "draining"),
            MonitorState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Errors reported by [`BufferingHandler::shutdown`].
#[derive(Debug)]
pub enum HandlerError {
    /// The drain did not finish within the configured shutdown timeout
    ShutdownTimedOut {
        limit: Duration,
        /// Entries still buffered or mid-send when shutdown gave up
        abandoned: usize,
    },

    /// The monitor task panicked
    WorkerPanicked(String),
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::ShutdownTimedOut { limit, abandoned } => write!(
                f,
                "Shutdown timed out after {:?} with {} entries undelivered",
                limit, abandoned
            ),
            HandlerError::WorkerPanicked(e) => write!(f, "Buffer monitor panicked: {}", e),
        }
    }
}

impl std::error::Error for HandlerError {}

/// Counters maintained by the flush operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FlushStats {
    batches_sent: u64,
    entries_sent: u64,
    failed_sends: u64,
    size_flushes: u64,
    time_flushes: u64,
    shutdown_flushes: u64,
}

/// Snapshot of engine activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerStats {
    /// Total number of entries appended
    pub entries_received: u64,

    /// Entries dropped because the buffer was full
    pub entries_evicted: u64,

    /// Entries put back after failed sends (counted once per failure)
    pub entries_requeued: u64,

    /// Batches the sink accepted
    pub batches_sent: u64,

    /// Entries the sink accepted
    pub entries_sent: u64,

    /// Send attempts the sink rejected
    pub failed_sends: u64,

    /// Non-empty flush attempts triggered by the size threshold
    pub size_flushes: u64,

    /// Non-empty flush attempts triggered by the interval
    pub time_flushes: u64,

    /// Non-empty flush attempts made while draining
    pub shutdown_flushes: u64,

    /// Entries currently waiting in the buffer
    pub buffered: usize,
}

/// State shared between producers, the handler and the monitor task.
struct Shared {
    buffer: BoundedBuffer,
    stopping: AtomicBool,
    state: AtomicU8,
    wake: Notify,
    flush_stats: RwLock<FlushStats>,
    /// Entries swapped out of the buffer and handed to the sink
    in_flight: AtomicUsize,
}

impl Shared {
    fn new(max_buffer_entries: usize) -> Self {
        Self {
            buffer: BoundedBuffer::new(max_buffer_entries),
            stopping: AtomicBool::new(false),
            state: AtomicU8::new(MonitorState::Running as u8),
            wake: Notify::new(),
            flush_stats: RwLock::new(FlushStats::default()),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Entries not yet delivered: buffered plus any batch mid-send.
    fn undelivered(&self) -> usize {
        self.buffer.len() + self.in_flight.load(Ordering::Acquire)
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    fn request_stop(&self) {
        self.stopping.store(true, Ordering::Release);
        // Stores a permit if the monitor is mid-flush, so the request is not missed
        self.wake.notify_one();
    }

    fn state(&self) -> MonitorState {
        MonitorState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: MonitorState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn record(&self, update: impl FnOnce(&mut FlushStats)) {
        let mut stats = self.flush_stats.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut stats);
    }

    fn stats(&self) -> HandlerStats {
        let buffer = self.buffer.stats();
        let flush = *self.flush_stats.read().unwrap_or_else(PoisonError::into_inner);

        HandlerStats {
            entries_received: buffer.entries_received,
            entries_evicted: buffer.entries_evicted,
            entries_requeued: buffer.entries_requeued,
            batches_sent: flush.batches_sent,
            entries_sent: flush.entries_sent,
            failed_sends: flush.failed_sends,
            size_flushes: flush.size_flushes,
            time_flushes: flush.time_flushes,
            shutdown_flushes: flush.shutdown_flushes,
            buffered: self.buffer.len(),
        }
    }
}

/// Cloneable append-only handle for producers.
///
/// Appending never blocks on the sink and never fails. Entries appended after
/// the monitor has stopped are kept but will not be delivered.
#[derive(Clone)]
pub struct EntryProducer {
    shared: Arc<Shared>,
}

impl EntryProducer {
    pub fn append(&self, entry: LogEntry) {
        self.shared.buffer.append(entry);
    }

    pub fn len(&self) -> usize {
        self.shared.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.buffer.is_empty()
    }
}

/// Background worker: polls the trigger policy and runs flushes.
struct Monitor<S> {
    shared: Arc<Shared>,
    sink: S,
    policy: TriggerPolicy,
    /// Only the monitor reads or writes this
    last_flush: Instant,
}

impl<S: Sink> Monitor<S> {
    fn new(shared: Arc<Shared>, sink: S, policy: TriggerPolicy) -> Self {
        Self {
            shared,
            sink,
            policy,
            last_flush: Instant::now(),
        }
    }

    async fn run(mut self) {
        info!(
            flush_capacity = self.policy.flush_capacity,
            flush_interval_secs = self.policy.flush_interval.as_secs(),
            max_buffer_entries = self.shared.buffer.max_entries(),
            "Buffer monitor started"
        );
        if self.shared.buffer.max_entries() < self.policy.flush_capacity {
            warn!(
                flush_capacity = self.policy.flush_capacity,
                max_buffer_entries = self.shared.buffer.max_entries(),
                "Buffer can never reach the flush capacity, flushing on interval only"
            );
        }

        loop {
            if self.shared.is_stopping() {
                if self.shared.buffer.is_empty() {
                    break;
                }
                if self.shared.state() == MonitorState::Running {
                    self.shared.set_state(MonitorState::Draining);
                    info!(
                        buffered = self.shared.buffer.len(),
                        "Draining buffer before shutdown"
                    );
                }
            }

            self.tick().await;

            if self.shared.is_stopping() && self.shared.buffer.is_empty() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = self.shared.wake.notified() => {}
            }
        }

        self.shared.set_state(MonitorState::Stopped);
        info!("Buffer monitor stopped");
    }

    /// Evaluate the policy once and flush if it says so.
    async fn tick(&mut self) -> Option<FlushReason> {
        let reason = self.policy.evaluate(
            self.shared.is_stopping(),
            self.shared.buffer.len(),
            self.last_flush.elapsed(),
        )?;
        self.flush(reason).await;
        Some(reason)
    }

    /// Swap the buffer out, send it, and requeue it if the sink fails.
    ///
    /// The interval restarts after every attempt, successful or not, so a
    /// failing sink is retried at the normal cadence instead of in a loop.
    async fn flush(&mut self, reason: FlushReason) {
        let entries = self.shared.buffer.swap_out();
        if entries.is_empty() {
            self.last_flush = Instant::now();
            return;
        }

        let batch = LogBatch::new(entries);
        let batch_size = batch.len();

        self.shared.record(|stats| match reason {
            FlushReason::Size => stats.size_flushes += 1,
            FlushReason::Interval => stats.time_flushes += 1,
            FlushReason::Shutdown => stats.shutdown_flushes += 1,
        });

        self.shared.in_flight.store(batch_size, Ordering::Release);
        let result = self.sink.send(&batch).await;

        match result {
            Ok(()) => {
                self.shared.in_flight.store(0, Ordering::Release);
                debug!(
                    batch_size = batch_size,
                    batch_id = %batch.batch_id,
                    reason = %reason,
                    "Flushed batch"
                );
                self.shared.record(|stats| {
                    stats.batches_sent += 1;
                    stats.entries_sent += batch_size as u64;
                });
            }
            Err(e) => {
                warn!(
                    error = %e,
                    batch_size = batch_size,
                    reason = %reason,
                    "Failed to send batch, requeueing"
                );
                self.shared.buffer.requeue(batch.into_entries());
                self.shared.in_flight.store(0, Ordering::Release);
                self.shared.record(|stats| stats.failed_sends += 1);
            }
        }

        self.last_flush = Instant::now();
    }
}

/// Buffered log sink engine.
///
/// The monitor task starts as soon as the handler is constructed, so `new`
/// must be called from within a Tokio runtime.
///
/// # Example
///
/// ```no_run
/// use buffered_sink::entry::{LogEntry, LogLevel};
/// use buffered_sink::handler::{BufferingHandler, HandlerConfig};
/// use buffered_sink::sink::ConsoleSink;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let config = HandlerConfig::new(5, Duration::from_secs(5), 100);
///     let handler = BufferingHandler::new(config, ConsoleSink::new());
///
///     handler.append(LogEntry::new("app", LogLevel::Info, "Hello log World"));
///
///     // Waits until every buffered entry has been sent
///     handler.shutdown().await.expect("drain failed");
/// }
/// ```
pub struct BufferingHandler {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    shutdown_timeout: Option<Duration>,
}

impl BufferingHandler {
    /// Create the engine and start its monitor task.
    pub fn new<S: Sink>(config: HandlerConfig, sink: S) -> Self {
        let shared = Arc::new(Shared::new(config.max_buffer_entries));
        let policy = TriggerPolicy::new(config.flush_capacity, config.flush_interval);
        let monitor = Monitor::new(shared.clone(), sink, policy);
        let worker = tokio::spawn(monitor.run());

        Self {
            shared,
            worker: Some(worker),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Buffer an entry. Never blocks and never fails; may evict the oldest entry.
    pub fn append(&self, entry: LogEntry) {
        self.shared.buffer.append(entry);
    }

    /// A handle producers can clone freely.
    pub fn producer(&self) -> EntryProducer {
        EntryProducer {
            shared: self.shared.clone(),
        }
    }

    /// Entries currently waiting to be flushed.
    pub fn buffered(&self) -> usize {
        self.shared.buffer.len()
    }

    pub fn stats(&self) -> HandlerStats {
        self.shared.stats()
    }

    pub fn state(&self) -> MonitorState {
        self.shared.state()
    }

    /// Stop accepting new flush cycles and wait until the buffer is drained.
    ///
    /// Without a shutdown timeout this waits for as long as the sink keeps
    /// failing. With one, the monitor is aborted when the limit is hit and
    /// whatever is still buffered, plus any batch the sink was still holding,
    /// is reported as abandoned.
    pub async fn shutdown(mut self) -> Result<HandlerStats, HandlerError> {
        let Some(mut worker) = self.worker.take() else {
            return Ok(self.stats());
        };

        info!(
            buffered = self.shared.buffer.len(),
            "Shutdown requested, draining buffer"
        );
        self.shared.request_stop();

        let joined = match self.shutdown_timeout {
            None => worker.await,
            Some(limit) => match tokio::time::timeout(limit, &mut worker).await {
                Ok(joined) => joined,
                Err(_) => {
                    worker.abort();
                    // Cancelled only at an await point, so in_flight is settled
                    let _ = worker.await;
                    self.shared.set_state(MonitorState::Stopped);
                    let abandoned = self.shared.undelivered();
                    warn!(
                        timeout_secs = limit.as_secs(),
                        abandoned = abandoned,
                        "Shutdown timed out, abandoning undelivered entries"
                    );
                    return Err(HandlerError::ShutdownTimedOut { limit, abandoned });
                }
            },
        };

        joined.map_err(|e| HandlerError::WorkerPanicked(e.to_string()))?;
        Ok(self.stats())
    }

    #[cfg(test)]
    pub(crate) fn buffered_entries(&self) -> Vec<LogEntry> {
        self.shared.buffer.snapshot()
    }
}

impl Drop for BufferingHandler {
    fn drop(&mut self) {
        // Dropped without shutdown: let the detached monitor drain on its own
        if self.worker.is_some() {
            self.shared.request_stop();
        }
    }
}
