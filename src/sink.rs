//! Destination sinks.
//!
//! A [`Sink`] accepts one batch at a time and reports success or failure.
//! Failures are plain values: the engine requeues the batch and tries again
//! on the next trigger, so a sink must never panic to signal an error.

use std::future::Future;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use crate::client::{ClientError, HttpSink};
use crate::config::{Config, DestinationKind};
use crate::entry::LogBatch;

/// Errors a sink can report for a batch.
#[derive(Debug)]
pub enum SinkError {
    /// Writing to the output failed
    Io(std::io::Error),

    /// The HTTP destination could not accept the batch
    Client(ClientError),

    /// The destination refused the batch for another reason
    Rejected(String),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "Sink I/O error: {}", e),
            SinkError::Client(e) => write!(f, "Sink transport error: {}", e),
            SinkError::Rejected(reason) => write!(f, "Batch rejected: {}", reason),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::Io(e) => Some(e),
            SinkError::Client(e) => Some(e),
            SinkError::Rejected(_) => None,
        }
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err)
    }
}

impl From<ClientError> for SinkError {
    fn from(err: ClientError) -> Self {
        SinkError::Client(err)
    }
}

/// A destination that durably accepts batches of log entries.
///
/// `send` is only ever called from the single monitor task, one batch at a
/// time. It may take as long as it needs; producers are not affected.
pub trait Sink: Send + Sync + 'static {
    /// Deliver a batch. The batch is borrowed so it can be requeued on failure.
    fn send(&self, batch: &LogBatch) -> impl Future<Output = Result<(), SinkError>> + Send;
}

impl<S: Sink> Sink for Arc<S> {
    fn send(&self, batch: &LogBatch) -> impl Future<Output = Result<(), SinkError>> + Send {
        (**self).send(batch)
    }
}

/// Prints each batch as a single list of messages.
///
/// Writes to stdout unless another writer is supplied.
pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::with_writer(std::io::stdout())
    }

    /// Print batches to `writer` instead of stdout.
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
        }
    }

    fn write_batch(&self, batch: &LogBatch) -> std::io::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{:?}", batch.messages())?;
        out.flush()
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for ConsoleSink {
    async fn send(&self, batch: &LogBatch) -> Result<(), SinkError> {
        self.write_batch(batch)?;
        Ok(())
    }
}

/// The destination selected by configuration.
pub enum Destination {
    Console(ConsoleSink),
    Http(HttpSink),
}

impl Destination {
    /// Build the sink named by `config.destination`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        match config.destination {
            DestinationKind::Console => Ok(Destination::Console(ConsoleSink::new())),
            DestinationKind::Http => Ok(Destination::Http(HttpSink::new(config)?)),
        }
    }

    pub fn kind(&self) -> DestinationKind {
        match self {
            Destination::Console(_) => DestinationKind::Console,
            Destination::Http(_) => DestinationKind::Http,
        }
    }
}

impl Sink for Destination {
    async fn send(&self, batch: &LogBatch) -> Result<(), SinkError> {
        match self {
            Destination::Console(sink) => sink.send(batch).await,
            Destination::Http(sink) => sink.send(batch).await,
        }
    }
}
