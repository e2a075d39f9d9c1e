//! Buffered Sink Library
//!
//! Decouples log call sites from a slow or unreliable destination by
//! buffering entries in memory and forwarding them in batches:
//!
//! - **entry**: Captured log records and the batches they are sent in
//! - **buffer**: Bounded, lock-protected FIFO with oldest-entry eviction
//! - **policy**: Size, time and shutdown flush triggers
//! - **handler**: Background monitor, flush operation and drain-on-shutdown
//! - **sink**: Destination contract plus the console destination
//! - **client**: HTTP destination with retry logic
//! - **layer**: `tracing` layer that captures application events
//! - **config**: Environment-based configuration
//!
//! # Example
//!
//! ```no_run
//! use buffered_sink::config::Config;
//! use buffered_sink::handler::BufferingHandler;
//! use buffered_sink::layer::BufferingLayer;
//! use buffered_sink::sink::Destination;
//! use tracing_subscriber::layer::SubscriberExt;
//! use tracing_subscriber::util::SubscriberInitExt;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let destination = Destination::from_config(&config).expect("Failed to build sink");
//!     let handler = BufferingHandler::new(config.handler_config(), destination);
//!
//!     tracing_subscriber::registry()
//!         .with(BufferingLayer::new(handler.producer()))
//!         .init();
//!
//!     tracing::info!("Hello log World");
//!
//!     handler.shutdown().await.expect("Failed to drain buffer");
//! }
//! ```

// Module declarations
pub mod buffer;
pub mod client;
pub mod config;
pub mod entry;
pub mod handler;
pub mod layer;
pub mod policy;
pub mod sink;

// Re-export commonly used types at crate root for convenience
pub use buffer::{BoundedBuffer, BufferStats};
pub use client::{ClientError, HttpSink};
pub use config::{Config, ConfigError, DestinationKind};
pub use entry::{LogBatch, LogEntry, LogLevel};
pub use handler::{
    BufferingHandler, EntryProducer, HandlerConfig, HandlerError, HandlerStats, MonitorState,
};
pub use layer::BufferingLayer;
pub use policy::{FlushReason, TriggerPolicy};
pub use sink::{ConsoleSink, Destination, Sink, SinkError};
