//! Backpressure-aware bridge from sync log calls to a remote RPC sink.
//!
//! Producers call the sync [`Logger`] methods; a bounded FIFO decouples them
//! from a single consumer that forwards one message at a time. When the
//! buffer is full the producer **blocks**; that is deliberate backpressure,
//! not a dropped-message policy.

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{SyncSender, sync_channel};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;

use devws_core::{LogLevel, LogMessage, Logger};

/// Buffered message capacity.
pub const BUFFER_CAPACITY: usize = 1000;

/// Per-message forward deadline.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

/// Remote RPC sink the consumer forwards into.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Deliver one message. Failures are swallowed by the forwarder: the
    /// sink cannot itself be logged to without recursion.
    async fn send_log(&self, message: LogMessage) -> anyhow::Result<()>;
}

/// Bounded log forwarder with a single consumer thread.
///
/// Messages below the configured level never enter the buffer. Enqueue
/// order equals delivery order. A `fatal` call enqueues and then terminates
/// the process; under buffer saturation termination may race with delivery
/// of the final message (known limitation).
///
/// Must be created from within a multi-threaded tokio runtime; the consumer
/// drives the sink future through the runtime handle.
pub struct RemoteLogForwarder {
    tx: SyncSender<LogMessage>,
    level: LogLevel,
    worker: JoinHandle<()>,
}

impl RemoteLogForwarder {
    /// Start a forwarder with the default capacity.
    ///
    /// # Errors
    /// Returns an error if the consumer thread cannot be spawned.
    pub fn start(sink: Arc<dyn LogSink>, level: LogLevel) -> io::Result<Self> {
        Self::with_capacity(sink, level, BUFFER_CAPACITY)
    }

    /// Start a forwarder with an explicit buffer capacity.
    ///
    /// # Errors
    /// Returns an error if the consumer thread cannot be spawned.
    pub fn with_capacity(
        sink: Arc<dyn LogSink>,
        level: LogLevel,
        capacity: usize,
    ) -> io::Result<Self> {
        let handle = tokio::runtime::Handle::current();
        let (tx, rx) = sync_channel::<LogMessage>(capacity);
        let worker = std::thread::Builder::new()
            .name("log-forwarder".to_string())
            .spawn(move || {
                // single consumer: delivery order equals enqueue order
                while let Ok(message) = rx.recv() {
                    let _ = handle.block_on(async {
                        tokio::time::timeout(FORWARD_TIMEOUT, sink.send_log(message)).await
                    });
                }
            })?;
        Ok(Self { tx, level, worker })
    }

    /// Flush buffered messages and stop the consumer.
    pub fn shutdown(self) {
        drop(self.tx);
        let _ = self.worker.join();
    }
}

impl Logger for RemoteLogForwarder {
    fn log(&self, level: LogLevel, message: &str) {
        if level < self.level {
            return;
        }
        // blocks when the buffer is full
        let _ = self.tx.send(LogMessage::new(level, message));
    }

    fn level(&self) -> LogLevel {
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        delay: Duration,
        seen: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LogSink for RecordingSink {
        async fn send_log(&self, message: LogMessage) -> anyhow::Result<()> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.seen.lock().unwrap().push(message.message);
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn preserves_enqueue_order_with_slow_sink() {
        let sink = RecordingSink::new(Duration::from_millis(2));
        let forwarder = RemoteLogForwarder::start(sink.clone(), LogLevel::Debug).unwrap();

        let expected: Vec<String> = (0..50).map(|i| format!("m{i}")).collect();
        for msg in &expected {
            forwarder.info(msg);
        }
        forwarder.shutdown();

        assert_eq!(*sink.seen.lock().unwrap(), expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn full_buffer_blocks_instead_of_dropping() {
        let sink = RecordingSink::new(Duration::from_millis(5));
        let forwarder = RemoteLogForwarder::with_capacity(sink.clone(), LogLevel::Debug, 1).unwrap();

        let expected: Vec<String> = (0..10).map(|i| format!("m{i}")).collect();
        for msg in &expected {
            forwarder.info(msg);
        }
        forwarder.shutdown();

        // every message was delivered, in order, despite a capacity of one
        assert_eq!(*sink.seen.lock().unwrap(), expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn filters_below_threshold_before_enqueue() {
        let sink = RecordingSink::new(Duration::ZERO);
        let forwarder = RemoteLogForwarder::start(sink.clone(), LogLevel::Info).unwrap();

        forwarder.debug("invisible");
        forwarder.info("visible");
        forwarder.shutdown();

        assert_eq!(*sink.seen.lock().unwrap(), vec!["visible".to_string()]);
    }
}
