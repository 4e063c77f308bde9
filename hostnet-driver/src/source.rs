//! Newline-delimited JSON lifecycle feed

use async_trait::async_trait;
use hostnet_core::{DriverEvent, Result};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::coordinator::Coordinator;
use crate::supervisor::LifecycleSource;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Reads [`DriverEvent`]s, one JSON object per line, from a file or FIFO
///
/// Each event is handled to completion before the next line is read.
///
/// A regular file is followed like a log: at end of file the reader waits
/// for more lines, and a restarted subscription resumes after the last line
/// it handled instead of replaying the file. A FIFO is a stream: the
/// subscription ends when the writer closes it.
///
/// ```text
/// {"type":"allocated","workload":"w1","devices":[{"name":"eth-phys0"}]}
/// {"type":"network_ready","workload":"w1","namespace":{"path":"/run/netns/w1"}}
/// ```
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
    coordinator: Coordinator,
    poll_interval: Duration,
    /// Bytes of the regular file already handled, shared by clones
    offset: Arc<AtomicU64>,
}

impl JsonLinesSource {
    /// Create a feed reader dispatching to `coordinator`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, coordinator: Coordinator) -> Self {
        Self {
            path: path.into(),
            coordinator,
            poll_interval: DEFAULT_POLL_INTERVAL,
            offset: Arc::new(AtomicU64::new(0)),
        }
    }

    /// How often a followed file is checked for new lines
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Feed path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of a followed file handled so far
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::SeqCst)
    }

    async fn dispatch(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let event = match parse_event(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Skipping malformed event");
                return;
            }
        };

        let workload = event.workload().clone();
        let name = event.name();
        if let Err(e) = self.coordinator.handle(event).await {
            tracing::error!(workload = %workload, event = name, error = %e, "Event handling failed");
        }
    }

    /// Position a regular file after the lines already handled
    async fn resume(&self, file: &mut File, len: u64) -> Result<u64> {
        let mut offset = self.offset();
        if offset > len {
            tracing::warn!(
                path = %self.path.display(),
                offset,
                len,
                "Lifecycle feed shrank, reading from the start"
            );
            offset = 0;
            self.offset.store(0, Ordering::SeqCst);
        }

        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }
        Ok(offset)
    }

    /// Check whether a followed file was truncated under the reader
    async fn truncated(&self, reader: &BufReader<File>) -> Result<bool> {
        let len = reader.get_ref().metadata().await?.len();
        Ok(len < self.offset())
    }
}

/// Decode one feed line
///
/// # Errors
/// Returns the decoder error for lines that are not a known event
pub fn parse_event(line: &str) -> serde_json::Result<DriverEvent> {
    serde_json::from_str(line)
}

#[async_trait]
impl LifecycleSource for JsonLinesSource {
    fn name(&self) -> &str {
        "json-lines"
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        // Opening a FIFO blocks until a writer shows up
        let mut file = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            file = File::open(&self.path) => file?,
        };

        let metadata = file.metadata().await?;
        let follow = metadata.is_file();
        let offset = if follow {
            self.resume(&mut file, metadata.len()).await?
        } else {
            0
        };

        tracing::info!(path = %self.path.display(), follow, offset, "Lifecycle feed opened");

        let mut reader = BufReader::new(file);
        let mut line = Vec::new();

        loop {
            let read = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                read = reader.read_until(b'\n', &mut line) => read?,
            };

            if read > 0 && line.ends_with(b"\n") {
                self.dispatch(&String::from_utf8_lossy(&line)).await;
                if follow {
                    self.offset.fetch_add(line.len() as u64, Ordering::SeqCst);
                }
                line.clear();
                continue;
            }

            if !follow {
                if !line.is_empty() {
                    self.dispatch(&String::from_utf8_lossy(&line)).await;
                }
                tracing::debug!(path = %self.path.display(), "Lifecycle feed closed by writer");
                return Ok(());
            }

            if self.truncated(&reader).await? {
                self.offset.store(0, Ordering::SeqCst);
                tracing::warn!(path = %self.path.display(), "Lifecycle feed truncated");
                return Ok(());
            }

            // An unterminated line stays buffered until the writer finishes it
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
