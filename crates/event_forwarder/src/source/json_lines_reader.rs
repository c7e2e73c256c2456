use crate::source::EventBus;
use common::domain::RawEvent;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Path value that selects standard input
pub const STDIN_PATH: &str = "-";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderSummary {
    pub lines_read: u64,
    pub events_published: u64,
    pub malformed_lines: u64,
}

/// Feeds an [`EventBus`] from a stream of JSON-encoded [`RawEvent`]s, one
/// per line. Blank lines are ignored; malformed lines are logged and skipped.
pub struct JsonLinesEventReader {
    lines: Lines<Box<dyn AsyncBufRead + Unpin + Send>>,
    bus: Arc<EventBus>,
    summary: ReaderSummary,
}

impl JsonLinesEventReader {
    pub fn new(reader: impl AsyncBufRead + Unpin + Send + 'static, bus: Arc<EventBus>) -> Self {
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = Box::new(reader);
        Self {
            lines: reader.lines(),
            bus,
            summary: ReaderSummary::default(),
        }
    }

    /// Opens a file, or standard input for `-`
    pub async fn open(path: impl AsRef<Path>, bus: Arc<EventBus>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if path.as_os_str() == STDIN_PATH {
            return Ok(Self::new(BufReader::new(tokio::io::stdin()), bus));
        }
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(BufReader::new(file), bus))
    }

    /// Publishes one line; returns whether it carried an event
    pub fn publish_line(&mut self, line: &str) -> bool {
        self.summary.lines_read += 1;
        let line = line.trim();
        if line.is_empty() {
            return false;
        }

        match serde_json::from_str::<RawEvent>(line) {
            Ok(event) => {
                let delivered = self.bus.publish(event);
                self.summary.events_published += 1;
                debug!(subscribers = delivered, "event published");
                true
            }
            Err(err) => {
                self.summary.malformed_lines += 1;
                warn!(line = self.summary.lines_read, error = %err, "skipping malformed event line");
                false
            }
        }
    }

    /// Reads until end of stream or cancellation. Reaching the end of the
    /// stream cancels `ctx` so the rest of the process shuts down with it.
    pub async fn run(mut self, ctx: CancellationToken) -> anyhow::Result<ReaderSummary> {
        info!("event reader started");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("event reader stopping");
                    break;
                }
                line = self.lines.next_line() => {
                    match line? {
                        Some(line) => {
                            self.publish_line(&line);
                        }
                        None => {
                            info!(
                                lines_read = self.summary.lines_read,
                                events_published = self.summary.events_published,
                                malformed_lines = self.summary.malformed_lines,
                                "event stream ended"
                            );
                            ctx.cancel();
                            break;
                        }
                    }
                }
            }
        }

        Ok(self.summary)
    }
}
