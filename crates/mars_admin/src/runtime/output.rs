//! Asynchronous draining of child output streams into line queues

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Which child stream a line was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

impl StreamSource {
    pub fn is_stderr(&self) -> bool {
        matches!(self, StreamSource::Stderr)
    }
}

impl std::fmt::Display for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamSource::Stdout => write!(f, "stdout"),
            StreamSource::Stderr => write!(f, "stderr"),
        }
    }
}

/// A decoded line of child output, without its terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub source: StreamSource,
    pub text: String,
}

/// Consumer side of a drained stream.
///
/// Lines come out in exactly the order the drainer read them. Once the
/// drainer finishes the queue is closed for writes, but buffered lines stay
/// readable until consumed.
#[derive(Debug)]
pub struct LineQueue {
    source: StreamSource,
    rx: mpsc::UnboundedReceiver<OutputLine>,
}

impl LineQueue {
    pub fn source(&self) -> StreamSource {
        self.source
    }

    /// Take the oldest buffered line without waiting
    pub fn try_read(&mut self) -> Option<OutputLine> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next line, giving up after `timeout`.
    ///
    /// Returns `None` on timeout or when the queue is closed and empty.
    /// Only the calling task waits; the drainer keeps running.
    pub async fn read_with_timeout(&mut self, timeout: Duration) -> Option<OutputLine> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait for the next line until the stream is exhausted
    pub async fn read(&mut self) -> Option<OutputLine> {
        self.rx.recv().await
    }

    /// Take every line that is already buffered
    pub fn drain_available(&mut self) -> Vec<OutputLine> {
        let mut lines = Vec::new();
        while let Some(line) = self.try_read() {
            lines.push(line);
        }
        lines
    }

    /// True once the drainer is done and every line has been consumed
    pub fn is_finished(&self) -> bool {
        self.rx.is_closed() && self.rx.is_empty()
    }
}

/// Background task moving lines from one stream into its [`LineQueue`]
pub struct StreamDrainer {
    source: StreamSource,
    task: JoinHandle<Result<u64, StreamError>>,
}

impl StreamDrainer {
    /// Start draining `stream` on the current tokio runtime.
    ///
    /// Returns immediately; reading happens on a spawned task that owns the
    /// stream until it reports end-of-stream or fails.
    pub fn spawn<R>(source: StreamSource, stream: R) -> (Self, LineQueue)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(drain(source, stream, tx));
        (Self { source, task }, LineQueue { source, rx })
    }

    pub fn source(&self) -> StreamSource {
        self.source
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop reading and drop the stream. Lines already queued stay readable.
    pub fn close(&self) {
        self.task.abort();
    }

    /// Wait for the drainer to end and return how many lines it produced
    pub async fn finish(self) -> Result<u64, StreamError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(StreamError::Closed(self.source)),
            Err(e) => Err(StreamError::Panicked {
                source_stream: self.source,
                message: e.to_string(),
            }),
        }
    }
}

async fn drain<R>(
    source: StreamSource,
    stream: R,
    tx: mpsc::UnboundedSender<OutputLine>,
) -> Result<u64, StreamError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut count = 0u64;

    loop {
        buf.clear();
        let n = match reader.read_until(b'\n', &mut buf).await {
            Ok(n) => n,
            Err(e) => {
                log::warn!("[{}] Read failed after {} lines: {}", source, count, e);
                return Err(StreamError::Read {
                    source_stream: source,
                    source: e,
                });
            }
        };
        if n == 0 {
            log::debug!("[{}] End of stream after {} lines", source, count);
            return Ok(count);
        }

        let text = String::from_utf8_lossy(trim_line_ending(&buf)).into_owned();
        count += 1;

        // Nobody is listening any more, but keep reading so the child never blocks
        let _ = tx.send(OutputLine { source, text });
    }
}

fn trim_line_ending(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

/// Errors that end a drainer before a clean end-of-stream
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Failed reading {source_stream}: {source}")]
    Read {
        source_stream: StreamSource,
        #[source]
        source: std::io::Error,
    },

    #[error("Drainer for {0} was closed by its owner")]
    Closed(StreamSource),

    #[error("Drainer for {source_stream} panicked: {message}")]
    Panicked {
        source_stream: StreamSource,
        message: String,
    },
}
