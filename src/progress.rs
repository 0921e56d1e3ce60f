// Progress reporting: a sink the caller supplies, and the reader adapter
// that feeds it while the transport pulls the request body.

use std::io::{self, Read};

/// Receives transfer progress. Called once per chunk handed to the
/// transport, with the running byte count and the total body length.
pub trait ProgressSink: Send {
    fn on_progress(&self, bytes_sent: u64, bytes_total: u64);
}

impl<F> ProgressSink for F
where
    F: Fn(u64, u64) + Send,
{
    fn on_progress(&self, bytes_sent: u64, bytes_total: u64) {
        self(bytes_sent, bytes_total)
    }
}

/// Sink that drops every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _bytes_sent: u64, _bytes_total: u64) {}
}

/// Wraps a body reader and reports how much of it has been consumed.
pub struct ProgressReader<R, S> {
    inner: R,
    sink: S,
    sent: u64,
    total: u64,
}

impl<R: Read, S: ProgressSink> ProgressReader<R, S> {
    pub fn new(inner: R, total: u64, sink: S) -> Self {
        Self {
            inner,
            sink,
            sent: 0,
            total,
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.sent
    }
}

impl<R: Read, S: ProgressSink> Read for ProgressReader<R, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.sent += n as u64;
            self.sink.on_progress(self.sent, self.total);
        }
        Ok(n)
    }
}
