//! Transfer progress reporting.

use std::io::{self, Read};

/// Emit a progress event roughly every this many bytes when the total is unknown.
const REPORT_EVERY: u64 = 64 * 1024 * 1024;

/// A pass-through reader that reports transfer progress as `tracing` events.
///
/// Bytes are returned unchanged. With a known total, an event is emitted at
/// every tenth of the transfer; otherwise every 64 MiB. A final event is
/// emitted once the inner reader reaches end of stream.
pub struct ProgressReader<R> {
    inner: R,
    label: String,
    total: Option<u64>,
    read: u64,
    next_report: u64,
    enabled: bool,
    finished: bool,
}

impl<R: Read> ProgressReader<R> {
    pub fn new(inner: R, label: impl Into<String>, total: Option<u64>) -> Self {
        let mut reader = ProgressReader {
            inner,
            label: label.into(),
            total: total.filter(|t| *t > 0),
            read: 0,
            next_report: 0,
            enabled: true,
            finished: false,
        };
        reader.next_report = reader.step();
        reader
    }

    /// Turn reporting off; reads still pass through.
    pub fn quiet(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn step(&self) -> u64 {
        match self.total {
            Some(total) => (total / 10).max(1),
            None => REPORT_EVERY,
        }
    }

    fn report(&self) {
        match self.total {
            Some(total) => tracing::debug!(
                source = %self.label,
                "{} / {} ({}%)",
                human_bytes(self.read as f64),
                human_bytes(total as f64),
                self.read.saturating_mul(100) / total
            ),
            None => tracing::debug!(source = %self.label, "{}", human_bytes(self.read as f64)),
        }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        if self.enabled {
            if n == 0 && !buf.is_empty() && !self.finished {
                self.finished = true;
                tracing::info!(source = %self.label, "transferred {}", human_bytes(self.read as f64));
            } else if self.read >= self.next_report {
                self.report();
                self.next_report = self.read + self.step();
            }
        }
        Ok(n)
    }
}

/// Render a byte count with a binary unit suffix, e.g. `1.5 MB`.
pub fn human_bytes(byte_count: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = byte_count;
    let mut unit = 0;
    while value > 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
