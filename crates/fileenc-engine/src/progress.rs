//! Progress reporting and cooperative cancellation.
//!
//! Codecs receive a [`Monitor`] bundling a [`ProgressSink`] and a
//! [`CancellationSource`]. Cancellation is polled once per chunk boundary;
//! an in-flight chunk always completes.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::error::EngineError;

// ── Progress ───────────────────────────────────────────────────────

/// Receives percentages in `0.0..=100.0`.
pub trait ProgressSink {
    fn report(&self, percent: f64);
}

impl<F: Fn(f64)> ProgressSink for F {
    fn report(&self, percent: f64) {
        self(percent);
    }
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _percent: f64) {}
}

// ── Cancellation ───────────────────────────────────────────────────

/// A pollable cancellation flag.
pub trait CancellationSource {
    fn is_cancelled(&self) -> bool;
}

/// Never requests cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancelled;

impl CancellationSource for NeverCancelled {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shared cancellation flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl CancellationSource for CancellationToken {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Monitor ────────────────────────────────────────────────────────

/// Progress sink and cancellation source for one codec call.
#[derive(Clone, Copy)]
pub struct Monitor<'a> {
    progress: &'a dyn ProgressSink,
    cancel: &'a dyn CancellationSource,
}

impl<'a> Monitor<'a> {
    #[must_use]
    pub const fn new(progress: &'a dyn ProgressSink, cancel: &'a dyn CancellationSource) -> Self {
        Self { progress, cancel }
    }

    /// No reporting, never cancelled.
    #[must_use]
    pub const fn silent() -> Monitor<'static> {
        Monitor {
            progress: &NoProgress,
            cancel: &NeverCancelled,
        }
    }

    /// Fail with [`EngineError::Cancelled`] if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Cancelled`] when the source reports cancellation.
    pub fn check_cancelled(&self) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    pub(crate) fn report(&self, percent: f64) {
        self.progress.report(percent);
    }
}

impl std::fmt::Debug for Monitor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

// ── Tracker ────────────────────────────────────────────────────────

/// Turns byte counts into clamped, non-decreasing percentages.
pub(crate) struct Tracker<'m, 'a> {
    monitor: &'m Monitor<'a>,
    total: u64,
    done: u64,
    last: f64,
}

impl<'m, 'a> Tracker<'m, 'a> {
    pub(crate) const fn new(monitor: &'m Monitor<'a>, total: u64) -> Self {
        Self {
            monitor,
            total,
            done: 0,
            last: 0.0,
        }
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), EngineError> {
        self.monitor.check_cancelled()
    }

    #[allow(clippy::cast_precision_loss, clippy::arithmetic_side_effects)]
    fn advance(&mut self, bytes: u64) {
        self.done = self.done.saturating_add(bytes);
        let percent = if self.total == 0 {
            100.0
        } else {
            (self.done as f64 / self.total as f64 * 100.0).clamp(0.0, 100.0)
        };
        if percent > self.last {
            self.last = percent;
            self.monitor.report(percent);
        }
    }

    /// Report 100 unless it was already reported.
    pub(crate) fn finish(&mut self) {
        if self.last < 100.0 {
            self.last = 100.0;
            self.monitor.report(100.0);
        }
    }
}

/// Copy `reader` into `writer` in `chunk_size` pieces, polling cancellation
/// before each chunk and reporting progress after it.
///
/// `map_read` classifies read errors; write errors are always I/O errors.
pub(crate) fn pump<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    chunk_size: usize,
    tracker: &mut Tracker<'_, '_>,
    map_read: F,
) -> Result<u64, EngineError>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    F: Fn(io::Error) -> EngineError,
{
    let mut buf = Zeroizing::new(vec![0u8; chunk_size]);
    let mut total: u64 = 0;
    loop {
        tracker.check_cancelled()?;
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(map_read(e)),
        };
        writer.write_all(&buf[..n])?;
        let n = n as u64;
        total = total.saturating_add(n);
        tracker.advance(n);
    }
    Ok(total)
}
