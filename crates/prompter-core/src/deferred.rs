//! Holding area for log lines written before the log view exists.

use thiserror::Error;

use crate::surface::LogSurface;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deferred log buffer already drained")]
pub struct BufferDrained;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub replayed: usize,
    pub rejected: usize,
}

#[derive(Debug)]
enum BufferState {
    Pending(Vec<String>),
    Drained,
}

/// Ordered lines waiting for the log surface.
///
/// The buffer moves from pending to drained exactly once. After that every
/// push is rejected and every further drain is a no-op.
#[derive(Debug)]
pub struct DeferredLogBuffer {
    state: BufferState,
}

impl Default for DeferredLogBuffer {
    fn default() -> Self {
        Self {
            state: BufferState::Pending(Vec::new()),
        }
    }
}

impl DeferredLogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) -> Result<(), BufferDrained> {
        match &mut self.state {
            BufferState::Pending(lines) => {
                lines.push(line.into());
                Ok(())
            }
            BufferState::Drained => Err(BufferDrained),
        }
    }

    pub fn is_drained(&self) -> bool {
        matches!(self.state, BufferState::Drained)
    }

    pub fn len(&self) -> usize {
        match &self.state {
            BufferState::Pending(lines) => lines.len(),
            BufferState::Drained => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending(&self) -> &[String] {
        match &self.state {
            BufferState::Pending(lines) => lines,
            BufferState::Drained => &[],
        }
    }

    /// Replays every buffered line into `surface` in insertion order.
    ///
    /// A line the surface rejects is counted and skipped; the rest are still
    /// offered.
    pub fn drain_into(&mut self, surface: &mut dyn LogSurface) -> DrainReport {
        let lines = match std::mem::replace(&mut self.state, BufferState::Drained) {
            BufferState::Pending(lines) => lines,
            BufferState::Drained => return DrainReport::default(),
        };

        let mut report = DrainReport::default();
        for line in &lines {
            match surface.append_line(line) {
                Ok(()) => report.replayed += 1,
                Err(error) => {
                    report.rejected += 1;
                    tracing::warn!(
                        target: "prompter::event_log",
                        %error,
                        "dropping deferred log line during replay"
                    );
                }
            }
        }
        if report.replayed > 0 {
            surface.scroll_to_end();
        }
        report
    }
}
