use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::Serialize;

use crate::deferred::{DeferredLogBuffer, DrainReport};
use crate::surface::LogSurface;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: NaiveDateTime,
    pub message: String,
}

impl LogEntry {
    pub fn formatted(&self) -> String {
        format!(
            "[{}] {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.message
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDelivery {
    Rendered,
    Deferred,
    Dropped,
}

pub enum MountOutcome {
    Mounted(DrainReport),
    /// The surface reported itself unmounted; the log keeps buffering.
    NotReady(Box<dyn LogSurface>),
    /// A surface is already live; the offered one is handed back untouched.
    AlreadyLive(Box<dyn LogSurface>),
}

impl MountOutcome {
    pub fn is_mounted(&self) -> bool {
        matches!(self, Self::Mounted(_))
    }
}

enum LogView {
    Buffering(DeferredLogBuffer),
    Live(Box<dyn LogSurface>),
}

/// Timestamped, append-only operational log with a single display surface.
///
/// Must only be touched from the UI thread. Worker threads reach it through
/// the dispatcher's completion handlers.
pub struct EventLog {
    entries: Vec<LogEntry>,
    view: LogView,
    clock: Box<dyn Clock>,
    dropped: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_clock(Box::new(LocalClock))
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            entries: Vec::new(),
            view: LogView::Buffering(DeferredLogBuffer::new()),
            clock,
            dropped: 0,
        }
    }

    pub fn append(&mut self, message: impl Into<String>) -> LogDelivery {
        let entry = LogEntry {
            timestamp: self.clock.now().trunc_subsecs(0),
            message: message.into(),
        };
        tracing::info!(target: "prompter::event_log", "{}", entry.message);

        let line = entry.formatted();
        self.entries.push(entry);

        let delivery = match &mut self.view {
            LogView::Buffering(buffer) => match buffer.push(line) {
                Ok(()) => LogDelivery::Deferred,
                Err(_) => LogDelivery::Dropped,
            },
            LogView::Live(surface) => {
                if !surface.is_mounted() {
                    LogDelivery::Dropped
                } else {
                    match surface.append_line(&line) {
                        Ok(()) => {
                            surface.scroll_to_end();
                            LogDelivery::Rendered
                        }
                        Err(error) => {
                            tracing::warn!(
                                target: "prompter::event_log",
                                %error,
                                "log surface rejected line"
                            );
                            LogDelivery::Dropped
                        }
                    }
                }
            }
        };

        if delivery == LogDelivery::Dropped {
            self.dropped = self.dropped.saturating_add(1);
        }
        delivery
    }

    /// Attaches the display surface and replays everything logged so far.
    pub fn mount(&mut self, mut surface: Box<dyn LogSurface>) -> MountOutcome {
        let buffer = match &mut self.view {
            LogView::Live(_) => return MountOutcome::AlreadyLive(surface),
            LogView::Buffering(buffer) => buffer,
        };
        if !surface.is_mounted() {
            return MountOutcome::NotReady(surface);
        }

        let report = buffer.drain_into(surface.as_mut());
        self.dropped = self.dropped.saturating_add(report.rejected);
        self.view = LogView::Live(surface);
        tracing::debug!(
            target: "prompter::event_log",
            replayed = report.replayed,
            rejected = report.rejected,
            "log surface mounted"
        );
        MountOutcome::Mounted(report)
    }

    pub fn is_live(&self) -> bool {
        matches!(self.view, LogView::Live(_))
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn deferred_len(&self) -> usize {
        match &self.view {
            LogView::Buffering(buffer) => buffer.len(),
            LogView::Live(_) => 0,
        }
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use chrono::{NaiveDate, NaiveDateTime};

    use super::{Clock, EventLog, LogDelivery, MountOutcome};
    use crate::surface::{LogSurface, SurfaceError, UiSurface};

    struct FixedClock(NaiveDateTime);

    impl Clock for FixedClock {
        fn now(&self) -> NaiveDateTime {
            self.0
        }
    }

    fn fixed_log() -> EventLog {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|date| date.and_hms_milli_opt(14, 5, 7, 830))
            .expect("valid timestamp");
        EventLog::with_clock(Box::new(FixedClock(at)))
    }

    #[derive(Clone, Default)]
    struct SharedSurface {
        lines: Rc<RefCell<Vec<String>>>,
        mounted: Rc<Cell<bool>>,
        reject: Rc<Cell<bool>>,
        scrolls: Rc<Cell<usize>>,
    }

    impl SharedSurface {
        fn mounted() -> Self {
            let surface = Self::default();
            surface.mounted.set(true);
            surface
        }

        fn lines(&self) -> Vec<String> {
            self.lines.borrow().clone()
        }
    }

    impl UiSurface for SharedSurface {
        fn is_mounted(&self) -> bool {
            self.mounted.get()
        }
    }

    impl LogSurface for SharedSurface {
        fn append_line(&mut self, line: &str) -> Result<(), SurfaceError> {
            if self.reject.get() {
                return Err(SurfaceError::rejected("widget destroyed"));
            }
            self.lines.borrow_mut().push(line.to_string());
            Ok(())
        }

        fn scroll_to_end(&mut self) {
            self.scrolls.set(self.scrolls.get() + 1);
        }
    }

    #[test]
    fn entries_are_formatted_with_second_precision() {
        let mut log = fixed_log();
        log.append("Connected");

        assert_eq!(log.entries()[0].formatted(), "[2024-03-09 14:05:07] Connected");
    }

    #[test]
    fn appends_before_mount_are_deferred_then_replayed_in_order() {
        let mut log = fixed_log();
        for message in ["one", "two", "three"] {
            assert_eq!(log.append(message), LogDelivery::Deferred);
        }
        assert_eq!(log.deferred_len(), 3);

        let surface = SharedSurface::mounted();
        let outcome = log.mount(Box::new(surface.clone()));

        assert!(outcome.is_mounted());
        assert_eq!(
            surface.lines(),
            vec![
                "[2024-03-09 14:05:07] one".to_string(),
                "[2024-03-09 14:05:07] two".to_string(),
                "[2024-03-09 14:05:07] three".to_string(),
            ]
        );
        assert_eq!(log.deferred_len(), 0);
    }

    #[test]
    fn appends_after_mount_render_and_scroll() {
        let mut log = fixed_log();
        let surface = SharedSurface::mounted();
        assert!(log.mount(Box::new(surface.clone())).is_mounted());

        assert_eq!(log.append("live"), LogDelivery::Rendered);
        assert_eq!(surface.lines(), vec!["[2024-03-09 14:05:07] live".to_string()]);
        assert_eq!(surface.scrolls.get(), 1);
    }

    #[test]
    fn second_mount_hands_the_surface_back_without_replay() {
        let mut log = fixed_log();
        log.append("before");
        let first = SharedSurface::mounted();
        assert!(log.mount(Box::new(first.clone())).is_mounted());

        let second = SharedSurface::mounted();
        match log.mount(Box::new(second.clone())) {
            MountOutcome::AlreadyLive(_) => {}
            _ => panic!("expected the second mount to be refused"),
        }
        assert_eq!(first.lines().len(), 1);
        assert!(second.lines().is_empty());

        log.append("after");
        assert_eq!(first.lines().len(), 2);
        assert!(second.lines().is_empty());
    }

    #[test]
    fn unmounted_surface_keeps_the_log_buffering() {
        let mut log = fixed_log();
        log.append("waiting");

        let surface = SharedSurface::default();
        match log.mount(Box::new(surface.clone())) {
            MountOutcome::NotReady(_) => {}
            _ => panic!("expected mount to wait for the widget"),
        }
        assert!(!log.is_live());
        assert_eq!(log.append("still waiting"), LogDelivery::Deferred);
        assert_eq!(log.deferred_len(), 2);
    }

    #[test]
    fn rejected_lines_are_dropped_and_counted() {
        let mut log = fixed_log();
        let surface = SharedSurface::mounted();
        assert!(log.mount(Box::new(surface.clone())).is_mounted());

        surface.reject.set(true);
        assert_eq!(log.append("lost"), LogDelivery::Dropped);
        assert_eq!(log.dropped_count(), 1);
        assert_eq!(log.len(), 1);

        surface.reject.set(false);
        surface.mounted.set(false);
        assert_eq!(log.append("widget gone"), LogDelivery::Dropped);
        assert_eq!(log.dropped_count(), 2);
        assert!(surface.lines().is_empty());
    }

    #[test]
    fn the_record_keeps_every_entry_regardless_of_delivery() {
        let mut log = fixed_log();
        log.append("deferred");
        let surface = SharedSurface::mounted();
        assert!(log.mount(Box::new(surface.clone())).is_mounted());
        log.append("rendered");

        let messages = log
            .entries()
            .iter()
            .map(|entry| entry.message.as_str())
            .collect::<Vec<_>>();
        assert_eq!(messages, vec!["deferred", "rendered"]);
    }
}
