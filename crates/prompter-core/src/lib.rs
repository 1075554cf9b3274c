//! Background work and diagnostics for the API prompter panel.
//!
//! The crate keeps the presentation thread responsive while remote calls run:
//! - [`UiLoop`] owns the UI-thread side of the marshaling channel
//! - [`TaskDispatcher`] runs each task on its own worker thread
//! - [`EventLog`] and [`RequestHistory`] are the append-only records that
//!   completion handlers write to

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod config;
pub mod deferred;
pub mod dispatcher;
pub mod event_log;
pub mod history;
pub mod panel;
pub mod raw_request;
pub mod surface;
pub mod ui_loop;

pub use config::{ConfigError, PrompterConfig};
pub use deferred::{BufferDrained, DeferredLogBuffer, DrainReport};
pub use dispatcher::{EventLogAccess, Outcome, TaskDispatcher, TaskId, WorkFailure};
pub use event_log::{Clock, EventLog, LocalClock, LogDelivery, LogEntry, MountOutcome};
pub use history::{HistoryError, HistoryRecord, RequestHistory, summary_line};
pub use panel::{HistoryAccess, PanelState};
pub use raw_request::{
    CommandOutput, CommandRunner, RawRequest, ShellCommandRunner, submit_raw_request,
};
pub use surface::{LogSurface, RequestInput, SurfaceError, UiSurface};
pub use ui_loop::{ScheduleError, UiHandle, UiLoop};
