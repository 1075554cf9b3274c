use crate::dispatcher::EventLogAccess;
use crate::event_log::EventLog;
use crate::history::RequestHistory;

/// UI state that owns the request history.
pub trait HistoryAccess {
    fn history_mut(&mut self) -> &mut RequestHistory;
}

/// Diagnostics state owned by the UI thread.
#[derive(Default)]
pub struct PanelState {
    pub event_log: EventLog,
    pub history: RequestHistory,
}

impl PanelState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_log(event_log: EventLog) -> Self {
        Self {
            event_log,
            history: RequestHistory::new(),
        }
    }
}

impl EventLogAccess for PanelState {
    fn event_log_mut(&mut self) -> &mut EventLog {
        &mut self.event_log
    }
}

impl HistoryAccess for PanelState {
    fn history_mut(&mut self) -> &mut RequestHistory {
        &mut self.history
    }
}
