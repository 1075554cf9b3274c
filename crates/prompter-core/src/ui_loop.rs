use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, ThreadId};
use std::time::Duration;

use thiserror::Error;

use crate::dispatcher::{EventLogAccess, Outcome, TaskDispatcher, TaskId, UiMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("ui loop is no longer running")]
    LoopClosed,
}

/// Sendable handle for posting callbacks onto the UI thread.
pub struct UiHandle<S> {
    message_tx: Sender<UiMessage<S>>,
}

impl<S> Clone for UiHandle<S> {
    fn clone(&self) -> Self {
        Self {
            message_tx: self.message_tx.clone(),
        }
    }
}

impl<S: 'static> UiHandle<S> {
    /// Queues `callback` to run on the UI thread during a later loop turn.
    pub fn schedule(
        &self,
        callback: impl FnOnce(&mut S) + Send + 'static,
    ) -> Result<(), ScheduleError> {
        self.message_tx
            .send(UiMessage::Scheduled(Box::new(callback)))
            .map_err(|_| ScheduleError::LoopClosed)
    }
}

/// UI-thread end of the marshaling channel.
///
/// Everything that mutates UI-owned state (event log, request history,
/// widgets) runs inside [`pump`](Self::pump), on the thread that created the
/// loop.
pub struct UiLoop<S> {
    message_rx: Receiver<UiMessage<S>>,
    /// Received but not yet delivered. Survives an unwinding handler.
    backlog: VecDeque<UiMessage<S>>,
    dispatcher: TaskDispatcher<S>,
    handle: UiHandle<S>,
    ui_thread: ThreadId,
}

impl<S: 'static> Default for UiLoop<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: 'static> UiLoop<S> {
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel::<UiMessage<S>>();
        Self {
            message_rx,
            backlog: VecDeque::new(),
            dispatcher: TaskDispatcher::new(message_tx.clone()),
            handle: UiHandle { message_tx },
            ui_thread: thread::current().id(),
        }
    }

    pub fn handle(&self) -> UiHandle<S> {
        self.handle.clone()
    }

    pub fn dispatcher(&self) -> &TaskDispatcher<S> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut TaskDispatcher<S> {
        &mut self.dispatcher
    }

    pub fn submit<T, W, H>(&mut self, work: W, on_complete: H) -> TaskId
    where
        T: Send + 'static,
        W: FnOnce() -> anyhow::Result<T> + Send + 'static,
        H: FnOnce(&mut S, Outcome<T>) + 'static,
    {
        self.dispatcher.submit(work, on_complete)
    }

    pub fn spawn<T, W>(&mut self, work: W) -> TaskId
    where
        T: Send + 'static,
        W: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.dispatcher.spawn(work)
    }

    pub fn is_idle(&self) -> bool {
        self.dispatcher.is_idle()
    }

    pub fn ui_thread(&self) -> ThreadId {
        self.ui_thread
    }

    pub fn on_ui_thread(&self) -> bool {
        thread::current().id() == self.ui_thread
    }
}

impl<S: EventLogAccess + 'static> UiLoop<S> {
    /// Runs every message queued so far and returns how many ran.
    ///
    /// Messages posted by the callbacks themselves wait for the next turn.
    pub fn pump(&mut self, state: &mut S) -> usize {
        self.receive_queued();
        self.deliver_backlog(state)
    }

    /// Waits up to `timeout` for the first message, then behaves like
    /// [`pump`](Self::pump).
    pub fn pump_timeout(&mut self, state: &mut S, timeout: Duration) -> usize {
        if self.backlog.is_empty() {
            match self.message_rx.recv_timeout(timeout) {
                Ok(first) => self.backlog.push_back(first),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return 0,
            }
        }
        self.pump(state)
    }

    fn receive_queued(&mut self) {
        while let Ok(message) = self.message_rx.try_recv() {
            self.backlog.push_back(message);
        }
    }

    /// Delivers the messages held at the start of the turn, one at a time.
    /// If a handler unwinds, the rest stay queued for the next turn.
    fn deliver_backlog(&mut self, state: &mut S) -> usize {
        debug_assert!(self.on_ui_thread(), "ui loop pumped off its own thread");
        let count = self.backlog.len();
        for _ in 0..count {
            let Some(message) = self.backlog.pop_front() else {
                break;
            };
            self.deliver(state, message);
        }
        count
    }

    fn deliver(&mut self, state: &mut S, message: UiMessage<S>) {
        match message {
            UiMessage::TaskFinished { task_id, outcome } => {
                self.dispatcher.complete(state, task_id, outcome);
            }
            UiMessage::Scheduled(callback) => callback(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::thread;
    use std::time::{Duration, Instant};

    use super::{ScheduleError, UiLoop};
    use crate::event_log::EventLog;

    #[test]
    fn scheduled_callbacks_run_on_the_ui_thread_in_posting_order() {
        let mut ui = UiLoop::<EventLog>::new();
        let mut log = EventLog::new();
        let handle = ui.handle();
        let ui_thread = ui.ui_thread();

        let poster = thread::spawn(move || {
            for index in 0..5 {
                handle
                    .schedule(move |log: &mut EventLog| {
                        assert_eq!(thread::current().id(), ui_thread);
                        log.append(format!("callback {index}"));
                    })
                    .expect("loop alive");
            }
        });
        poster.join().expect("poster thread");

        assert_eq!(ui.pump(&mut log), 5);
        let messages = log
            .entries()
            .iter()
            .map(|entry| entry.message.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            messages,
            (0..5).map(|index| format!("callback {index}")).collect::<Vec<_>>()
        );
    }

    #[test]
    fn callbacks_posted_during_a_turn_wait_for_the_next_turn() {
        let mut ui = UiLoop::<EventLog>::new();
        let mut log = EventLog::new();
        let handle = ui.handle();
        let nested = ui.handle();

        handle
            .schedule(move |log: &mut EventLog| {
                log.append("outer");
                nested
                    .schedule(|log: &mut EventLog| {
                        log.append("inner");
                    })
                    .expect("loop alive");
            })
            .expect("loop alive");

        assert_eq!(ui.pump(&mut log), 1);
        assert_eq!(log.len(), 1);
        assert_eq!(ui.pump(&mut log), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn schedule_after_the_loop_is_dropped_reports_closed() {
        let ui = UiLoop::<EventLog>::new();
        let handle = ui.handle();
        drop(ui);

        let result = handle.schedule(|log: &mut EventLog| {
            log.append("never");
        });
        assert_eq!(result, Err(ScheduleError::LoopClosed));
    }

    #[test]
    fn pump_timeout_returns_zero_when_nothing_arrives() {
        let mut ui = UiLoop::<EventLog>::new();
        let mut log = EventLog::new();

        let started = Instant::now();
        assert_eq!(ui.pump_timeout(&mut log, Duration::from_millis(20)), 0);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn unwinding_callback_leaves_the_rest_of_the_turn_queued() {
        let mut ui = UiLoop::<EventLog>::new();
        let mut log = EventLog::new();
        let handle = ui.handle();

        handle
            .schedule(|_: &mut EventLog| panic!("widget callback exploded"))
            .expect("loop alive");
        handle
            .schedule(|log: &mut EventLog| {
                log.append("second delivered");
            })
            .expect("loop alive");

        let unwound = panic::catch_unwind(AssertUnwindSafe(|| ui.pump(&mut log)));
        assert!(unwound.is_err());
        assert!(log.is_empty());

        assert_eq!(ui.pump(&mut log), 1);
        assert_eq!(log.entries()[0].message, "second delivered");
        assert_eq!(ui.pump(&mut log), 0);
    }

    #[test]
    fn task_outcomes_survive_a_panicking_completion_handler() {
        let mut ui = UiLoop::<EventLog>::new();
        let mut log = EventLog::new();

        ui.submit(
            || Ok(1_u8),
            |_: &mut EventLog, _| panic!("first handler exploded"),
        );
        ui.submit(
            || Ok(2_u8),
            |log: &mut EventLog, outcome| {
                assert_eq!(outcome.into_result(), Ok(2));
                log.append("second delivered");
            },
        );

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut unwinds = 0;
        while !ui.is_idle() {
            assert!(Instant::now() < deadline, "timed out waiting for outcomes");
            let turn = panic::catch_unwind(AssertUnwindSafe(|| {
                ui.pump_timeout(&mut log, Duration::from_millis(10))
            }));
            if turn.is_err() {
                unwinds += 1;
            }
        }

        assert_eq!(unwinds, 1);
        assert_eq!(ui.dispatcher().pending_count(), 0);
        let messages = log
            .entries()
            .iter()
            .map(|entry| entry.message.as_str())
            .collect::<Vec<_>>();
        assert_eq!(messages, vec!["second delivered"]);
    }

    #[test]
    fn on_ui_thread_is_false_elsewhere() {
        let ui = UiLoop::<EventLog>::new();
        let ui_thread = ui.ui_thread();
        assert!(ui.on_ui_thread());

        let elsewhere = thread::spawn(move || thread::current().id() != ui_thread)
            .join()
            .expect("probe thread");
        assert!(elsewhere);
    }
}
