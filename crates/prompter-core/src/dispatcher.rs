//! Runs units of work off the UI thread and routes their outcomes back.
//!
//! Completion handlers are kept on the UI side keyed by [`TaskId`]; workers
//! only ever send `(TaskId, outcome)` through the loop's channel. Handlers are
//! not `Send`, so the dispatcher (and the [`UiLoop`](crate::UiLoop) owning it)
//! cannot leave the thread that created it.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;
use std::thread;

use thiserror::Error;

use crate::event_log::EventLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// A task that returned an error, panicked, or never got a thread.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct WorkFailure {
    pub message: String,
}

impl WorkFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn from_error(error: &anyhow::Error) -> Self {
        Self::new(format!("{error:#}"))
    }

    fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::new(format!("task panicked: {detail}"))
    }

    fn spawn(error: &io::Error) -> Self {
        Self::new(format!("failed to spawn task thread: {error}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    Failure(WorkFailure),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn into_result(self) -> Result<T, WorkFailure> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }
}

/// UI state that carries the event log failures are reported to.
pub trait EventLogAccess {
    fn event_log_mut(&mut self) -> &mut EventLog;
}

impl EventLogAccess for EventLog {
    fn event_log_mut(&mut self) -> &mut EventLog {
        self
    }
}

pub(crate) type RawOutcome = Result<Box<dyn Any + Send>, WorkFailure>;

type CompletionHandler<S> = Box<dyn FnOnce(&mut S, RawOutcome)>;

pub(crate) enum UiMessage<S> {
    TaskFinished {
        task_id: TaskId,
        outcome: RawOutcome,
    },
    Scheduled(Box<dyn FnOnce(&mut S) + Send>),
}

type WorkerBody = Box<dyn FnOnce() + Send + 'static>;

/// Starts a detached worker thread with the given name.
pub(crate) type ThreadSpawner = fn(String, WorkerBody) -> io::Result<()>;

fn spawn_named_thread(name: String, body: WorkerBody) -> io::Result<()> {
    thread::Builder::new().name(name).spawn(body).map(drop)
}

pub struct TaskDispatcher<S> {
    next_task_id: u64,
    handlers: HashMap<TaskId, CompletionHandler<S>>,
    message_tx: Sender<UiMessage<S>>,
    spawner: ThreadSpawner,
}

impl<S: 'static> TaskDispatcher<S> {
    pub(crate) fn new(message_tx: Sender<UiMessage<S>>) -> Self {
        Self {
            next_task_id: 1,
            handlers: HashMap::new(),
            message_tx,
            spawner: spawn_named_thread,
        }
    }

    #[cfg(test)]
    pub(crate) fn set_spawner(&mut self, spawner: ThreadSpawner) {
        self.spawner = spawner;
    }

    /// Starts `work` on a fresh worker thread and returns without waiting.
    ///
    /// `on_complete` runs later on the UI thread, during the loop turn that
    /// picks up the outcome.
    pub fn submit<T, W, H>(&mut self, work: W, on_complete: H) -> TaskId
    where
        T: Send + 'static,
        W: FnOnce() -> anyhow::Result<T> + Send + 'static,
        H: FnOnce(&mut S, Outcome<T>) + 'static,
    {
        let task_id = TaskId(self.next_task_id);
        self.next_task_id = self.next_task_id.saturating_add(1);

        let handler: CompletionHandler<S> = Box::new(move |state: &mut S, raw: RawOutcome| {
            let outcome = match raw {
                Ok(value) => match value.downcast::<T>() {
                    Ok(value) => Outcome::Success(*value),
                    Err(_) => Outcome::Failure(WorkFailure::new(
                        "task produced a value of an unexpected type",
                    )),
                },
                Err(failure) => Outcome::Failure(failure),
            };
            on_complete(state, outcome);
        });
        self.handlers.insert(task_id, handler);

        let worker_tx = self.message_tx.clone();
        let spawned = (self.spawner)(
            task_id.to_string(),
            Box::new(move || {
                let outcome = run_work(work);
                if worker_tx
                    .send(UiMessage::TaskFinished { task_id, outcome })
                    .is_err()
                {
                    tracing::debug!(
                        target: "prompter::dispatcher",
                        task = %task_id,
                        "ui loop closed before the outcome was delivered"
                    );
                }
            }),
        );

        match spawned {
            Ok(()) => {
                tracing::debug!(
                    target: "prompter::dispatcher",
                    task = %task_id,
                    "task submitted"
                );
            }
            Err(error) => {
                tracing::warn!(
                    target: "prompter::dispatcher",
                    task = %task_id,
                    %error,
                    "task thread spawn failed"
                );
                if self
                    .message_tx
                    .send(UiMessage::TaskFinished {
                        task_id,
                        outcome: Err(WorkFailure::spawn(&error)),
                    })
                    .is_err()
                {
                    tracing::debug!(
                        target: "prompter::dispatcher",
                        task = %task_id,
                        "ui loop closed before the spawn failure was delivered"
                    );
                }
            }
        }

        task_id
    }

    /// Fire-and-forget variant of [`submit`](Self::submit). Failures still
    /// reach the event log.
    pub fn spawn<T, W>(&mut self, work: W) -> TaskId
    where
        T: Send + 'static,
        W: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.submit(work, |_: &mut S, _: Outcome<T>| {})
    }

    pub fn pending_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_idle(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn is_pending(&self, task_id: TaskId) -> bool {
        self.handlers.contains_key(&task_id)
    }

    pub(crate) fn complete(&mut self, state: &mut S, task_id: TaskId, outcome: RawOutcome)
    where
        S: EventLogAccess,
    {
        let Some(handler) = self.handlers.remove(&task_id) else {
            tracing::warn!(
                target: "prompter::dispatcher",
                task = %task_id,
                "outcome for unknown task ignored"
            );
            return;
        };

        if let Err(failure) = &outcome {
            tracing::warn!(
                target: "prompter::dispatcher",
                task = %task_id,
                error = %failure,
                "task failed"
            );
            state.event_log_mut().append(format!("Error: {failure}"));
        } else {
            tracing::debug!(
                target: "prompter::dispatcher",
                task = %task_id,
                "task succeeded"
            );
        }

        handler(state, outcome);
    }
}

fn run_work<T, W>(work: W) -> RawOutcome
where
    T: Send + 'static,
    W: FnOnce() -> anyhow::Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(Ok(value)) => Ok(Box::new(value)),
        Ok(Err(error)) => Err(WorkFailure::from_error(&error)),
        Err(payload) => Err(WorkFailure::from_panic(&*payload)),
    }
}
