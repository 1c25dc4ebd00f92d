//! Write-once result handles.
//!
//! A [`promise`] yields a [`Completer`] for the task side and a
//! [`ResultHandle`] for the caller. The handle resolves exactly once: with the
//! first value or failure handed to any clone of the completer, or with
//! [`TaskError::Abandoned`] once every completer is dropped unresolved.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use tickwork_core::{is_fatal_payload, panic_message, TaskError};

type Outcome<T> = Result<T, TaskError>;

/// Create a connected completer/handle pair.
pub fn promise<T>() -> (Completer<T>, ResultHandle<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Completer {
            slot: Arc::new(Mutex::new(Some(tx))),
        },
        ResultHandle { rx },
    )
}

/// Task-side end of a [`promise`]. Clones share the same slot.
pub struct Completer<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<Outcome<T>>>>>,
}

impl<T> Clone for Completer<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Completer<T> {
    /// Resolve with a value. Returns `false` if the handle was already resolved.
    pub fn complete(&self, value: T) -> bool {
        self.resolve(Ok(value))
    }

    /// Resolve with a failure. Returns `false` if the handle was already resolved.
    pub fn fail(&self, error: TaskError) -> bool {
        self.resolve(Err(error))
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.lock().is_none()
    }

    fn resolve(&self, outcome: Outcome<T>) -> bool {
        match self.slot.lock().take() {
            Some(tx) => {
                // The caller may have dropped the handle; that is not our concern.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

/// Caller-side end of a [`promise`].
///
/// Resolve it by blocking ([`ResultHandle::join`]), polling
/// ([`ResultHandle::try_join`]) or awaiting it.
#[must_use = "a result handle does nothing unless joined or awaited"]
pub struct ResultHandle<T> {
    rx: oneshot::Receiver<Outcome<T>>,
}

impl<T> ResultHandle<T> {
    /// A handle that is already resolved with `value`.
    pub fn ready(value: T) -> Self {
        let (completer, handle) = promise();
        completer.complete(value);
        handle
    }

    /// A handle that is already failed.
    pub fn failed(error: TaskError) -> Self {
        let (completer, handle) = promise();
        completer.fail(error);
        handle
    }

    /// Block the calling thread until the handle resolves.
    ///
    /// # Panics
    /// When called from inside an async runtime; await the handle there instead.
    pub fn join(self) -> Outcome<T> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(TaskError::Abandoned))
    }

    /// Take the outcome if it is available, otherwise hand the handle back.
    pub fn try_join(mut self) -> Result<Outcome<T>, Self> {
        match self.rx.try_recv() {
            Ok(outcome) => Ok(outcome),
            Err(oneshot::error::TryRecvError::Empty) => Err(self),
            Err(oneshot::error::TryRecvError::Closed) => Ok(Err(TaskError::Abandoned)),
        }
    }
}

impl<T> Future for ResultHandle<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Abandoned)))
    }
}

/// Run `handler` with `completer`, failing the handle if the handler panics
/// before resolving it. Fatal panics are re-raised after the handle fails.
pub(crate) fn run_handler<T, F>(completer: Completer<T>, handler: F)
where
    F: FnOnce(Completer<T>),
{
    let guard = completer.clone();
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || handler(completer))) {
        guard.fail(TaskError::Panicked(panic_message(&*payload)));
        if is_fatal_payload(&*payload) {
            panic::resume_unwind(payload);
        }
    }
}

/// Resolve `completer` with the value `action` produces.
pub(crate) fn run_supplier<T, F>(completer: Completer<T>, action: F)
where
    F: FnOnce() -> T,
{
    run_handler(completer, move |completer| {
        completer.complete(action());
    });
}
