use std::any::Any;
use std::error::Error as StdError;

use thiserror::Error;

/// Failure observed through a result handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task was dropped before resolving its result")]
    Abandoned,

    #[error("task failed: {0}")]
    Failed(String),
}

/// Resource exhaustion that no task runner may swallow.
///
/// Raise it with `std::panic::panic_any(FatalError::OutOfMemory)`; the event
/// loop and the mailbox executors rethrow it instead of logging it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalError {
    #[error("out of memory")]
    OutOfMemory,

    #[error("stack overflow")]
    StackOverflow,
}

/// A failure that was already reported once and is being re-raised with context.
#[derive(Error, Debug)]
#[error("{context}: {cause}")]
pub struct ReportedError {
    pub context: String,
    #[source]
    pub cause: Box<dyn StdError + Send + Sync + 'static>,
}

impl ReportedError {
    pub fn new(context: impl Into<String>, cause: impl StdError + Send + Sync + 'static) -> Self {
        Self {
            context: context.into(),
            cause: Box::new(cause),
        }
    }

    /// Whether a [`FatalError`] appears anywhere in the cause chain.
    pub fn is_fatal(&self) -> bool {
        let mut current: Option<&(dyn StdError + 'static)> = Some(self.cause.as_ref());
        while let Some(err) = current {
            if err.downcast_ref::<FatalError>().is_some() {
                return true;
            }
            current = err.source();
        }
        false
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// Render a panic payload for logs and failed result handles.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(e) = payload.downcast_ref::<FatalError>() {
        e.to_string()
    } else if let Some(e) = payload.downcast_ref::<ReportedError>() {
        e.to_string()
    } else if let Some(e) = payload.downcast_ref::<TaskError>() {
        e.to_string()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Whether a caught panic must be rethrown rather than logged.
pub fn is_fatal_payload(payload: &(dyn Any + Send)) -> bool {
    if payload.downcast_ref::<FatalError>().is_some() {
        return true;
    }
    payload
        .downcast_ref::<ReportedError>()
        .is_some_and(ReportedError::is_fatal)
}
