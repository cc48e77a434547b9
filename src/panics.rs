// Copyright 2024 fspipe contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The panic→error bridge: converts a caught panic, in whichever of the two
//! forms this crate can observe one, into the same `"a fatal error occurred: "`
//! [`PipelineError::Fatal`].
//!
//! The two forms are: a synchronous panic caught with `catch_unwind` around a
//! user-supplied callback invoked inline (a `FileEvaluator::should_keep` call,
//! or a `Filesystem` method that panics instead of returning an error), and a
//! spawned task that unwound, observed as `JoinError::is_panic()`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tokio::task::JoinError;

use crate::error::PipelineError;

/// Runs `f`, converting a caught panic into `PipelineError::Fatal`.
pub fn catch_fatal<F, R>(f: F) -> Result<R, PipelineError>
where
    F: FnOnce() -> R,
{
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| PipelineError::Fatal(payload_message(payload)))
}

/// Converts a `JoinError` from an unwound task into `PipelineError::Fatal`.
///
/// Panics if `err` did not represent a panic (the task was cancelled instead);
/// callers are expected to check `JoinError::is_panic()` or only route panics
/// here.
pub fn join_error_to_fatal(err: JoinError) -> PipelineError {
    let payload = err.into_panic();
    PipelineError::Fatal(payload_message(payload))
}

pub(crate) fn payload_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
