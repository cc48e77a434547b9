// Copyright 2024 fspipe contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The typed lazy stream every stage produces: a `(file?, error?)` pair per
//! item, carried over a single-item-buffered channel plus a cancel function.

use tokio::sync::mpsc;

use crate::error::PipelineError;
use crate::file::File;

/// One element of a pipeline's output stream.
///
/// At least one of `file`/`error` is populated. A `PipelineResult` carrying an
/// error signals a recoverable fault at the position in the stream where it
/// appears; downstream stages pass it through unchanged rather than inspecting
/// or re-ordering it.
#[derive(Debug)]
pub struct PipelineResult {
    file: Option<File>,
    error: Option<PipelineError>,
}

impl PipelineResult {
    pub fn ok(file: File) -> Self {
        PipelineResult {
            file: Some(file),
            error: None,
        }
    }

    pub fn err(error: PipelineError) -> Self {
        PipelineResult {
            file: None,
            error: Some(error),
        }
    }

    pub fn file(&self) -> Option<&File> {
        self.file.as_ref()
    }

    pub fn error(&self) -> Option<&PipelineError> {
        self.error.as_ref()
    }

    pub fn into_parts(self) -> (Option<File>, Option<PipelineError>) {
        (self.file, self.error)
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }
}

/// The receiving end of a stage's output stream.
///
/// Buffered to exactly one item, matching the "single-item buffered channel"
/// suspension-point contract: a producer blocks on `send` until the consumer
/// (or a cancellation) frees the slot.
pub type ResultStream = mpsc::Receiver<PipelineResult>;

pub(crate) const CHANNEL_CAPACITY: usize = 1;

/// Requests cancellation of the stage that returned it.
///
/// Invoking it is non-blocking: the stage notices at its next send/recv
/// suspension point. Repeated invocations, and invocations after the stream has
/// already ended naturally, are no-ops. The optional callback is run exactly
/// once, after the stage has finished unwinding, and is expected to drain any
/// remaining items from the stream.
pub struct CancelFn {
    inner: Box<dyn FnOnce(Option<Box<dyn FnOnce() + Send>>) + Send>,
}

impl CancelFn {
    pub(crate) fn new(
        inner: impl FnOnce(Option<Box<dyn FnOnce() + Send>>) + Send + 'static,
    ) -> Self {
        CancelFn {
            inner: Box::new(inner),
        }
    }

    /// Cancels the stage, optionally running `callback` once the stage has
    /// finished unwinding and the output stream has been closed.
    pub fn cancel(self, callback: Option<Box<dyn FnOnce() + Send>>) {
        (self.inner)(callback)
    }
}
