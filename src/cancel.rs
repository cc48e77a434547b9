// Copyright 2024 fspipe contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! `CancellationHelper` couples a stage's output channel, its cancellation
//! signal, and an optional post-cancellation callback, guaranteeing: exactly one
//! close of the output channel, exactly one close of the cancel signal, and
//! at-most-once execution of the callback.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::result::{CancelFn, PipelineResult};
use tokio::sync::mpsc::Sender;

/// A condition that can be triggered exactly once, releasing every task
/// waiting on [`Latch::triggered`].
///
/// Equivalent to a single-count countdown latch: triggering drops the
/// underlying `watch::Sender`, which every clone of the receiver observes as a
/// closed channel.
#[derive(Clone)]
pub(crate) struct Latch {
    sender: Arc<Mutex<Option<watch::Sender<()>>>>,
    receiver: watch::Receiver<()>,
}

impl Latch {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = watch::channel(());
        Latch {
            sender: Arc::new(Mutex::new(Some(sender))),
            receiver,
        }
    }

    /// Triggers the latch. All calls after the first are no-ops.
    pub(crate) fn trigger(&self) {
        self.sender.lock().take();
    }

    /// Resolves once the latch has been triggered, possibly immediately.
    pub(crate) async fn triggered(&self) {
        let mut receiver = self.receiver.clone();
        while receiver.changed().await.is_ok() {}
    }

    pub(crate) fn is_triggered(&self) -> bool {
        self.sender.lock().is_none()
    }
}

type Callback = Box<dyn FnOnce() + Send>;

/// Coordinates the shutdown of one Source/Filter/MergedSource task.
pub(crate) struct CancellationHelper {
    latch: Latch,
    out: Mutex<Option<Sender<PipelineResult>>>,
    callback: Mutex<Option<Callback>>,
}

impl CancellationHelper {
    pub(crate) fn new(out: Sender<PipelineResult>) -> Arc<Self> {
        Arc::new(CancellationHelper {
            latch: Latch::new(),
            out: Mutex::new(Some(out)),
            callback: Mutex::new(None),
        })
    }

    /// Resolves once cancellation has been requested.
    pub(crate) async fn cancelled(&self) {
        self.latch.triggered().await
    }

    /// Sends `item` downstream, racing the send against cancellation so that a
    /// pending cancel preempts backpressure. Returns `false` if cancellation won
    /// the race, or if the output channel was already closed.
    pub(crate) async fn send(&self, item: PipelineResult) -> bool {
        let sender = self.out.lock().clone();
        let Some(sender) = sender else {
            return false;
        };
        tokio::select! {
            result = sender.send(item) => result.is_ok(),
            _ = self.cancelled() => false,
        }
    }

    /// Produces the public [`CancelFn`] handed back to the stage's caller.
    pub(crate) fn invoker(self: &Arc<Self>) -> CancelFn {
        let helper = Arc::clone(self);
        CancelFn::new(move |callback| helper.request_cancel(callback))
    }

    fn request_cancel(&self, callback: Option<Callback>) {
        if self.latch.is_triggered() {
            return;
        }
        if let Some(callback) = callback {
            *self.callback.lock() = Some(callback);
        }
        self.latch.trigger();
    }

    /// Finalizes the stage: closes the output channel, marks cancelled if it
    /// wasn't already, and runs the retained callback. Called on every exit path
    /// (normal end, error, or cancellation) by stages with no worker fan-out.
    pub(crate) fn finalize(&self) {
        self.out.lock().take();
        self.latch.trigger();
        self.run_callback();
    }

    /// As [`CancellationHelper::finalize`], but first awaits `wait` (the merged
    /// source's worker waitgroup) before closing the output channel.
    pub(crate) async fn finalize_after(&self, wait: impl Future<Output = ()>) {
        wait.await;
        self.finalize();
    }

    fn run_callback(&self) {
        let Some(callback) = self.callback.lock().take() else {
            return;
        };
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)).is_err() {
            log::warn!("an unexpected error occurred during cancellation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn repeated_cancellation_is_idempotent() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let helper = CancellationHelper::new(tx);

        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let calls = Arc::clone(&calls);
            helper.invoker().cancel(Some(Box::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            })));
        }
        helper.finalize();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn callback_runs_once_from_finalize_even_without_explicit_cancel() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let helper = CancellationHelper::new(tx);
        helper.finalize();
        // No cancellation was requested, so no callback was retained; finalize
        // must still mark the latch triggered so a late `cancel` is a no-op.
        assert!(helper.latch.is_triggered());
    }

    #[tokio::test]
    async fn callback_panic_is_logged_and_swallowed() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let helper = CancellationHelper::new(tx);
        helper.invoker().cancel(Some(Box::new(|| panic!("boom"))));
        helper.finalize();
    }

    #[tokio::test]
    async fn output_channel_closes_exactly_once_on_finalize() {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<PipelineResult>(1);
        let helper = CancellationHelper::new(tx);
        helper.finalize();
        assert!(rx.recv().await.is_none());
    }
}
