// Copyright 2024 fspipe contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! [`Filter`]: reads a merged source's result stream and drops items per a
//! [`FileEvaluator`].
//!
//! `filter.resultProduced` is emitted after every successful send of a Result
//! the evaluator actually ran on (kept, or turned into a fatal error by a
//! panic), but not for a Result forwarded untouched because it already
//! carried an upstream error.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::FutureExt;
use tokio::sync::mpsc;

use crate::cancel::CancellationHelper;
use crate::error::PipelineError;
use crate::event::{self, Component, Event, EventType};
use crate::executor::Executor;
use crate::file::File;
use crate::identifier::validate_identifier;
use crate::logging::Logger;
use crate::merged::MergedSource;
use crate::panics;
use crate::result::{CancelFn, PipelineResult, ResultStream, CHANNEL_CAPACITY};
use crate::source::SourceLike;
use crate::PipelineContext;

/// A predicate over a [`File`], applied to every item a [`Filter`] reads from
/// its upstream.
pub trait FileEvaluator: Send + Sync {
    /// Whether `file` should be forwarded downstream.
    fn should_keep(&self, file: &File) -> Result<bool, PipelineError>;

    /// Releases any resources the evaluator holds. The default implementation
    /// is a no-op.
    fn destroy(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// The default evaluator used when `NewFilter` is given none: keeps every
/// file.
pub struct NilFileEvaluator;

impl FileEvaluator for NilFileEvaluator {
    fn should_keep(&self, _file: &File) -> Result<bool, PipelineError> {
        Ok(true)
    }
}

/// Configuration for [`Filter::new`].
pub struct FilterConfig {
    pub id: String,
}

/// A stage that reads its upstream's result stream and drops items an
/// evaluator rejects.
pub struct Filter {
    id: String,
    upstream: Arc<dyn SourceLike>,
    evaluator: Arc<dyn FileEvaluator>,
    executor: Executor,
}

impl Filter {
    /// Builds the upstream from `sources` (delegating sanitization and
    /// fan-in to [`MergedSource::new`]), validates `config.id`, and defaults
    /// `evaluator` to [`NilFileEvaluator`] if `None`.
    ///
    /// Emits `filter.created` (iff the `filter` component is allow-listed).
    pub fn new(
        config: FilterConfig,
        sources: Vec<Arc<dyn SourceLike>>,
        evaluator: Option<Arc<dyn FileEvaluator>>,
    ) -> Result<Self, PipelineError> {
        let upstream = MergedSource::new(sources)?;
        let id = validate_identifier(&config.id)?;
        let evaluator = evaluator.unwrap_or_else(|| Arc::new(NilFileEvaluator));

        if event::is_allowed_from(Component::Filter) {
            event::send_event(Event::new(Component::Filter, EventType::Created, id.clone()));
        }

        Ok(Filter {
            id,
            upstream,
            evaluator,
            executor: Executor::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Starts reading the upstream on a background task and returns
    /// immediately.
    pub fn files(&self, context: &PipelineContext) -> (ResultStream, CancelFn) {
        let (upstream_rx, upstream_cancel) = self.upstream.files(context);

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let helper = CancellationHelper::new(tx);
        let cancel_fn = helper.invoker();

        let id = self.id.clone();
        let evaluator = Arc::clone(&self.evaluator);
        let logger = context.logger().clone();
        let task_helper = Arc::clone(&helper);

        self.executor.spawn(async move {
            let produced_id = id.clone();
            let outcome = AssertUnwindSafe(run_filter(
                id,
                upstream_rx,
                upstream_cancel,
                evaluator,
                Arc::clone(&task_helper),
                logger.clone(),
            ))
            .catch_unwind()
            .await;

            if let Err(payload) = outcome {
                let fatal = PipelineError::Fatal(panics::payload_message(payload));
                logger.warn("fspipe::filter", &fatal.to_string());
                task_helper.send(PipelineResult::err(fatal)).await;
                if event::is_allowed_from(Component::Filter) {
                    event::send_event(Event::new(Component::Filter, EventType::Finished, produced_id));
                }
                task_helper.finalize();
            }
        });

        (rx, cancel_fn)
    }

    /// Emits `filter.destroyed` and releases the evaluator. Does not destroy
    /// the upstream source(s); that is the caller's responsibility.
    pub fn destroy(&self) -> Result<(), PipelineError> {
        if event::is_allowed_from(Component::Filter) {
            event::send_event(Event::new(Component::Filter, EventType::Destroyed, self.id.clone()));
        }
        self.evaluator.destroy()
    }
}

async fn run_filter(
    id: String,
    mut upstream_rx: ResultStream,
    upstream_cancel: CancelFn,
    evaluator: Arc<dyn FileEvaluator>,
    helper: Arc<CancellationHelper>,
    logger: Logger,
) {
    if event::is_allowed_from(Component::Filter) {
        event::send_event(Event::new(Component::Filter, EventType::Started, id.clone()));
    }

    let mut upstream_cancel = Some(upstream_cancel);

    loop {
        let next = tokio::select! {
            item = upstream_rx.recv() => Next::Item(item),
            _ = helper.cancelled() => Next::Cancelled,
        };

        match next {
            Next::Cancelled => {
                if let Some(cancel) = upstream_cancel.take() {
                    cancel.cancel(None);
                }
                finish(&id, &helper, EventType::Cancelled);
                return;
            }
            Next::Item(None) => {
                finish(&id, &helper, EventType::Finished);
                return;
            }
            Next::Item(Some(result)) => {
                let (file, error) = result.into_parts();

                if let Some(error) = error {
                    if !helper.send(PipelineResult::err(error)).await {
                        if let Some(cancel) = upstream_cancel.take() {
                            cancel.cancel(None);
                        }
                        finish(&id, &helper, EventType::Cancelled);
                        return;
                    }
                    continue;
                }

                let file = file.expect("PipelineResult invariant: file or error is populated");
                let keep = match panics::catch_fatal(|| evaluator.should_keep(&file)) {
                    Ok(inner) => inner,
                    Err(fatal) => {
                        logger.warn("fspipe::filter", &fatal.to_string());
                        Err(fatal)
                    }
                };

                // Unlike the plain upstream-error passthrough above, every outcome
                // the evaluator actually ran on (kept or erred) produces a
                // `resultProduced` event once its send succeeds.
                let outcome = match keep {
                    Ok(true) => Some(PipelineResult::ok(file)),
                    Ok(false) => None,
                    Err(err) => Some(PipelineResult::err(err)),
                };

                let Some(outcome) = outcome else {
                    continue;
                };

                if !helper.send(outcome).await {
                    if let Some(cancel) = upstream_cancel.take() {
                        cancel.cancel(None);
                    }
                    finish(&id, &helper, EventType::Cancelled);
                    return;
                }

                if event::is_allowed_from(Component::Filter) {
                    event::send_event(Event::new(Component::Filter, EventType::ResultProduced, id.clone()));
                }
            }
        }
    }
}

enum Next {
    Item(Option<PipelineResult>),
    Cancelled,
}

fn finish(id: &str, helper: &CancellationHelper, event_type: EventType) {
    if event::is_allowed_from(Component::Filter) {
        event::send_event(Event::new(Component::Filter, event_type, id.to_string()));
    }
    helper.finalize();
}
