// Copyright 2024 fspipe contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! [`Source`]: wraps a [`Filesystem`] + root + recursion flag into a lazy,
//! cancellable [`PipelineResult`] stream.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::FutureExt;
use tokio::sync::mpsc;

use crate::cancel::CancellationHelper;
use crate::error::PipelineError;
use crate::event::{self, Component, Event, EventType};
use crate::executor::Executor;
use crate::filesystem::Filesystem;
use crate::logging::Logger;
use crate::panics;
use crate::result::{CancelFn, PipelineResult, ResultStream, CHANNEL_CAPACITY};
use crate::stepper::PathStepper;
use crate::PipelineContext;

/// The interface [`crate::merged::MergedSource`] and [`crate::filter::Filter`]
/// consume: anything that produces a lazy, cancellable `PipelineResult`
/// stream and can be destroyed. Implemented by both [`Source`] and
/// [`crate::merged::MergedSource`], so a `Filter` (or a merge) can sit
/// upstream of either without caring which.
#[async_trait]
pub trait SourceLike: Send + Sync {
    fn id(&self) -> &str;
    fn files(&self, context: &PipelineContext) -> (ResultStream, CancelFn);
    async fn destroy(&self) -> Result<(), PipelineError>;
}

/// Configuration for [`Source::new`].
pub struct SourceConfig {
    pub id: String,
    pub root: String,
    pub recurse: bool,
}

/// A lazy producer of [`PipelineResult`]s over one [`Filesystem`].
pub struct Source {
    id: String,
    root: String,
    recurse: bool,
    filesystem: Arc<dyn Filesystem>,
    executor: Executor,
}

impl Source {
    /// Validates `config.id` and builds a `Source`. Fails with
    /// [`PipelineError::NilFilesystem`] if `filesystem` is `None`, or with
    /// [`PipelineError::InvalidIdentifier`] if `config.id` doesn't match the
    /// identifier grammar.
    ///
    /// Emits `source.created` (iff the `source` component is allow-listed).
    pub fn new(config: SourceConfig, filesystem: Option<Arc<dyn Filesystem>>) -> Result<Self, PipelineError> {
        let filesystem = filesystem.ok_or(PipelineError::NilFilesystem)?;
        let id = crate::identifier::validate_identifier(&config.id)?;

        if event::is_allowed_from(Component::Source) {
            event::send_event(Event::new(Component::Source, EventType::Created, id.clone()));
        }

        Ok(Source {
            id,
            root: config.root,
            recurse: config.recurse,
            filesystem,
            executor: Executor::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Starts traversal on a background task and returns immediately.
    pub fn files(&self, context: &PipelineContext) -> (ResultStream, CancelFn) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let helper = CancellationHelper::new(tx);
        let cancel_fn = helper.invoker();

        let id = self.id.clone();
        let root = self.root.clone();
        let recurse = self.recurse;
        let filesystem = Arc::clone(&self.filesystem);
        let logger = context.logger().clone();
        let task_helper = Arc::clone(&helper);

        self.executor.spawn(async move {
            let produced_id = id.clone();
            let outcome = AssertUnwindSafe(run_source(
                id,
                root,
                recurse,
                filesystem,
                Arc::clone(&task_helper),
                logger.clone(),
            ))
            .catch_unwind()
            .await;

            if let Err(payload) = outcome {
                let fatal = PipelineError::Fatal(panics::payload_message(payload));
                logger.warn("fspipe::source", &fatal.to_string());
                task_helper.send(PipelineResult::err(fatal)).await;
                if event::is_allowed_from(Component::Source) {
                    event::send_event(Event::new(Component::Source, EventType::Finished, produced_id));
                }
                task_helper.finalize();
            }
        });

        (rx, cancel_fn)
    }

    /// Emits `source.destroyed` and forwards to the underlying filesystem.
    pub async fn destroy(&self) -> Result<(), PipelineError> {
        if event::is_allowed_from(Component::Source) {
            event::send_event(Event::new(Component::Source, EventType::Destroyed, self.id.clone()));
        }
        self.filesystem.destroy().await
    }
}

async fn run_source(
    id: String,
    root: String,
    recurse: bool,
    filesystem: Arc<dyn Filesystem>,
    helper: Arc<CancellationHelper>,
    logger: Logger,
) {
    if event::is_allowed_from(Component::Source) {
        event::send_event(Event::new(Component::Source, EventType::Started, id.clone()));
    }

    let stepper = tokio::select! {
        result = PathStepper::new(Arc::clone(&filesystem), &root, recurse) => result,
        _ = helper.cancelled() => {
            finish(&id, &helper, EventType::Cancelled);
            return;
        }
    };

    let mut stepper = match stepper {
        Ok(stepper) => stepper,
        Err(err) => {
            logger.warn("fspipe::source", &err.to_string());
            let sent = helper.send(PipelineResult::err(err)).await;
            finish(&id, &helper, if sent { EventType::Finished } else { EventType::Cancelled });
            return;
        }
    };

    loop {
        let next = tokio::select! {
            result = stepper.next_file(&id) => result,
            _ = helper.cancelled() => {
                finish(&id, &helper, EventType::Cancelled);
                return;
            }
        };

        match next {
            Ok(Some(file)) => {
                if !helper.send(PipelineResult::ok(file)).await {
                    finish(&id, &helper, EventType::Cancelled);
                    return;
                }
                if event::is_allowed_from(Component::Source) {
                    event::send_event(Event::new(Component::Source, EventType::ResultProduced, id.clone()));
                }
            }
            Ok(None) => {
                finish(&id, &helper, EventType::Finished);
                return;
            }
            Err(err) => {
                logger.warn("fspipe::source", &err.to_string());
                let sent = helper.send(PipelineResult::err(err)).await;
                finish(&id, &helper, if sent { EventType::Finished } else { EventType::Cancelled });
                return;
            }
        }
    }
}

fn finish(id: &str, helper: &CancellationHelper, event_type: EventType) {
    if event::is_allowed_from(Component::Source) {
        event::send_event(Event::new(Component::Source, event_type, id.to_string()));
    }
    helper.finalize();
}

#[async_trait]
impl SourceLike for Source {
    fn id(&self) -> &str {
        Source::id(self)
    }

    fn files(&self, context: &PipelineContext) -> (ResultStream, CancelFn) {
        Source::files(self, context)
    }

    async fn destroy(&self) -> Result<(), PipelineError> {
        Source::destroy(self).await
    }
}
