// Copyright 2024 fspipe contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A library for building file-processing pipelines over pluggable filesystems.
//!
//! The composition is always linear: one or more [`Source`](source::Source)s are
//! merged into a single stream, which is optionally narrowed by one or more
//! [`Filter`](filter::Filter)s. Every stage exposes the same lazy, cancellable
//! [`PipelineResult`](result::PipelineResult) stream contract, and every stage emits
//! structured lifecycle [`Event`](event::Event)s to a process-wide bus.
//!
//! This crate fixes the streaming/concurrency core and the narrow [`Filesystem`]
//! contract it depends on; concrete filesystem backends (local disk, SMB, ...) are
//! external collaborators that implement [`filesystem::Filesystem`].

pub(crate) mod cancel;
pub mod context;
pub mod error;
pub mod event;
pub mod executor;
pub mod file;
pub mod filesystem;
pub mod filter;
pub mod identifier;
pub mod logging;
pub mod merged;
pub mod panics;
pub mod path;
pub mod result;
pub mod source;
pub mod stepper;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;


pub use context::PipelineContext;
pub use error::{MultiError, PipelineError};
pub use event::{Component, Event, EventSink, EventType};
pub use executor::Executor;
pub use file::{File, FileInfo};
pub use filesystem::Filesystem;
pub use filter::{FileEvaluator, Filter, FilterConfig, NilFileEvaluator};
pub use identifier::validate_identifier;
pub use merged::MergedSource;
pub use path::FilePath;
pub use result::{CancelFn, PipelineResult, ResultStream};
pub use source::{Source, SourceConfig, SourceLike};
