// Copyright 2024 fspipe contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The error taxonomy described in the error-handling section of the design: one
//! matchable variant per construction failure, plus the `MultiError` aggregate
//! returned by [`MergedSource::destroy`](crate::merged::MergedSource::destroy).

use std::fmt;

/// Prefix applied to every error produced by the panic→error bridge (see
/// [`crate::panics`]).
pub const FATAL_ERROR_PREFIX: &str = "a fatal error occurred: ";

/// The distinguished message used for a `NewFilter`/`newMergedSource` call with
/// zero usable sources.
pub const NO_SOURCES_MESSAGE: &str = "no sources provided";

/// The distinguished message used when [`crate::source::NewSource`] is given a
/// null filesystem.
pub const NIL_FILESYSTEM_MESSAGE: &str = "cannot create source using a nil filesystem";

/// A typed error produced by this crate's constructors and stages.
///
/// Once a `PipelineError` is wrapped into a [`crate::result::PipelineResult`] and
/// sent downstream, it is opaque data: filters and merges pass it through
/// unchanged rather than inspecting its variant.
#[derive(Debug)]
pub enum PipelineError {
    /// An identifier failed the grammar in [`crate::identifier::validate_identifier`].
    InvalidIdentifier(String),
    /// `NewSource` was given a null filesystem.
    NilFilesystem,
    /// `NewFilter`/`newMergedSource` had no usable sources after sanitization.
    NoSources,
    /// A filesystem operation (`statFile`, `listFiles`, `readFile`, ...) failed.
    Filesystem(Box<dyn std::error::Error + Send + Sync>),
    /// A `FileEvaluator::should_keep` call returned an error.
    Evaluator(Box<dyn std::error::Error + Send + Sync>),
    /// User-supplied code (an evaluator or a filesystem method) panicked, or a
    /// spawned task unwound; see [`crate::panics`].
    Fatal(String),
    /// Aggregates the errors surfaced while destroying a merged source's children.
    Multi(MultiError),
}

impl PipelineError {
    /// Wraps an arbitrary filesystem error.
    pub fn filesystem<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PipelineError::Filesystem(Box::new(err))
    }

    /// Wraps an arbitrary evaluator error.
    pub fn evaluator<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PipelineError::Evaluator(Box::new(err))
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InvalidIdentifier(id) => write!(f, "invalid identifier: {id:?}"),
            PipelineError::NilFilesystem => write!(f, "{NIL_FILESYSTEM_MESSAGE}"),
            PipelineError::NoSources => write!(f, "{NO_SOURCES_MESSAGE}"),
            PipelineError::Filesystem(err) => write!(f, "{err}"),
            PipelineError::Evaluator(err) => write!(f, "{err}"),
            PipelineError::Fatal(message) => write!(f, "{FATAL_ERROR_PREFIX}{message}"),
            PipelineError::Multi(multi) => write!(f, "{multi}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Filesystem(err) | PipelineError::Evaluator(err) => {
                Some(err.as_ref())
            }
            PipelineError::Multi(multi) => Some(multi),
            _ => None,
        }
    }
}

impl From<MultiError> for PipelineError {
    fn from(multi: MultiError) -> Self {
        PipelineError::Multi(multi)
    }
}

/// Aggregates N underlying errors under one top-level message.
///
/// Iteration order (via [`MultiError::causes`]) preserves insertion order.
#[derive(Debug)]
pub struct MultiError {
    message: String,
    causes: Vec<PipelineError>,
}

impl MultiError {
    /// Builds a `MultiError`, or returns `None` if `causes` is empty (in which
    /// case there is nothing to aggregate and the caller should not surface an
    /// error at all).
    pub fn new(message: impl Into<String>, causes: Vec<PipelineError>) -> Option<Self> {
        if causes.is_empty() {
            None
        } else {
            Some(MultiError {
                message: message.into(),
                causes,
            })
        }
    }

    /// The underlying causes, in the order they were collected.
    pub fn causes(&self) -> &[PipelineError] {
        &self.causes
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for MultiError {}
