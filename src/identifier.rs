// Copyright 2024 fspipe contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Validation for the dot-separated alphanumeric stage identifiers used by
//! [`Source`](crate::source::Source) and [`Filter`](crate::filter::Filter).

use std::sync::LazyLock;

use regex::Regex;

use crate::error::PipelineError;

/// `[A-Za-z0-9]+(\.[A-Za-z0-9]+)*`, anchored on both ends.
///
/// This is the sole normative definition of a valid identifier: no leading or
/// trailing whitespace, no empty segments, no punctuation other than the `.`
/// segment separator.
static IDENTIFIER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+(\.[A-Za-z0-9]+)*$").unwrap());

/// Validates `id` against the identifier grammar, returning it (owned) on success.
pub fn validate_identifier(id: &str) -> Result<String, PipelineError> {
    if IDENTIFIER_PATTERN.is_match(id) {
        Ok(id.to_string())
    } else {
        Err(PipelineError::InvalidIdentifier(id.to_string()))
    }
}
