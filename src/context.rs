// Copyright 2024 fspipe contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! [`PipelineContext`]: the logger handle and free-form variable bag threaded
//! through one pipeline run.

use std::collections::HashMap;
use std::io::Write as IoWrite;

use log::LevelFilter;
use serde_json::Value;

use crate::logging::{self, Logger, LoggerConfig};

/// Configuration for [`PipelineContext::new`].
#[derive(Clone, Copy, Debug)]
pub struct ContextConfig {
    pub level: LevelFilter,
    pub use_json: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            level: LevelFilter::Info,
            use_json: false,
        }
    }
}

/// Per-run state threaded through every stage: a logger handle and a
/// free-form variable bag.
///
/// The core only ever reads [`PipelineContext::logger`]; `vars` is a
/// caller-facing convenience (e.g. attaching a request id) with no behavior
/// contract beyond [`PipelineContext::copy`] producing an independent bag.
#[derive(Clone)]
pub struct PipelineContext {
    logger: Logger,
    vars: HashMap<String, Value>,
}

impl PipelineContext {
    /// Builds a context around a freshly configured logger writing to stderr,
    /// installed as the process-wide `log` facade logger (at most once per
    /// process; see [`logging::install`]).
    pub fn new(config: ContextConfig) -> Self {
        let logger = logging::install(LoggerConfig {
            level: config.level,
            use_json: config.use_json,
        });
        PipelineContext { logger, vars: HashMap::new() }
    }

    /// As [`PipelineContext::new`], writing to `writer` instead of stderr.
    pub fn with_writer<W: IoWrite + Send + 'static>(config: ContextConfig, writer: W) -> Self {
        let logger = logging::install_with_writer(
            LoggerConfig { level: config.level, use_json: config.use_json },
            writer,
        );
        PipelineContext { logger, vars: HashMap::new() }
    }

    /// Builds a context around a detached logger (see [`logging::detached`]),
    /// for tests that need isolated logger state.
    pub fn detached<W: IoWrite + Send + 'static>(config: ContextConfig, writer: W) -> Self {
        let logger = logging::detached(
            LoggerConfig { level: config.level, use_json: config.use_json },
            writer,
        );
        PipelineContext { logger, vars: HashMap::new() }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn vars(&self) -> &HashMap<String, Value> {
        &self.vars
    }

    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get_var(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Produces an independent context: the logger handle is shared (cheap,
    /// `Arc`-backed), but `vars` is deep-copied, so mutating the copy's vars
    /// never affects the original's.
    pub fn copy(&self) -> Self {
        PipelineContext {
            logger: self.logger.clone(),
            vars: self.vars.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context() -> PipelineContext {
        PipelineContext::detached(ContextConfig::default(), std::io::sink())
    }

    #[test]
    fn copy_shares_logger_but_not_vars() {
        let mut original = test_context();
        original.set_var("request_id", "r-1");

        let mut copy = original.copy();
        copy.set_var("request_id", "r-2");
        copy.set_var("extra", "only-on-copy");

        assert_eq!(original.get_var("request_id").unwrap(), "r-1");
        assert_eq!(copy.get_var("request_id").unwrap(), "r-2");
        assert!(original.get_var("extra").is_none());
    }

    #[test]
    fn fresh_context_has_an_empty_var_bag() {
        let context = test_context();
        assert!(context.vars().is_empty());
    }
}
