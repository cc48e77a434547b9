// Copyright 2024 fspipe contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! [`Executor`], a thin cloneable handle to the ambient tokio runtime that
//! every stage spawns its background task onto.
//!
//! Unlike a pool that owns its own `Runtime`, this `Executor` only ever
//! borrows a `Handle`: the caller's `#[tokio::main]`/`#[tokio::test]` runtime
//! outlives every `Executor` clone derived from it.

use std::future::Future;

use tokio::runtime::Handle;
use tokio::task::{JoinHandle, JoinSet};

/// A cloneable handle to the current tokio runtime.
#[derive(Debug, Clone)]
pub struct Executor {
    handle: Handle,
}

impl Executor {
    /// Captures the handle of the runtime the caller is currently executing on.
    ///
    /// Panics (per [`Handle::current`]) if called outside a tokio runtime.
    pub fn new() -> Self {
        Executor {
            handle: Handle::current(),
        }
    }

    /// Wraps an explicit handle, for callers that already hold one.
    pub fn from_handle(handle: Handle) -> Self {
        Executor { handle }
    }

    /// Spawns `future` as a new task, returning its `JoinHandle`.
    pub fn spawn<O, F>(&self, future: F) -> JoinHandle<O>
    where
        O: Send + 'static,
        F: Future<Output = O> + Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Spawns a blocking closure onto the runtime's blocking thread pool, for
    /// `Filesystem` implementations whose I/O is synchronous.
    pub fn spawn_blocking<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle.spawn_blocking(f)
    }

    /// A set of tasks spawned onto this executor, useful for fan-out stages
    /// (e.g. the merged source's per-child workers) that need to await all of
    /// them without tracking `JoinHandle`s individually.
    pub fn new_join_set<O: 'static>(&self) -> JoinSet<O> {
        JoinSet::new()
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}
