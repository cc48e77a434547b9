// Copyright 2024 fspipe contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! An in-memory [`Filesystem`] and a couple of evaluators, used to drive the
//! end-to-end scenarios in the project's test suite without a real disk.
//!
//! Not part of the public streaming contract: gated behind `test-util` so a
//! downstream crate can reuse it for its own integration tests without
//! pulling it into a release build.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context as TaskContext, Poll};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::PipelineError;
use crate::file::{File, FileInfo};
use crate::filesystem::Filesystem;
use crate::filter::FileEvaluator;

/// A node in a [`MemoryFilesystem`]'s tree.
pub enum Node {
    Dir(BTreeMap<String, Node>),
    File { content: Vec<u8>, mode: u32, modified: SystemTime },
}

/// Builds a directory node from `(name, node)` pairs.
pub fn dir<const N: usize>(entries: [(&str, Node); N]) -> Node {
    Node::Dir(entries.into_iter().map(|(name, node)| (name.to_string(), node)).collect())
}

/// Builds a leaf file node with the given content, default mode `0o644`.
pub fn file(content: impl Into<Vec<u8>>) -> Node {
    Node::File {
        content: content.into(),
        mode: 0o644,
        modified: SystemTime::UNIX_EPOCH,
    }
}

#[derive(Debug)]
struct MemoryFsError(String);

impl fmt::Display for MemoryFsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MemoryFsError {}

fn not_found(path: &str) -> PipelineError {
    PipelineError::filesystem(MemoryFsError(format!("no such path: {path}")))
}

fn injected_failure(path: &str, operation: &str) -> PipelineError {
    PipelineError::filesystem(MemoryFsError(format!("{operation} failed (injected): {path}")))
}

/// An in-memory [`Filesystem`] rooted at `/`, with knobs to make specific
/// paths fail `statFile`/`listFiles`/`readFile`.
pub struct MemoryFilesystem {
    root: Node,
    stat_failures: HashSet<String>,
    list_failures: HashSet<String>,
    read_failures: HashSet<String>,
    destroy_calls: Mutex<usize>,
}

impl MemoryFilesystem {
    pub fn new(root: Node) -> Self {
        MemoryFilesystem {
            root,
            stat_failures: HashSet::new(),
            list_failures: HashSet::new(),
            read_failures: HashSet::new(),
            destroy_calls: Mutex::new(0),
        }
    }

    pub fn fail_stat(mut self, path: impl Into<String>) -> Self {
        self.stat_failures.insert(path.into());
        self
    }

    pub fn fail_list(mut self, path: impl Into<String>) -> Self {
        self.list_failures.insert(path.into());
        self
    }

    pub fn fail_read(mut self, path: impl Into<String>) -> Self {
        self.read_failures.insert(path.into());
        self
    }

    pub fn destroy_call_count(&self) -> usize {
        *self.destroy_calls.lock().unwrap()
    }

    fn segments(path: &str) -> Vec<&str> {
        path.split('/').filter(|segment| !segment.is_empty()).collect()
    }

    fn node_at(&self, path: &str) -> Option<&Node> {
        let mut current = &self.root;
        for segment in Self::segments(path) {
            match current {
                Node::Dir(children) => current = children.get(segment)?,
                Node::File { .. } => return None,
            }
        }
        Some(current)
    }

    fn info_for(name: &str, node: &Node) -> FileInfo {
        match node {
            Node::Dir(_) => FileInfo::new(name, 0, SystemTime::UNIX_EPOCH, true, 0o755),
            Node::File { content, mode, modified } => {
                FileInfo::new(name, content.len() as u64, *modified, false, *mode)
            }
        }
    }
}

#[async_trait]
impl Filesystem for MemoryFilesystem {
    async fn list_files(&self, path: &str) -> Result<Vec<FileInfo>, PipelineError> {
        if self.list_failures.contains(path) {
            return Err(injected_failure(path, "listFiles"));
        }
        let node = self.node_at(path).ok_or_else(|| not_found(path))?;
        match node {
            Node::File { .. } => Ok(vec![Self::info_for(self.base_part(path).as_str(), node)]),
            Node::Dir(children) => Ok(children
                .iter()
                .map(|(name, child)| Self::info_for(name, child))
                .collect()),
        }
    }

    async fn read_file(&self, path: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>, PipelineError> {
        if self.read_failures.contains(path) {
            return Err(injected_failure(path, "readFile"));
        }
        match self.node_at(path).ok_or_else(|| not_found(path))? {
            Node::File { content, .. } => Ok(Box::new(MemoryReader { cursor: io::Cursor::new(content.clone()) })),
            Node::Dir(_) => Err(PipelineError::filesystem(MemoryFsError(format!("is a directory: {path}")))),
        }
    }

    async fn stat_file(&self, path: &str) -> Result<FileInfo, PipelineError> {
        if self.stat_failures.contains(path) {
            return Err(injected_failure(path, "statFile"));
        }
        let node = self.node_at(path).ok_or_else(|| not_found(path))?;
        Ok(Self::info_for(self.base_part(path).as_str(), node))
    }

    async fn destroy(&self) -> Result<(), PipelineError> {
        *self.destroy_calls.lock().unwrap() += 1;
        Ok(())
    }
}

struct MemoryReader {
    cursor: io::Cursor<Vec<u8>>,
}

impl AsyncRead for MemoryReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let unfilled = buf.initialize_unfilled();
        let read = io::Read::read(&mut self.cursor, unfilled)?;
        buf.advance(read);
        Poll::Ready(Ok(()))
    }
}

/// Keeps only files whose extension is in `keep`.
pub struct ExtensionEvaluator {
    keep: Vec<String>,
}

impl ExtensionEvaluator {
    pub fn new(keep: impl IntoIterator<Item = impl Into<String>>) -> Self {
        ExtensionEvaluator { keep: keep.into_iter().map(Into::into).collect() }
    }
}

impl FileEvaluator for ExtensionEvaluator {
    fn should_keep(&self, file: &File) -> Result<bool, PipelineError> {
        Ok(self.keep.iter().any(|ext| ext == file.path().extension()))
    }
}

/// An evaluator that panics with a fixed payload on every call, for exercising
/// the panic→error bridge.
pub struct PanickingEvaluator {
    payload: &'static str,
}

impl PanickingEvaluator {
    pub fn new(payload: &'static str) -> Self {
        PanickingEvaluator { payload }
    }
}

impl FileEvaluator for PanickingEvaluator {
    fn should_keep(&self, _file: &File) -> Result<bool, PipelineError> {
        panic!("{}", self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stat_and_list_and_read_round_trip() {
        let fs = MemoryFilesystem::new(dir([("a.test", file("hello"))]));
        let info = fs.stat_file("/a.test").await.unwrap();
        assert_eq!(info.size(), 5);
        assert!(!info.is_dir());

        let listing = fs.list_files("/").await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name(), "a.test");

        let mut reader = fs.read_file("a.test").await.unwrap();
        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buf).await.unwrap();
        assert_eq!(buf, b"hello");
    }

    #[tokio::test]
    async fn injected_failures_surface_as_filesystem_errors() {
        let fs = MemoryFilesystem::new(dir([("a.test", file("hello"))])).fail_stat("/a.test");
        assert!(fs.stat_file("/a.test").await.is_err());
    }

    #[tokio::test]
    async fn absolute_path_resolves_dot_dot_segments() {
        let fs = MemoryFilesystem::new(dir([("a.test", file("x"))]));
        assert_eq!(fs.absolute_path("/a/../a.test").unwrap(), "/a.test");
    }

    #[tokio::test]
    async fn destroy_is_not_guarded_against_repeated_calls() {
        let fs = MemoryFilesystem::new(dir([("a.test", file("x"))]));
        assert_eq!(fs.destroy_call_count(), 0);
        fs.destroy().await.unwrap();
        assert_eq!(fs.destroy_call_count(), 1);
        fs.destroy().await.unwrap();
        assert_eq!(fs.destroy_call_count(), 2);
    }
}
