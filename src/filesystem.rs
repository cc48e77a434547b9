// Copyright 2024 fspipe contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The narrow [`Filesystem`] contract the streaming core depends on. Concrete
//! backends (local disk, SMB, an in-memory test double) are external
//! collaborators that implement this trait; the core never assumes more than
//! this interface exposes.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::PipelineError;
use crate::file::FileInfo;

/// A capability the streaming core depends on for path math, directory
/// listing, and byte-level reads.
///
/// Paths passed to [`list_files`](Filesystem::list_files)/[`stat_file`](Filesystem::stat_file)
/// are absolute (prefixed with the filesystem's configured root); paths passed
/// to [`read_file`](Filesystem::read_file) are relative to that root.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Canonicalizes `path`: resolves `.`/`..` segments and normalizes
    /// separators, without touching any I/O state. Idempotent.
    ///
    /// The default splits on [`path_separator`](Filesystem::path_separator),
    /// drops `.` segments, pops the previous segment on `..`, and rejoins with
    /// a single leading separator.
    fn absolute_path(&self, path: &str) -> Result<String, PipelineError> {
        let separator = self.path_separator();
        let mut normalized: Vec<&str> = Vec::new();
        for segment in path.split(separator).filter(|s| !s.is_empty()) {
            match segment {
                "." => {}
                ".." => {
                    normalized.pop();
                }
                _ => normalized.push(segment),
            }
        }
        Ok(format!("{separator}{}", normalized.join(separator)))
    }

    /// The last segment of `path`.
    fn base_part(&self, path: &str) -> String {
        path.rsplit(self.path_separator())
            .next()
            .unwrap_or(path)
            .to_string()
    }

    /// All segments of `path` except the last; empty for a path with no
    /// directory component.
    fn dir_part(&self, path: &str) -> Vec<String> {
        let separator = self.path_separator();
        let mut segments: Vec<&str> = path.split(separator).filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Vec::new();
        }
        segments.pop();
        segments.into_iter().map(str::to_string).collect()
    }

    /// The separator this filesystem uses when serializing paths. Defaults to
    /// `/`.
    fn path_separator(&self) -> &str {
        "/"
    }

    /// Lists the immediate children of `path`. If `path` names a file, returns
    /// a single-element listing for that file; an empty directory yields an
    /// empty listing.
    async fn list_files(&self, path: &str) -> Result<Vec<FileInfo>, PipelineError>;

    /// Opens `path` (relative to the filesystem's root) for reading. The
    /// returned stream is scoped to the caller, who must release it.
    async fn read_file(&self, path: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>, PipelineError>;

    /// Stat information for one entity at `path`.
    async fn stat_file(&self, path: &str) -> Result<FileInfo, PipelineError>;

    /// Releases filesystem-level resources. At-most-once per filesystem is the
    /// caller's responsibility; the core never calls this more than once per
    /// `destroy()` invocation on the owning Source.
    async fn destroy(&self) -> Result<(), PipelineError>;
}
