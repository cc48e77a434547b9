// Copyright 2024 fspipe contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! [`File`], the entity a [`Source`](crate::source::Source) emits, and the
//! event-instrumented reader returned by [`File::open_reader`].

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::SystemTime;

use tokio::io::{AsyncRead, ReadBuf};

use crate::error::PipelineError;
use crate::event::{self, Component, Event, EventType};
use crate::filesystem::Filesystem;
use crate::path::FilePath;

/// Raw stat information about one entity, as returned by
/// [`Filesystem::stat_file`]/[`Filesystem::list_files`].
#[derive(Clone, Debug, PartialEq)]
pub struct FileInfo {
    name: String,
    size: u64,
    modified: SystemTime,
    is_dir: bool,
    mode: u32,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, size: u64, modified: SystemTime, is_dir: bool, mode: u32) -> Self {
        FileInfo {
            name: name.into(),
            size,
            modified,
            is_dir,
            mode,
        }
    }

    /// The entity's name, relative to its parent directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }
}

/// One addressable entity inside a [`Filesystem`], owned by the
/// [`Source`](crate::source::Source) that produced it.
///
/// Opening a `File` yields an event-instrumented byte stream; the read
/// semantics of the underlying filesystem are preserved exactly, events are
/// purely observational.
pub struct File {
    path: FilePath,
    size: u64,
    modified: SystemTime,
    is_dir: bool,
    mode: u32,
    filesystem: Arc<dyn Filesystem>,
    source_id: String,
}

impl File {
    pub(crate) fn new(
        path: FilePath,
        info: &FileInfo,
        filesystem: Arc<dyn Filesystem>,
        source_id: impl Into<String>,
    ) -> Self {
        File {
            path,
            size: info.size(),
            modified: info.modified(),
            is_dir: info.is_dir(),
            mode: info.mode(),
            filesystem,
            source_id: source_id.into(),
        }
    }

    pub fn path(&self) -> &FilePath {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// The identifier of the source that produced this `File`, used only to
    /// tag the events emitted while reading it.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Opens this file for reading, relative to the owning filesystem's root.
    ///
    /// Emits `file.opened` once the underlying open succeeds, `file.read` after
    /// every non-empty read, and `file.closed` when the returned reader is
    /// dropped. Events are suppressed entirely when the `file` component isn't
    /// allow-listed on the event bus.
    pub async fn open_reader(&self) -> Result<EventedReader, PipelineError> {
        let rendered = self.path.render();
        let inner = self.filesystem.read_file(&rendered).await?;

        if event::is_allowed_from(Component::File) {
            event::send_event(
                Event::new(Component::File, EventType::Opened, self.source_id.clone())
                    .with_field("file", rendered.clone())
                    .with_field("length", self.size),
            );
        }

        Ok(EventedReader {
            inner,
            source_id: self.source_id.clone(),
            rendered_path: rendered,
        })
    }
}

/// A byte stream wrapping a filesystem's raw reader, emitting `file.read` on
/// every non-empty read and `file.closed` on drop.
pub struct EventedReader {
    inner: Box<dyn AsyncRead + Send + Unpin>,
    source_id: String,
    rendered_path: String,
}

impl AsyncRead for EventedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);

        if let Poll::Ready(Ok(())) = &poll {
            let read = buf.filled().len() - before;
            if read > 0 && event::is_allowed_from(Component::File) {
                event::send_event(
                    Event::new(Component::File, EventType::Read, self.source_id.clone())
                        .with_field("length", read as u64),
                );
            }
        }

        poll
    }
}

impl Drop for EventedReader {
    fn drop(&mut self) {
        if event::is_allowed_from(Component::File) {
            event::send_event(
                Event::new(Component::File, EventType::Closed, self.source_id.clone())
                    .with_field("file", self.rendered_path.clone()),
            );
        }
    }
}
