// Copyright 2024 fspipe contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! [`MergedSource`]: fan-in over N sources into a single lazy, cancellable
//! [`PipelineResult`] stream, preserving per-child cancellation.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::cancel::CancellationHelper;
use crate::error::{MultiError, PipelineError};
use crate::executor::Executor;
use crate::result::{CancelFn, PipelineResult, ResultStream, CHANNEL_CAPACITY};
use crate::source::SourceLike;
use crate::PipelineContext;

/// A fan-in composite of ≥2 sources, built by [`MergedSource::new`].
pub struct MergedSource {
    children: Vec<Arc<dyn SourceLike>>,
    executor: Executor,
}

impl MergedSource {
    /// Sanitizes `sources` (drops duplicates by `Arc` identity) and builds the
    /// appropriate upstream: zero sanitized sources fails with
    /// [`PipelineError::NoSources`]; exactly one is returned unchanged, with no
    /// merge wrapper; two or more are wrapped in a `MergedSource`.
    pub fn new(sources: Vec<Arc<dyn SourceLike>>) -> Result<Arc<dyn SourceLike>, PipelineError> {
        let mut sanitized: Vec<Arc<dyn SourceLike>> = Vec::new();
        for source in sources {
            if sanitized.iter().any(|existing| Arc::ptr_eq(existing, &source)) {
                continue;
            }
            sanitized.push(source);
        }

        match sanitized.len() {
            0 => Err(PipelineError::NoSources),
            1 => Ok(sanitized.into_iter().next().expect("checked len == 1")),
            _ => Ok(Arc::new(MergedSource { children: sanitized, executor: Executor::new() })),
        }
    }
}

#[async_trait]
impl SourceLike for MergedSource {
    /// Merged sources have no identifier of their own; this is an opaque tag
    /// used only where a `SourceLike` implementor is expected to have one, and
    /// carries no structural meaning.
    fn id(&self) -> &str {
        "merged"
    }

    fn files(&self, context: &PipelineContext) -> (ResultStream, CancelFn) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let helper = CancellationHelper::new(tx);
        let cancel_fn = helper.invoker();

        let children = self.children.clone();
        let worker_context = context.copy();
        let finalize_helper = Arc::clone(&helper);

        self.executor.spawn(async move {
            let mut join_set = JoinSet::new();
            let mut child_cancels = Vec::with_capacity(children.len());

            for child in &children {
                let (mut child_rx, child_cancel) = child.files(&worker_context);
                child_cancels.push(child_cancel);
                let worker_helper = Arc::clone(&finalize_helper);
                join_set.spawn(async move {
                    while let Some(item) = child_rx.recv().await {
                        if !worker_helper.send(item).await {
                            break;
                        }
                    }
                });
            }

            let cancel_helper = Arc::clone(&finalize_helper);
            let wait = async move {
                let propagate_cancellation = async {
                    cancel_helper.cancelled().await;
                    for cancel in child_cancels {
                        cancel.cancel(None);
                    }
                };
                tokio::pin!(propagate_cancellation);

                loop {
                    tokio::select! {
                        next = join_set.join_next() => {
                            if next.is_none() {
                                break;
                            }
                        }
                        _ = &mut propagate_cancellation => {
                            while join_set.join_next().await.is_some() {}
                            break;
                        }
                    }
                }
            };

            finalize_helper.finalize_after(wait).await;
        });

        (rx, cancel_fn)
    }

    /// Destroys every child, aggregating any failures into a `MultiError`
    /// under a fixed message.
    async fn destroy(&self) -> Result<(), PipelineError> {
        let mut causes = Vec::new();
        for child in &self.children {
            if let Err(err) = child.destroy().await {
                causes.push(err);
            }
        }

        match MultiError::new("an error occurred while destroying the source", causes) {
            Some(multi) => Err(PipelineError::Multi(multi)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Debug)]
    struct StubFsError(String);

    impl std::fmt::Display for StubFsError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for StubFsError {}

    struct StubSource {
        id: String,
        items: StdMutex<Vec<PipelineResult>>,
        destroy_error: StdMutex<Option<PipelineError>>,
        destroy_calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SourceLike for StubSource {
        fn id(&self) -> &str {
            &self.id
        }

        fn files(&self, _context: &PipelineContext) -> (ResultStream, CancelFn) {
            let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
            let items = std::mem::take(&mut *self.items.lock().unwrap());
            tokio::spawn(async move {
                for item in items {
                    if tx.send(item).await.is_err() {
                        break;
                    }
                }
            });
            let cancel = crate::cancel::CancellationHelper::new(mpsc::channel(1).0).invoker();
            (rx, cancel)
        }

        async fn destroy(&self) -> Result<(), PipelineError> {
            self.destroy_calls.fetch_add(1, Ordering::SeqCst);
            match self.destroy_error.lock().unwrap().take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    fn ok_result(name: &str) -> PipelineResult {
        // A lightweight stand-in: tests only assert on error/ok discrimination and
        // counts, not on file contents, so a minimal in-memory file is enough.
        use crate::file::FileInfo;
        use crate::filesystem::Filesystem;
        use std::time::SystemTime;

        struct NoopFs;
        #[async_trait]
        impl Filesystem for NoopFs {
            fn absolute_path(&self, path: &str) -> Result<String, PipelineError> {
                Ok(path.to_string())
            }
            async fn list_files(&self, _path: &str) -> Result<Vec<FileInfo>, PipelineError> {
                Ok(Vec::new())
            }
            async fn read_file(&self, _path: &str) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>, PipelineError> {
                unimplemented!()
            }
            async fn stat_file(&self, _path: &str) -> Result<FileInfo, PipelineError> {
                unimplemented!()
            }
            async fn destroy(&self) -> Result<(), PipelineError> {
                Ok(())
            }
        }

        let info = FileInfo::new(name, 1, SystemTime::UNIX_EPOCH, false, 0o644);
        let file = crate::file::File::new(crate::path::FilePath::new(vec![], name, "/"), &info, Arc::new(NoopFs), "stub");
        PipelineResult::ok(file)
    }

    fn stub(id: &str, names: &[&str], destroy_error: Option<&str>) -> Arc<StubSource> {
        Arc::new(StubSource {
            id: id.to_string(),
            items: StdMutex::new(names.iter().map(|n| ok_result(n)).collect()),
            destroy_error: StdMutex::new(destroy_error.map(|m| PipelineError::Fatal(m.to_string()))),
            destroy_calls: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn stub_with_filesystem_error(id: &str, message: &str) -> Arc<StubSource> {
        Arc::new(StubSource {
            id: id.to_string(),
            items: StdMutex::new(Vec::new()),
            destroy_error: StdMutex::new(Some(PipelineError::filesystem(StubFsError(message.to_string())))),
            destroy_calls: Arc::new(AtomicUsize::new(0)),
        })
    }

    #[tokio::test]
    async fn zero_sources_fails_with_no_sources() {
        let result = MergedSource::new(Vec::new());
        assert!(matches!(result.unwrap_err(), PipelineError::NoSources));
    }

    #[tokio::test]
    async fn a_single_source_is_returned_unwrapped() {
        let source = stub("s1", &["a.test"], None);
        let merged = MergedSource::new(vec![source.clone() as Arc<dyn SourceLike>]).unwrap();
        assert_eq!(merged.id(), "s1");
    }

    #[tokio::test]
    async fn duplicate_sources_are_deduplicated_by_identity() {
        let s1 = stub("s1", &["a.test"], None) as Arc<dyn SourceLike>;
        let s2 = stub("s2", &["b.test"], None) as Arc<dyn SourceLike>;
        let merged = MergedSource::new(vec![s1.clone(), s2.clone(), s1.clone(), s2.clone()]).unwrap();
        assert_eq!(merged.id(), "merged");

        let context = PipelineContext::detached(ContextConfig::default(), std::io::sink());
        let (mut rx, _cancel) = merged.files(&context);
        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn destroy_aggregates_child_failures_in_order() {
        let s1 = stub("s1", &[], Some("source1")) as Arc<dyn SourceLike>;
        let s2 = stub("s2", &[], Some("source2")) as Arc<dyn SourceLike>;
        let s3 = stub_with_filesystem_error("s3", "source3") as Arc<dyn SourceLike>;
        let merged = MergedSource::new(vec![s1, s2, s3]).unwrap();

        let err = merged.destroy().await.unwrap_err();
        match err {
            PipelineError::Multi(multi) => {
                let causes = multi.causes();
                let rendered: Vec<String> = causes.iter().map(ToString::to_string).collect();
                assert_eq!(
                    rendered,
                    vec![
                        format!("{}source1", crate::error::FATAL_ERROR_PREFIX),
                        format!("{}source2", crate::error::FATAL_ERROR_PREFIX),
                        // A plain Filesystem error keeps its own rendering, not
                        // Fatal's fixed prefix.
                        "source3".to_string(),
                    ]
                );
                assert!(matches!(causes[2], PipelineError::Filesystem(_)));
            }
            other => panic!("expected MultiError, got {other:?}"),
        }
    }
}
