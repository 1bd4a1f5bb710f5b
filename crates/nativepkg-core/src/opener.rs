//! Opens a package's library files into the global symbol namespace.
//!
//! Every file in the manifest is opened concurrently on the blocking pool.
//! There is no ordering between them: if one library needs symbols from a
//! sibling, the sibling must already be resolvable (usually because it
//! belongs to a dependency package, which is loaded before the dependent's
//! headers are used). Getting that right is the manifest author's job.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use futures::stream::FuturesUnordered;

use crate::error::{Error, Result};
use crate::linker::{LinkedLibrary, Linker, OpenFailure};

/// An opened library file.
///
/// Owns the OS handle until it is released. Releasing happens once; later
/// attempts are no-ops.
#[derive(Debug)]
pub struct LibraryFileHandle {
    file: String,
    path: PathBuf,
    handle: Mutex<Option<Box<dyn LinkedLibrary>>>,
}

impl LibraryFileHandle {
    fn new(file: String, path: PathBuf, handle: Box<dyn LinkedLibrary>) -> Self {
        Self {
            file,
            path,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// The file as listed in the manifest.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Absolute path that was opened.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the OS handle is still held.
    pub fn is_open(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Closes the OS handle. Returns `false` if it was already released.
    pub(crate) fn release(&self) -> Result<bool> {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return Ok(false);
        };
        handle.close().map_err(|reason| Error::Release {
            path: self.path.clone(),
            reason,
        })?;
        tracing::debug!("Released {}", self.path.display());
        Ok(true)
    }
}

/// Opens every file in `files`, relative to `platform_dir`.
///
/// Returns the handles in the order the opens completed. If any file
/// fails, the ones that did open are released again and the failures are
/// returned (aggregated when there are several), so callers never see a
/// partial set.
pub(crate) async fn open_libraries(
    platform_dir: &Path,
    files: &[String],
    linker: &Arc<dyn Linker>,
) -> Result<Vec<Arc<LibraryFileHandle>>> {
    let mut pending: FuturesUnordered<_> = files
        .iter()
        .map(|file| open_one(platform_dir.join(file), file.clone(), Arc::clone(linker)))
        .collect();

    let mut opened = Vec::with_capacity(files.len());
    let mut errors = Vec::new();
    while let Some(result) = pending.next().await {
        match result {
            Ok(handle) => {
                tracing::debug!("Opened {}", handle.path.display());
                opened.push(Arc::new(handle));
            }
            Err(e) => errors.push(e),
        }
    }

    if let Some(err) = Error::aggregate(errors) {
        for failure in release_libraries(&opened).await {
            tracing::warn!("Rollback after failed open: {failure}");
        }
        return Err(err);
    }

    Ok(opened)
}

async fn open_one(path: PathBuf, file: String, linker: Arc<dyn Linker>) -> Result<LibraryFileHandle> {
    let task_path = path.clone();
    match tokio::task::spawn_blocking(move || linker.open_global(&task_path)).await {
        Ok(Ok(handle)) => Ok(LibraryFileHandle::new(file, path, handle)),
        Ok(Err(source)) => Err(Error::Open { path, source }),
        Err(e) => Err(Error::Open {
            path,
            source: OpenFailure::Rejected(format!("open task panicked: {e}")),
        }),
    }
}

/// Releases `handles` in reverse order, attempting every one of them.
///
/// Returns every failure rather than stopping at the first.
pub(crate) async fn release_libraries(handles: &[Arc<LibraryFileHandle>]) -> Vec<Error> {
    let handles: Vec<_> = handles.iter().rev().cloned().collect();
    let paths: Vec<PathBuf> = handles.iter().map(|h| h.path.clone()).collect();

    match tokio::task::spawn_blocking(move || {
        handles
            .iter()
            .filter_map(|h| h.release().err())
            .collect::<Vec<_>>()
    })
    .await
    {
        Ok(errors) => errors,
        Err(e) => paths
            .into_iter()
            .map(|path| Error::Release {
                path,
                reason: format!("release task panicked: {e}"),
            })
            .collect(),
    }
}
