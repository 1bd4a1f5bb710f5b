//! The process-wide dynamic linker, as an explicit capability.
//!
//! Opening a library with global visibility mutates state shared by the
//! whole process: its exported symbols become resolvable by every library
//! opened afterwards. Instead of calling the OS loader directly, the opener
//! goes through a [`Linker`] handed to it in the load context, so tests can
//! swap in [`RecordingLinker`] and assert exactly which files were opened
//! and closed.
//!
//! # Implementation Note: global visibility
//!
//! On Unix, [`SystemLinker`] opens with `RTLD_NOW | RTLD_GLOBAL`. `RTLD_NOW`
//! resolves every undefined symbol at open time, so a missing dependency
//! fails here rather than on first call. `RTLD_GLOBAL` publishes the
//! library's symbols so a dependent package opened later links against
//! this copy instead of loading its own. Windows has no equivalent flag;
//! exports of a loaded module are already visible to the loader.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use nativepkg_schema::PlatformKey;
use thiserror::Error;

/// Why a library file could not be opened.
#[derive(Error, Debug)]
pub enum OpenFailure {
    /// Nothing exists at the path.
    #[error("file not found")]
    NotFound,

    /// The package ships no directory for the resolved platform.
    #[error("no platform directory for '{0}'")]
    UnsupportedPlatform(PlatformKey),

    /// The OS loader refused the file (format/ABI mismatch, unresolved
    /// symbol, ...).
    #[error("{0}")]
    Rejected(String),

    /// Filesystem error while locating the file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Opens shared libraries into the process-wide symbol namespace.
pub trait Linker: Send + Sync {
    /// Opens `path` with immediate symbol resolution and global visibility.
    ///
    /// Called from the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns [`OpenFailure::NotFound`] for a missing file and
    /// [`OpenFailure::Rejected`] when the loader refuses it.
    fn open_global(&self, path: &Path) -> Result<Box<dyn LinkedLibrary>, OpenFailure>;
}

/// A library opened by a [`Linker`].
pub trait LinkedLibrary: Send + Sync + fmt::Debug {
    /// Closes the OS handle.
    ///
    /// # Errors
    ///
    /// Returns the loader's message if the handle could not be closed.
    fn close(self: Box<Self>) -> Result<(), String>;
}

type LiveOpens = Arc<Mutex<HashMap<PathBuf, usize>>>;

/// The real OS loader.
///
/// Performs no deduplication: every open goes to the OS, which reference
/// counts the handle. Live opens are tracked per canonical path only to
/// warn when two instances share one file, since they then share (and
/// may fight over) the same global symbols.
#[derive(Debug, Clone, Default)]
pub struct SystemLinker {
    live: LiveOpens,
}

impl SystemLinker {
    /// Creates a linker with an empty open registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live handles this linker holds for `path`.
    pub fn live_count(&self, path: &Path) -> usize {
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&canonical)
            .copied()
            .unwrap_or(0)
    }
}

impl Linker for SystemLinker {
    fn open_global(&self, path: &Path) -> Result<Box<dyn LinkedLibrary>, OpenFailure> {
        let canonical = match std::fs::canonicalize(path) {
            Ok(p) => p,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OpenFailure::NotFound);
            }
            Err(e) => return Err(e.into()),
        };

        let library = open_raw(&canonical).map_err(|e| OpenFailure::Rejected(e.to_string()))?;

        let count = {
            let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
            let count = live.entry(canonical.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if count > 1 {
            tracing::warn!(
                "{} is open in {count} live instances; they share one global symbol namespace",
                canonical.display()
            );
        }

        Ok(Box::new(SystemLibrary {
            path: canonical,
            library: Some(library),
            live: Arc::clone(&self.live),
        }))
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn open_raw(path: &Path) -> Result<libloading::Library, libloading::Error> {
    use libloading::os::unix::{Library, RTLD_GLOBAL, RTLD_NOW};

    // SAFETY: loading a library runs its initializers. The manifest only
    // lists libraries shipped inside this package, which are trusted to be
    // well-formed for the platform directory they were placed in.
    let library = unsafe { Library::open(Some(path), RTLD_NOW | RTLD_GLOBAL) }?;
    Ok(library.into())
}

#[cfg(windows)]
#[allow(unsafe_code)]
fn open_raw(path: &Path) -> Result<libloading::Library, libloading::Error> {
    // SAFETY: see the Unix variant; initializers of packaged DLLs are trusted.
    let library = unsafe { libloading::os::windows::Library::new(path) }?;
    Ok(library.into())
}

/// Counts as live in the registry until dropped, whether or not it was
/// closed explicitly.
struct SystemLibrary {
    path: PathBuf,
    library: Option<libloading::Library>,
    live: LiveOpens,
}

impl fmt::Debug for SystemLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl LinkedLibrary for SystemLibrary {
    fn close(mut self: Box<Self>) -> Result<(), String> {
        match self.library.take() {
            Some(library) => library.close().map_err(|e| e.to_string()),
            None => Ok(()),
        }
    }
}

impl Drop for SystemLibrary {
    fn drop(&mut self) {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = live.get_mut(&self.path) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                live.remove(&self.path);
            }
        }
    }
}

/// One call observed by a [`RecordingLinker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A file was opened.
    Opened(PathBuf),
    /// A handle was closed successfully.
    Closed(PathBuf),
}

#[derive(Debug, Default)]
struct Recording {
    events: Vec<LinkEvent>,
    rejected: HashMap<String, String>,
    failing_close: HashSet<String>,
}

/// A fake linker that never touches the OS loader.
///
/// Opens succeed for any path that exists on disk and are recorded in
/// order. Files can be marked as rejected (simulating an ABI mismatch or
/// an unresolved symbol) or as failing to close, matched by file name.
#[derive(Debug, Clone, Default)]
pub struct RecordingLinker {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingLinker {
    /// Creates a linker with an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes opens of files named `file_name` fail with `reason`.
    pub fn rejecting(self, file_name: &str, reason: &str) -> Self {
        self.lock()
            .rejected
            .insert(file_name.to_string(), reason.to_string());
        self
    }

    /// Makes closes of files named `file_name` fail.
    pub fn failing_close(self, file_name: &str) -> Self {
        self.lock().failing_close.insert(file_name.to_string());
        self
    }

    /// Every event so far, in call order.
    pub fn events(&self) -> Vec<LinkEvent> {
        self.lock().events.clone()
    }

    /// Paths opened so far, in call order.
    pub fn opened(&self) -> Vec<PathBuf> {
        self.filter(|e| match e {
            LinkEvent::Opened(p) => Some(p.clone()),
            LinkEvent::Closed(_) => None,
        })
    }

    /// Paths closed so far, in call order.
    pub fn closed(&self) -> Vec<PathBuf> {
        self.filter(|e| match e {
            LinkEvent::Closed(p) => Some(p.clone()),
            LinkEvent::Opened(_) => None,
        })
    }

    /// Paths opened and not yet closed.
    pub fn live(&self) -> Vec<PathBuf> {
        let mut live = self.opened();
        for closed in self.closed() {
            if let Some(pos) = live.iter().position(|p| *p == closed) {
                live.remove(pos);
            }
        }
        live
    }

    fn filter(&self, f: impl Fn(&LinkEvent) -> Option<PathBuf>) -> Vec<PathBuf> {
        self.lock().events.iter().filter_map(f).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl Linker for RecordingLinker {
    fn open_global(&self, path: &Path) -> Result<Box<dyn LinkedLibrary>, OpenFailure> {
        let mut recording = self.lock();
        if let Some(reason) = recording.rejected.get(&file_name(path)) {
            return Err(OpenFailure::Rejected(reason.clone()));
        }
        if !path.exists() {
            return Err(OpenFailure::NotFound);
        }
        recording.events.push(LinkEvent::Opened(path.to_path_buf()));
        Ok(Box::new(RecordedLibrary {
            path: path.to_path_buf(),
            inner: Arc::clone(&self.inner),
        }))
    }
}

#[derive(Debug)]
struct RecordedLibrary {
    path: PathBuf,
    inner: Arc<Mutex<Recording>>,
}

impl LinkedLibrary for RecordedLibrary {
    fn close(self: Box<Self>) -> Result<(), String> {
        let mut recording = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if recording.failing_close.contains(&file_name(&self.path)) {
            return Err("simulated close failure".to_string());
        }
        recording.events.push(LinkEvent::Closed(self.path.clone()));
        Ok(())
    }
}
