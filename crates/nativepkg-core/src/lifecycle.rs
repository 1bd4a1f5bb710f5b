//! Library instance lifecycle.
//!
//! ```text
//! Unloaded --load()--> Loading --ok--> Loaded --unload()--> Unloading --> Released
//!    ^                    |
//!    +------- error ------+
//! ```
//!
//! `load()` is all-or-nothing: dependencies load and library files open
//! concurrently, and if either side fails the other side's acquisitions are
//! rolled back before the error is returned. `Released` is terminal;
//! loading again means creating a new instance. Calling an operation in
//! the wrong state is an [`Error::Lifecycle`], never a double open or a
//! double close of OS handles.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::future::Future;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use nativepkg_schema::HeaderBinding;

use crate::context::LoadContext;
use crate::deps::{self, LoadedDependency};
use crate::error::{Error, Operation, Result};
use crate::headers::{HeaderLoader, create_header_loaders};
use crate::opener::{self, LibraryFileHandle};
use crate::package::Package;

/// Where an instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Created, nothing acquired.
    Unloaded,
    /// `load()` in progress.
    Loading,
    /// Every dependency loaded and every library file open.
    Loaded,
    /// `unload()` in progress.
    Unloading,
    /// Unloaded for good.
    Released,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Unloading => "unloading",
            Self::Released => "released",
        })
    }
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unloaded,
            1 => Self::Loading,
            2 => Self::Loaded,
            3 => Self::Unloading,
            _ => Self::Released,
        }
    }
}

/// An instance's lifecycle state, readable without its lock.
///
/// Shared with the instance's header loaders.
#[derive(Debug)]
pub(crate) struct SharedState(AtomicU8);

impl SharedState {
    pub(crate) fn new(state: LifecycleState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: LifecycleState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

struct Loaded {
    /// In acquisition order.
    dependencies: Vec<LoadedDependency>,
    /// In acquisition order.
    libraries: Vec<Arc<LibraryFileHandle>>,
    headers: BTreeMap<String, HeaderLoader>,
}

enum State {
    Unloaded,
    Loading,
    Loaded(Loaded),
    Unloading,
    Released,
}

impl State {
    fn kind(&self) -> LifecycleState {
        match self {
            Self::Unloaded => LifecycleState::Unloaded,
            Self::Loading => LifecycleState::Loading,
            Self::Loaded(_) => LifecycleState::Loaded,
            Self::Unloading => LifecycleState::Unloading,
            Self::Released => LifecycleState::Released,
        }
    }
}

/// A native package and, once loaded, everything it acquired.
pub struct LibraryInstance {
    package: Package,
    ctx: LoadContext,
    state: Mutex<State>,
    shared: Arc<SharedState>,
}

impl fmt::Debug for LibraryInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryInstance")
            .field("package", &self.package.name())
            .field("platform", self.package.platform())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl LibraryInstance {
    /// Creates an unloaded instance.
    pub fn new(package: Package, ctx: LoadContext) -> Self {
        Self {
            package,
            ctx,
            state: Mutex::new(State::Unloaded),
            shared: Arc::new(SharedState::new(LifecycleState::Unloaded)),
        }
    }

    /// Reads the package at `root` for `ctx.platform` without loading it.
    ///
    /// # Errors
    ///
    /// See [`Package::open`].
    pub async fn open(root: impl AsRef<Path>, ctx: LoadContext) -> Result<Self> {
        let package = Package::open(root, &ctx.platform).await?;
        Ok(Self::new(package, ctx))
    }

    /// The package this instance loads.
    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Full package name.
    pub fn name(&self) -> &str {
        self.package.name()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lock().kind()
    }

    /// Loads dependencies and opens library files, then exposes headers.
    ///
    /// Resolves only after every dependency (recursively) has loaded and
    /// every library file is open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lifecycle`] unless the instance is
    /// [`LifecycleState::Unloaded`]. Otherwise returns the first
    /// [`Error::Resolution`] / [`Error::Open`] encountered, or an
    /// [`Error::Aggregate`] when several sibling operations failed, in the
    /// order they failed. On error nothing stays acquired and the instance
    /// is `Unloaded` again.
    ///
    /// Dropping the returned future before it completes also returns the
    /// instance to `Unloaded`. Handles opened so far are closed as they are
    /// dropped, without the ordered rollback.
    #[tracing::instrument(skip(self), fields(package = %self.name()))]
    pub async fn load(&self) -> Result<()> {
        self.load_in_chain(&[]).await
    }

    pub(crate) fn load_in_chain<'a>(&'a self, chain: &'a [String]) -> BoxFuture<'a, Result<()>> {
        async move {
            self.begin(Operation::Load, LifecycleState::Unloaded, State::Loading)?;
            let _reset = LoadingReset(self);

            let mut chain = chain.to_vec();
            chain.push(self.name().to_string());

            let platform_dir = self.package.platform_dir();
            let manifest = self.package.manifest();
            tracing::debug!(
                "Loading {} ({} dependencies, {} library files)",
                self.name(),
                manifest.library_dependencies.len(),
                manifest.library_files.len()
            );

            let finished = AtomicUsize::new(0);
            let ((dependencies, dependencies_done), (libraries, libraries_done)) = tokio::join!(
                sequenced(
                    &finished,
                    deps::load_dependencies(&self.package, &self.ctx, &chain)
                ),
                sequenced(
                    &finished,
                    opener::open_libraries(&platform_dir, &manifest.library_files, &self.ctx.linker)
                ),
            );

            let (dependencies, libraries) = match (dependencies, libraries) {
                (Ok(dependencies), Ok(libraries)) => (dependencies, libraries),
                (Ok(dependencies), Err(e)) => {
                    for failure in deps::unload_dependencies(&dependencies).await {
                        tracing::warn!("Rollback of {} failed: {failure}", self.name());
                    }
                    return Err(self.fail_load(e));
                }
                (Err(e), Ok(libraries)) => {
                    for failure in opener::release_libraries(&libraries).await {
                        tracing::warn!("Rollback of {} failed: {failure}", self.name());
                    }
                    return Err(self.fail_load(e));
                }
                (Err(dependency_error), Err(library_error)) => {
                    let errors = if dependencies_done < libraries_done {
                        vec![dependency_error, library_error]
                    } else {
                        vec![library_error, dependency_error]
                    };
                    return Err(self.fail_load(Error::Aggregate(errors)));
                }
            };

            let headers = create_header_loaders(
                &platform_dir,
                &manifest.header_files,
                &self.ctx.importer,
                &self.shared,
            );

            self.set_state(
                &mut self.lock(),
                State::Loaded(Loaded {
                    dependencies,
                    libraries,
                    headers,
                }),
            );
            tracing::debug!("Loaded {}", self.name());
            Ok(())
        }
        .boxed()
    }

    /// Releases library files, then dependencies, newest first.
    ///
    /// Every release is attempted even if an earlier one fails. Header
    /// loaders stop working as soon as unloading starts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lifecycle`] unless the instance is
    /// [`LifecycleState::Loaded`]. Otherwise returns every release failure
    /// (aggregated when there are several); the instance is `Released`
    /// either way.
    #[tracing::instrument(skip(self), fields(package = %self.name()))]
    pub async fn unload(&self) -> Result<()> {
        self.unload_boxed().await
    }

    fn unload_boxed(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            let loaded = {
                let mut state = self.lock();
                match std::mem::replace(&mut *state, State::Unloading) {
                    State::Loaded(loaded) => {
                        self.shared.set(LifecycleState::Unloading);
                        loaded
                    }
                    other => {
                        let kind = other.kind();
                        *state = other;
                        return Err(Error::lifecycle(Operation::Unload, kind));
                    }
                }
            };

            tracing::debug!("Unloading {}", self.name());

            let mut errors = opener::release_libraries(&loaded.libraries).await;
            errors.extend(deps::unload_dependencies(&loaded.dependencies).await);

            self.set_state(&mut self.lock(), State::Released);
            Error::aggregate(errors).map_or(Ok(()), Err)
        }
        .boxed()
    }

    /// Loaded dependencies by manifest name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lifecycle`] unless the instance is loaded.
    pub fn dependencies(&self) -> Result<BTreeMap<String, Arc<LibraryInstance>>> {
        self.with_loaded(|loaded| {
            loaded
                .dependencies
                .iter()
                .map(|(name, instance)| (name.clone(), Arc::clone(instance)))
                .collect()
        })
    }

    /// Dependency names in the order they finished loading.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lifecycle`] unless the instance is loaded.
    pub fn dependency_order(&self) -> Result<Vec<String>> {
        self.with_loaded(|loaded| {
            loaded
                .dependencies
                .iter()
                .map(|(name, _)| name.clone())
                .collect()
        })
    }

    /// Open library files by manifest path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lifecycle`] unless the instance is loaded.
    pub fn libraries(&self) -> Result<BTreeMap<String, Arc<LibraryFileHandle>>> {
        self.with_loaded(|loaded| {
            loaded
                .libraries
                .iter()
                .map(|handle| (handle.file().to_string(), Arc::clone(handle)))
                .collect()
        })
    }

    /// One loader per declared header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lifecycle`] unless the instance is loaded.
    pub fn headers(&self) -> Result<BTreeMap<String, HeaderLoader>> {
        self.with_loaded(|loaded| loaded.headers.clone())
    }

    /// The loader for one header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lifecycle`] unless the instance is loaded, and
    /// [`Error::Binding`] if the manifest declares no such header.
    pub fn header(&self, name: &str) -> Result<HeaderLoader> {
        self.with_loaded(|loaded| loaded.headers.get(name).cloned())?
            .ok_or_else(|| Error::Binding {
                header: name.to_string(),
                reason: format!("not declared by {}", self.name()),
            })
    }

    /// Imports every declared header concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lifecycle`] unless the instance is loaded, and
    /// every [`Error::Binding`] that occurred otherwise.
    pub async fn import_all_headers(&self) -> Result<BTreeMap<String, Arc<HeaderBinding>>> {
        let loaders = self.headers()?;
        let results = futures::future::join_all(loaders.values().map(HeaderLoader::load)).await;

        let mut imported = BTreeMap::new();
        let mut errors = Vec::new();
        for (name, result) in loaders.keys().zip(results) {
            match result {
                Ok(binding) => {
                    imported.insert(name.clone(), binding);
                }
                Err(e) => errors.push(e),
            }
        }
        Error::aggregate(errors).map_or(Ok(imported), Err)
    }

    fn begin(&self, operation: Operation, expected: LifecycleState, next: State) -> Result<()> {
        let mut state = self.lock();
        let current = state.kind();
        if current != expected {
            return Err(Error::lifecycle(operation, current));
        }
        self.set_state(&mut state, next);
        Ok(())
    }

    fn set_state(&self, state: &mut State, next: State) {
        self.shared.set(next.kind());
        *state = next;
    }

    fn fail_load(&self, error: Error) -> Error {
        self.set_state(&mut self.lock(), State::Unloaded);
        tracing::debug!("Loading {} failed: {error}", self.name());
        error
    }

    fn with_loaded<T>(&self, f: impl FnOnce(&Loaded) -> T) -> Result<T> {
        match &*self.lock() {
            State::Loaded(loaded) => Ok(f(loaded)),
            other => Err(Error::lifecycle(Operation::Inspect, other.kind())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Awaits `future`, then takes the next completion number from `finished`.
async fn sequenced<T>(finished: &AtomicUsize, future: impl Future<Output = T>) -> (T, usize) {
    let output = future.await;
    (output, finished.fetch_add(1, Ordering::SeqCst))
}

/// Puts an instance back to `Unloaded` if its load is abandoned mid-way.
struct LoadingReset<'a>(&'a LibraryInstance);

impl Drop for LoadingReset<'_> {
    fn drop(&mut self) {
        let instance = self.0;
        let mut state = instance.lock();
        if matches!(*state, State::Loading) {
            instance.set_state(&mut state, State::Unloaded);
            tracing::warn!("Load of {} was cancelled", instance.name());
        }
    }
}

impl Drop for LibraryInstance {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if matches!(state, State::Loaded(_)) {
            tracing::warn!(
                "{} dropped while loaded; call unload() to release its libraries in order",
                self.package.name()
            );
        }
    }
}

/// Opens and loads the package at `root` for the host platform.
///
/// # Errors
///
/// See [`Package::open`] and [`LibraryInstance::load`].
pub async fn load(root: impl AsRef<Path>) -> Result<Arc<LibraryInstance>> {
    load_with(root, &LoadContext::system()).await
}

/// Opens and loads the package at `root` with an explicit context.
///
/// # Errors
///
/// See [`Package::open`] and [`LibraryInstance::load`].
pub async fn load_with(root: impl AsRef<Path>, ctx: &LoadContext) -> Result<Arc<LibraryInstance>> {
    let instance = Arc::new(LibraryInstance::open(root, ctx.clone()).await?);
    instance.load().await?;
    Ok(instance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::RecordingLinker;
    use nativepkg_schema::{HeaderEntry, PackageMetadata, PlatformKey, PlatformManifest};

    fn instance(dir: &Path, manifest: PlatformManifest, linker: &RecordingLinker) -> LibraryInstance {
        let platform = PlatformKey::new("linux-x86_64");
        let ctx = LoadContext::system()
            .with_platform(platform.clone())
            .with_linker(linker.clone());
        let package = Package::new(dir, PackageMetadata::new("solo", "1.0.0"), platform, manifest);
        LibraryInstance::new(package, ctx)
    }

    fn headers_only() -> PlatformManifest {
        PlatformManifest {
            header_files: vec![HeaderEntry {
                name: "solo.h".into(),
                path: "solo.toml".into(),
            }],
            ..PlatformManifest::default()
        }
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let linker = RecordingLinker::new();
        let lib = instance(dir.path(), headers_only(), &linker);

        assert_eq!(lib.state(), LifecycleState::Unloaded);
        lib.load().await.unwrap();
        assert_eq!(lib.state(), LifecycleState::Loaded);
        lib.unload().await.unwrap();
        assert_eq!(lib.state(), LifecycleState::Released);
    }

    #[tokio::test]
    async fn test_double_load_and_double_unload_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let linker = RecordingLinker::new();
        let lib = instance(dir.path(), headers_only(), &linker);

        lib.load().await.unwrap();
        let err = lib.load().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Lifecycle {
                operation: Operation::Load,
                state: LifecycleState::Loaded
            }
        ));

        lib.unload().await.unwrap();
        let err = lib.unload().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Lifecycle {
                operation: Operation::Unload,
                state: LifecycleState::Released
            }
        ));
        assert!(matches!(lib.load().await, Err(Error::Lifecycle { .. })));
    }

    #[tokio::test]
    async fn test_introspection_requires_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let linker = RecordingLinker::new();
        let lib = instance(dir.path(), headers_only(), &linker);

        assert!(matches!(lib.headers(), Err(Error::Lifecycle { .. })));
        lib.load().await.unwrap();
        assert!(lib.header("solo.h").is_ok());
        assert!(matches!(lib.header("other.h"), Err(Error::Binding { .. })));
        let loader = lib.header("solo.h").unwrap();
        lib.unload().await.unwrap();

        assert!(matches!(lib.libraries(), Err(Error::Lifecycle { .. })));
        assert!(matches!(loader.load().await, Err(Error::Lifecycle { .. })));
    }

    #[tokio::test]
    async fn test_failed_load_returns_to_unloaded() {
        let dir = tempfile::tempdir().unwrap();
        let linker = RecordingLinker::new();
        let manifest = PlatformManifest {
            library_files: vec!["libsolo.so".into()],
            ..PlatformManifest::default()
        };
        let lib = instance(dir.path(), manifest, &linker);

        assert!(matches!(lib.load().await, Err(Error::Open { .. })));
        assert_eq!(lib.state(), LifecycleState::Unloaded);

        // The file shows up; a retry on the same instance succeeds.
        let platform_dir = lib.package().platform_dir();
        std::fs::create_dir_all(&platform_dir).unwrap();
        std::fs::write(platform_dir.join("libsolo.so"), b"").unwrap();
        lib.load().await.unwrap();
        assert_eq!(lib.libraries().unwrap().len(), 1);
        lib.unload().await.unwrap();
    }
}
