//! Lazy, memoized header bindings.
//!
//! A library can declare many headers while a consumer typically uses a
//! handful, so bindings are imported on demand: one [`HeaderLoader`] per
//! declared header, none of them invoked until asked.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use nativepkg_schema::{HeaderBinding, HeaderEntry};
use tokio::sync::OnceCell;

use crate::error::{Error, Operation, Result};
use crate::lifecycle::{LifecycleState, SharedState};

/// Imports a generated binding module.
#[async_trait]
pub trait BindingImporter: Send + Sync {
    /// Imports the module at `path` generated for `header`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Binding`] naming `header` if the module cannot be
    /// read or parsed.
    async fn import(&self, header: &str, path: &Path) -> Result<Arc<HeaderBinding>>;
}

/// Reads binding descriptors from disk, memoized by path.
///
/// Importing the same path twice returns the same `Arc`, even across
/// loaders of different instances that share this importer.
#[derive(Debug, Default)]
pub struct DescriptorImporter {
    cache: Mutex<HashMap<PathBuf, Arc<HeaderBinding>>>,
}

impl DescriptorImporter {
    /// Creates an importer with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn cached(&self, path: &Path) -> Option<Arc<HeaderBinding>> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }
}

#[async_trait]
impl BindingImporter for DescriptorImporter {
    async fn import(&self, header: &str, path: &Path) -> Result<Arc<HeaderBinding>> {
        if let Some(binding) = self.cached(path) {
            return Ok(binding);
        }

        let failure = |reason: String| Error::Binding {
            header: header.to_string(),
            reason,
        };

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| failure(format!("{}: {e}", path.display())))?;
        let mut binding = HeaderBinding::from_toml_str(&content)
            .map_err(|e| failure(format!("{}: {e}", path.display())))?;
        if binding.header.is_empty() {
            binding.header = header.to_string();
        }

        tracing::debug!(
            "Imported {header}: {} functions, {} types",
            binding.functions.len(),
            binding.types.len()
        );

        // A concurrent import of the same path may have won; keep its Arc.
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(
            cache
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(binding)),
        ))
    }
}

/// Zero-argument async loader for one header's bindings.
///
/// Cheap to clone; clones share the cached binding.
#[derive(Clone)]
pub struct HeaderLoader {
    name: String,
    path: PathBuf,
    importer: Arc<dyn BindingImporter>,
    cell: Arc<OnceCell<Arc<HeaderBinding>>>,
    state: Arc<SharedState>,
}

impl fmt::Debug for HeaderLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderLoader")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

impl HeaderLoader {
    /// Header name from the manifest.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the binding module.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the binding has been imported already.
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Imports the binding on first call; returns the cached one afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lifecycle`] with the owning instance's current
    /// state once it has started unloading, and [`Error::Binding`] if the
    /// import fails. A failed import is not cached.
    pub async fn load(&self) -> Result<Arc<HeaderBinding>> {
        let state = self.state.get();
        if state != LifecycleState::Loaded {
            return Err(Error::lifecycle(Operation::ImportHeader, state));
        }
        self.cell
            .get_or_try_init(|| self.importer.import(&self.name, &self.path))
            .await
            .cloned()
    }
}

/// Builds one loader per declared header, paths relative to `platform_dir`.
///
/// `state` mirrors the owning instance; loaders only work while it reads
/// `Loaded`.
pub(crate) fn create_header_loaders(
    platform_dir: &Path,
    headers: &[HeaderEntry],
    importer: &Arc<dyn BindingImporter>,
    state: &Arc<SharedState>,
) -> BTreeMap<String, HeaderLoader> {
    headers
        .iter()
        .map(|entry| {
            let loader = HeaderLoader {
                name: entry.name.clone(),
                path: platform_dir.join(&entry.path),
                importer: Arc::clone(importer),
                cell: Arc::new(OnceCell::new()),
                state: Arc::clone(state),
            };
            (entry.name.clone(), loader)
        })
        .collect()
}
