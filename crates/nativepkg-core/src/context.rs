//! Shared load context.
//!
//! Groups the platform key and the three capabilities the loader depends
//! on. One context is shared by an instance and all of its dependencies.

use std::fmt;
use std::sync::Arc;

use nativepkg_schema::PlatformKey;

use crate::headers::{BindingImporter, DescriptorImporter};
use crate::host::host_platform;
use crate::linker::{Linker, SystemLinker};
use crate::resolver::{DependencyResolver, SuffixResolver};

/// Platform and capabilities used while loading.
#[derive(Clone)]
pub struct LoadContext {
    /// Platform directory to load from.
    pub platform: PlatformKey,
    /// Opens library files into the global namespace.
    pub linker: Arc<dyn Linker>,
    /// Maps manifest dependencies to installed packages.
    pub resolver: Arc<dyn DependencyResolver>,
    /// Imports header binding modules.
    pub importer: Arc<dyn BindingImporter>,
}

impl fmt::Debug for LoadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadContext")
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

impl Default for LoadContext {
    fn default() -> Self {
        Self::system()
    }
}

impl LoadContext {
    /// Host platform, OS loader, suffix resolver and descriptor importer.
    pub fn system() -> Self {
        Self {
            platform: host_platform(),
            linker: Arc::new(SystemLinker::new()),
            resolver: Arc::new(SuffixResolver::new()),
            importer: Arc::new(DescriptorImporter::new()),
        }
    }

    /// Loads from `platform` instead of the host's directory.
    pub fn with_platform(mut self, platform: PlatformKey) -> Self {
        self.platform = platform;
        self
    }

    /// Replaces the linker.
    pub fn with_linker(mut self, linker: impl Linker + 'static) -> Self {
        self.linker = Arc::new(linker);
        self
    }

    /// Replaces the dependency resolver.
    pub fn with_resolver(mut self, resolver: impl DependencyResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Replaces the binding importer.
    pub fn with_importer(mut self, importer: impl BindingImporter + 'static) -> Self {
        self.importer = Arc::new(importer);
        self
    }
}
