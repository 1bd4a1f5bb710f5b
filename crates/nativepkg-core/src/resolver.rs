//! Maps manifest dependencies to installed sibling packages.
//!
//! A manifest names a dependency by library name and version (`zlib`,
//! `1.2.11`), while packages are published under their own names (e.g.
//! `@acme/zlib-v1.2.11`). [`DependencyResolver`] is the seam between the
//! two; [`SuffixResolver`] implements the generator's naming convention and
//! any closure with the right signature can replace it.

use std::path::{Path, PathBuf};

use nativepkg_schema::PackageMetadata;

use crate::error::{Error, Result};
use crate::package::Package;

/// Locates the installed package that satisfies a manifest dependency.
pub trait DependencyResolver: Send + Sync {
    /// Returns the root directory of the package providing `name`@`version`
    /// for `package`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolution`] if no single package matches.
    fn resolve(&self, package: &Package, name: &str, version: &str) -> Result<PathBuf>;
}

impl<F> DependencyResolver for F
where
    F: Fn(&Package, &str, &str) -> Result<PathBuf> + Send + Sync,
{
    fn resolve(&self, package: &Package, name: &str, version: &str) -> Result<PathBuf> {
        self(package, name, version)
    }
}

/// The package name suffix a dependency is published under.
///
/// ```
/// assert_eq!(nativepkg_core::resolver::expected_suffix("zlib", "1.2.11"), "zlib-v1.2.11");
/// ```
pub fn expected_suffix(name: &str, version: &str) -> String {
    format!("{name}-v{version}")
}

/// Default install directory searched for sibling packages.
pub const INSTALL_DIR: &str = "packages";

/// Resolves by suffix over the package's declared dependencies.
///
/// The candidates are the entries of `[dependencies]` and
/// `[dev-dependencies]` whose name ends with `"<name>-v<version>"`. Exactly
/// one must match. The match is then looked up as
/// `<dir>/packages/<candidate>`, starting at the requesting package's root
/// and walking up its ancestors, nearest first.
#[derive(Debug, Clone)]
pub struct SuffixResolver {
    install_dir: PathBuf,
}

impl Default for SuffixResolver {
    fn default() -> Self {
        Self {
            install_dir: PathBuf::from(INSTALL_DIR),
        }
    }
}

impl SuffixResolver {
    /// Resolver searching the default `packages/` directories.
    pub fn new() -> Self {
        Self::default()
    }

    /// Searches `install_dir` instead of `packages/` at each level.
    pub fn with_install_dir(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
        }
    }

    /// Declared package names matching `name`@`version`, deduplicated.
    pub fn candidates<'a>(metadata: &'a PackageMetadata, name: &str, version: &str) -> Vec<&'a str> {
        let suffix = expected_suffix(name, version);
        let mut found: Vec<&str> = metadata
            .declared_names()
            .filter(|declared| declared.ends_with(&suffix))
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }

    fn locate(&self, root: &Path, candidate: &str) -> Option<PathBuf> {
        root.ancestors()
            .map(|dir| dir.join(&self.install_dir).join(candidate))
            .find(|path| path.is_dir())
    }
}

impl DependencyResolver for SuffixResolver {
    fn resolve(&self, package: &Package, name: &str, version: &str) -> Result<PathBuf> {
        let failure = |reason: String| Error::Resolution {
            name: name.to_string(),
            version: version.to_string(),
            reason,
        };

        let candidates = Self::candidates(package.metadata(), name, version);
        let candidate = match candidates.as_slice() {
            [] => {
                return Err(failure(format!(
                    "{} declares no package ending with '{}'",
                    package.name(),
                    expected_suffix(name, version)
                )));
            }
            [single] => *single,
            many => {
                return Err(failure(format!(
                    "ambiguous match in {}: {}",
                    package.name(),
                    many.join(", ")
                )));
            }
        };

        self.locate(package.root(), candidate).ok_or_else(|| {
            failure(format!(
                "'{candidate}' is declared but not installed under any {} directory",
                self.install_dir.display()
            ))
        })
    }
}
