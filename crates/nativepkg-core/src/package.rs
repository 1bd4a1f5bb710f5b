//! An installed native package, read from disk for one platform.
//!
//! ```text
//! <root>/
//! ├── package.toml                 # identity + dependency declarations
//! ├── packages/                    # installed sibling packages
//! └── platforms/
//!     └── linux-x86_64/
//!         ├── manifest.toml        # dependencies, library files, headers
//!         ├── lib/libpng16.so.16
//!         └── headers/png.toml     # generated binding module
//! ```

use std::path::{Path, PathBuf};

use nativepkg_schema::{
    MANIFEST_FILE, PACKAGE_FILE, PLATFORMS_DIR, PackageMetadata, PlatformKey, PlatformManifest,
};
use tokio::fs;

use crate::error::{Error, Result};
use crate::linker::OpenFailure;

/// Package metadata plus the manifest for the resolved platform.
#[derive(Debug, Clone)]
pub struct Package {
    root: PathBuf,
    metadata: PackageMetadata,
    platform: PlatformKey,
    manifest: PlatformManifest,
}

impl Package {
    /// Assembles a package from values already in memory.
    pub fn new(
        root: impl Into<PathBuf>,
        metadata: PackageMetadata,
        platform: PlatformKey,
        manifest: PlatformManifest,
    ) -> Self {
        Self {
            root: root.into(),
            metadata,
            platform,
            manifest,
        }
    }

    /// Reads `package.toml` and the platform manifest under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] with [`OpenFailure::UnsupportedPlatform`] if
    /// the package has no directory for `platform`, [`Error::Io`] if a
    /// descriptor cannot be read, and [`Error::Manifest`] if one is invalid.
    pub async fn open(root: impl AsRef<Path>, platform: &PlatformKey) -> Result<Self> {
        let root = std::path::absolute(root.as_ref()).map_err(|source| Error::Io {
            path: root.as_ref().to_path_buf(),
            source,
        })?;

        let metadata_path = root.join(PACKAGE_FILE);
        let metadata = PackageMetadata::from_toml_str(&read(&metadata_path).await?)
            .map_err(|source| Error::Manifest {
                path: metadata_path,
                source,
            })?;

        let platform_dir = root.join(PLATFORMS_DIR).join(platform.as_str());
        if !fs::metadata(&platform_dir)
            .await
            .is_ok_and(|m| m.is_dir())
        {
            return Err(Error::Open {
                path: platform_dir,
                source: OpenFailure::UnsupportedPlatform(platform.clone()),
            });
        }

        let manifest_path = platform_dir.join(MANIFEST_FILE);
        let manifest = PlatformManifest::from_toml_str(&read(&manifest_path).await?)
            .map_err(|source| Error::Manifest {
                path: manifest_path,
                source,
            })?;

        tracing::debug!(
            "Opened package {} for {platform} at {}",
            metadata.package.name,
            root.display()
        );

        Ok(Self::new(root, metadata, platform.clone(), manifest))
    }

    /// Package root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full package name from `package.toml`.
    pub fn name(&self) -> &str {
        &self.metadata.package.name
    }

    /// Parsed `package.toml`.
    pub fn metadata(&self) -> &PackageMetadata {
        &self.metadata
    }

    /// Platform this package was opened for.
    pub fn platform(&self) -> &PlatformKey {
        &self.platform
    }

    /// Manifest for [`platform`](Self::platform).
    pub fn manifest(&self) -> &PlatformManifest {
        &self.manifest
    }

    /// `<root>/platforms/<key>`, the base for manifest-relative paths.
    pub fn platform_dir(&self) -> PathBuf {
        self.root.join(PLATFORMS_DIR).join(self.platform.as_str())
    }
}

async fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).await.map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_open_reads_both_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("package.toml"),
            "[package]\nname = \"@acme/zlib-v1.2.11\"\nversion = \"1.2.11\"\n",
        );
        write(
            &dir.path().join("platforms/linux-x86_64/manifest.toml"),
            "libraryFiles = [\"libz.so.1\"]\n",
        );

        let platform = PlatformKey::new("linux-x86_64");
        let package = Package::open(dir.path(), &platform).await.unwrap();

        assert_eq!(package.name(), "@acme/zlib-v1.2.11");
        assert_eq!(package.manifest().library_files, vec!["libz.so.1"]);
        assert!(package.platform_dir().ends_with("platforms/linux-x86_64"));
    }

    #[tokio::test]
    async fn test_missing_platform_dir_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("package.toml"),
            "[package]\nname = \"zlib\"\nversion = \"1\"\n",
        );

        let platform = PlatformKey::resolve("freebsd", "x86");
        let err = Package::open(dir.path(), &platform).await.unwrap_err();
        match err {
            Error::Open { path, source } => {
                assert!(path.ends_with("platforms/freebsd-x86"));
                assert!(matches!(source, OpenFailure::UnsupportedPlatform(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_manifest_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("package.toml"),
            "[package]\nname = \"zlib\"\nversion = \"1\"\n",
        );
        write(
            &dir.path().join("platforms/linux-x86_64/manifest.toml"),
            "libraryFiles = [\"../escape.so\"]\n",
        );

        let err = Package::open(dir.path(), &PlatformKey::new("linux-x86_64"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Manifest { ref path, .. } if path.ends_with("manifest.toml")));
    }

    #[tokio::test]
    async fn test_missing_package_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Package::open(dir.path(), &PlatformKey::new("linux-x86_64"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
