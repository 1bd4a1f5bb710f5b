//! Shared types for nativepkg: platform keys, platform manifests, package
//! metadata and header binding descriptors.
//!
//! Everything here is pure data. Reading the files and acting on them is
//! `nativepkg-core`'s job.

pub mod binding;
pub mod error;
pub mod manifest;
pub mod package;
pub mod platform;

// Re-exports
pub use binding::{FieldBinding, FunctionBinding, HeaderBinding, TypeBinding, TypeKind};
pub use error::SchemaError;
pub use manifest::{HeaderEntry, MANIFEST_FILE, PlatformManifest};
pub use package::{PACKAGE_FILE, PackageInfo, PackageMetadata};
pub use platform::{PlatformKey, map_arch, map_os};

/// Directory under a package root holding one subdirectory per platform key.
pub const PLATFORMS_DIR: &str = "platforms";
