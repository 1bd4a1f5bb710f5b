//! Package metadata (`package.toml`).
//!
//! Written by the generator next to the `platforms/` directory. The loader
//! only needs the package identity and the two dependency tables, which
//! are the search space when matching a manifest dependency to an
//! installed sibling package.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::SchemaError;

/// File name of the package metadata at the package root.
pub const PACKAGE_FILE: &str = "package.toml";

/// Parsed `package.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Package identity.
    pub package: PackageInfo,
    /// Runtime dependency declarations (package name → version).
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Development dependency declarations (package name → version).
    #[serde(default, rename = "dev-dependencies")]
    pub dev_dependencies: BTreeMap<String, String>,
}

/// The `[package]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Full package name, e.g. `@acme/libpng-v1.6.37`.
    pub name: String,
    /// Package version.
    pub version: String,
}

impl PackageMetadata {
    /// Creates metadata with no dependency declarations.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package: PackageInfo {
                name: name.into(),
                version: version.into(),
            },
            dependencies: BTreeMap::new(),
            dev_dependencies: BTreeMap::new(),
        }
    }

    /// Parses a `package.toml` document.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Parse`] for malformed TOML and
    /// [`SchemaError::Invalid`] if the package name is empty.
    pub fn from_toml_str(content: &str) -> Result<Self, SchemaError> {
        let metadata: Self = toml::from_str(content)?;
        if metadata.package.name.trim().is_empty() {
            return Err(SchemaError::invalid("package.name", "empty name"));
        }
        Ok(metadata)
    }

    /// All declared package names, runtime declarations first.
    pub fn declared_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .keys()
            .chain(self.dev_dependencies.keys())
            .map(String::as_str)
    }
}
