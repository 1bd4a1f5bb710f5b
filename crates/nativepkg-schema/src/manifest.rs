//! Platform manifest parsing.
//!
//! Each `platforms/<key>/manifest.toml` lists what the loader must do for
//! that target: which sibling packages to load first, which library files
//! to open, and which header bindings to expose.
//!
//! ```toml
//! libraryFiles = ["lib/libz.so.1", "lib/libpng16.so.16"]
//!
//! [libraryDependencies]
//! zlib = "1.2.11"
//!
//! [[headerFiles]]
//! name = "png.h"
//! path = "headers/png.toml"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::SchemaError;

/// File name of the manifest inside a platform directory.
pub const MANIFEST_FILE: &str = "manifest.toml";

/// Static descriptor for one platform key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformManifest {
    /// Sibling native packages this library links against (name → version).
    #[serde(default)]
    pub library_dependencies: BTreeMap<String, String>,
    /// Library files to open, relative to the platform directory.
    #[serde(default)]
    pub library_files: Vec<String>,
    /// Header binding modules, relative to the platform directory.
    #[serde(default)]
    pub header_files: Vec<HeaderEntry>,
}

/// One declared header and its generated binding module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    /// Header name as consumers look it up (e.g. `png.h`).
    pub name: String,
    /// Binding module path relative to the platform directory.
    pub path: String,
}

impl PlatformManifest {
    /// Parses and validates a manifest document.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Parse`] for malformed TOML and
    /// [`SchemaError::Invalid`] if [`validate`](Self::validate) rejects it.
    pub fn from_toml_str(content: &str) -> Result<Self, SchemaError> {
        let manifest: Self = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Checks the structural rules the loader relies on.
    ///
    /// Every declared item must end up as its own entry in the loaded
    /// instance, so duplicates are rejected rather than collapsed.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] for empty or duplicate names, and
    /// for paths that are absolute or climb out of the platform directory.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for (name, version) in &self.library_dependencies {
            if name.trim().is_empty() {
                return Err(SchemaError::invalid("libraryDependencies", "empty name"));
            }
            if version.trim().is_empty() {
                return Err(SchemaError::invalid(
                    format!("libraryDependencies.{name}"),
                    "empty version",
                ));
            }
        }

        let mut seen = HashSet::new();
        for file in &self.library_files {
            check_relative("libraryFiles", file)?;
            if !seen.insert(file.as_str()) {
                return Err(SchemaError::invalid(
                    "libraryFiles",
                    format!("'{file}' is listed more than once"),
                ));
            }
        }

        let mut seen = HashSet::new();
        for header in &self.header_files {
            if header.name.trim().is_empty() {
                return Err(SchemaError::invalid("headerFiles", "empty header name"));
            }
            check_relative(&format!("headerFiles.{}", header.name), &header.path)?;
            if !seen.insert(header.name.as_str()) {
                return Err(SchemaError::invalid(
                    "headerFiles",
                    format!("header '{}' is declared more than once", header.name),
                ));
            }
        }

        Ok(())
    }

    /// Returns true if the manifest declares nothing to load.
    pub fn is_empty(&self) -> bool {
        self.library_dependencies.is_empty()
            && self.library_files.is_empty()
            && self.header_files.is_empty()
    }
}

fn check_relative(field: &str, path: &str) -> Result<(), SchemaError> {
    if path.trim().is_empty() {
        return Err(SchemaError::invalid(field, "empty path"));
    }
    let escapes = Path::new(path)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(SchemaError::invalid(
            field,
            format!("'{path}' must stay inside the platform directory"),
        ));
    }
    Ok(())
}
