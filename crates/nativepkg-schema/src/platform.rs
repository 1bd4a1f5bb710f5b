//! Platform key resolution.
//!
//! Generated packages ship one directory per supported target under
//! `platforms/<os>-<arch>/`. The directory names follow the native build
//! system's vocabulary (`macos`, `armv8`, `x86_64`), while the host reports
//! identifiers like `darwin` or `x64`. The two static tables below bridge
//! that gap; anything not listed passes through unchanged.
//!
//! # Example
//!
//! ```
//! use nativepkg_schema::PlatformKey;
//!
//! let key = PlatformKey::resolve("darwin", "arm64");
//! assert_eq!(key.as_str(), "macos-armv8");
//! ```

use serde::{Deserialize, Serialize};

/// Host OS identifier → platform directory OS name.
pub const OS_TABLE: &[(&str, &str)] = &[
    ("darwin", "macos"),
    ("sunos", "solaris"),
    ("win32", "windows"),
];

/// Host CPU identifier → platform directory architecture name.
pub const ARCH_TABLE: &[(&str, &str)] = &[
    ("arm", "armv6"),
    ("arm64", "armv8"),
    ("x32", "x86"),
    ("x64", "x86_64"),
];

fn translate<'a>(table: &[(&str, &'a str)], raw: &'a str) -> &'a str {
    table
        .iter()
        .find(|(from, _)| *from == raw)
        .map_or(raw, |(_, to)| *to)
}

/// Maps a raw host OS identifier to its platform directory name.
pub fn map_os(raw: &str) -> &str {
    translate(OS_TABLE, raw)
}

/// Maps a raw host CPU identifier to its platform directory name.
pub fn map_arch(raw: &str) -> &str {
    translate(ARCH_TABLE, raw)
}

/// Canonical `"<os>-<arch>"` identifier of one supported target.
///
/// No validation against a supported set happens here: an unsupported
/// combination still resolves and only fails later, when the package has
/// no `platforms/<key>/` directory for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformKey(String);

impl PlatformKey {
    /// Resolves raw host identifiers into a platform key.
    pub fn resolve(os: &str, arch: &str) -> Self {
        Self(format!("{}-{}", map_os(os), map_arch(arch)))
    }

    /// Wraps an already-canonical key (e.g. from a `--platform` flag).
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PlatformKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
