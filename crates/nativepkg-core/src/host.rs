//! Host platform detection.
//!
//! The platform tables in `nativepkg_schema::platform` speak the raw
//! vocabulary of the host identifiers (`darwin`, `x64`, ...). Rust's own
//! target constants use different names, so they are first translated into
//! that vocabulary, then resolved. Both identifiers can be overridden with
//! `NATIVEPKG_OS` / `NATIVEPKG_ARCH`, which is how a package is tested
//! against a platform directory other than the build host's.
//!
//! The environment is read once per process.

use std::sync::OnceLock;

use nativepkg_schema::PlatformKey;

/// Overrides the raw host OS identifier.
pub const OS_ENV: &str = "NATIVEPKG_OS";
/// Overrides the raw host CPU identifier.
pub const ARCH_ENV: &str = "NATIVEPKG_ARCH";

/// Raw host identifiers before table translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentifiers {
    /// Raw OS identifier, e.g. `darwin`.
    pub os: String,
    /// Raw CPU identifier, e.g. `x64`.
    pub arch: String,
}

impl HostIdentifiers {
    /// Identifiers for the compile target, with optional overrides applied.
    pub fn detect_with(os_override: Option<String>, arch_override: Option<String>) -> Self {
        Self {
            os: os_override
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| raw_os(std::env::consts::OS).to_string()),
            arch: arch_override
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| raw_arch(std::env::consts::ARCH).to_string()),
        }
    }

    /// Identifiers for this process, honoring [`OS_ENV`] and [`ARCH_ENV`].
    pub fn detect() -> Self {
        Self::detect_with(std::env::var(OS_ENV).ok(), std::env::var(ARCH_ENV).ok())
    }

    /// Resolves these identifiers into a platform key.
    pub fn platform_key(&self) -> PlatformKey {
        PlatformKey::resolve(&self.os, &self.arch)
    }
}

/// Translates `std::env::consts::OS` into the raw identifier vocabulary.
pub fn raw_os(rust_os: &str) -> &str {
    match rust_os {
        "macos" => "darwin",
        "windows" => "win32",
        "solaris" | "illumos" => "sunos",
        other => other,
    }
}

/// Translates `std::env::consts::ARCH` into the raw identifier vocabulary.
pub fn raw_arch(rust_arch: &str) -> &str {
    match rust_arch {
        "aarch64" => "arm64",
        "x86_64" => "x64",
        "x86" => "ia32",
        "powerpc64" => "ppc64",
        "powerpc" => "ppc",
        other => other,
    }
}

static HOST: OnceLock<HostIdentifiers> = OnceLock::new();

/// Raw host identifiers, detected on first use.
pub fn host_identifiers() -> &'static HostIdentifiers {
    HOST.get_or_init(|| {
        let host = HostIdentifiers::detect();
        tracing::debug!("Host identifiers: os={} arch={}", host.os, host.arch);
        host
    })
}

/// The platform key of the running process.
pub fn host_platform() -> PlatformKey {
    host_identifiers().platform_key()
}
