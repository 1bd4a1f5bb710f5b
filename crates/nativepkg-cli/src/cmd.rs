//! Subcommand implementations.

pub mod inspect;
pub mod load;
pub mod platform;

use nativepkg_core::host_platform;
use nativepkg_schema::PlatformKey;

/// The `--platform` override, or the detected host platform.
pub fn platform_or_host(platform: Option<&str>) -> PlatformKey {
    platform.map_or_else(host_platform, PlatformKey::new)
}
