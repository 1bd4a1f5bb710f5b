//! Platform command

use nativepkg_core::host::host_identifiers;
use nativepkg_schema::PlatformKey;

/// Print the platform key packages are loaded for.
pub fn platform(key: &PlatformKey) {
    let host = host_identifiers();
    tracing::debug!("Host reports os={} arch={}", host.os, host.arch);
    println!("{key}");
}
