//! Inspect command

use std::path::Path;

use anyhow::{Context, Result};
use nativepkg_core::Package;
use nativepkg_schema::PlatformKey;
use serde_json::json;

/// Show a package's metadata and its manifest for `platform`.
pub async fn inspect(root: &Path, platform: &PlatformKey, json: bool) -> Result<()> {
    let package = Package::open(root, platform)
        .await
        .with_context(|| format!("Failed to read package at {}", root.display()))?;
    let manifest = package.manifest();

    if json {
        let doc = json!({
            "name": package.name(),
            "version": package.metadata().package.version,
            "root": package.root().display().to_string(),
            "platform": package.platform(),
            "manifest": manifest,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    let lw = 14;
    println!();
    println!("  {} {}", package.name(), package.metadata().package.version);
    println!("  {:<lw$}{}", "root", package.root().display());
    println!("  {:<lw$}{}", "platform", package.platform());
    println!();

    if manifest.is_empty() {
        println!("  Manifest for {platform} declares nothing.");
        return Ok(());
    }

    if !manifest.library_dependencies.is_empty() {
        println!("  dependencies");
        for (name, version) in &manifest.library_dependencies {
            println!("    {name:<lw$}{version}");
        }
    }
    if !manifest.library_files.is_empty() {
        println!("  libraries");
        for file in &manifest.library_files {
            println!("    {file}");
        }
    }
    if !manifest.header_files.is_empty() {
        println!("  headers");
        for header in &manifest.header_files {
            println!("    {:<lw$}{}", header.name, header.path);
        }
    }

    Ok(())
}
