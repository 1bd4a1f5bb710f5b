//! Load command
//!
//! Loads a package the way a consumer would, reports what ended up live,
//! imports the requested header bindings and unloads again. The unload
//! runs whenever the load succeeded, even if reporting failed.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use nativepkg_core::{LibraryInstance, LoadContext};
use nativepkg_schema::PlatformKey;

/// Which header bindings to import after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderSelection {
    /// Import none.
    None,
    /// Import the named headers, in order.
    Named(Vec<String>),
    /// Import every declared header.
    All,
}

impl HeaderSelection {
    /// Builds a selection from the `--header` / `--all-headers` flags.
    pub fn from_flags(headers: Vec<String>, all: bool) -> Self {
        if all {
            Self::All
        } else if headers.is_empty() {
            Self::None
        } else {
            Self::Named(headers)
        }
    }
}

/// Load the package at `root` for `platform`, report, then unload.
pub async fn load(root: &Path, platform: &PlatformKey, selection: &HeaderSelection) -> Result<()> {
    let ctx = LoadContext::system().with_platform(platform.clone());
    let instance = LibraryInstance::open(root, ctx)
        .await
        .with_context(|| format!("Failed to read package at {}", root.display()))?;

    instance
        .load()
        .await
        .with_context(|| format!("Failed to load {}", instance.name()))?;

    let reported = report(&instance, platform, selection).await;
    let unloaded = instance
        .unload()
        .await
        .with_context(|| format!("Failed to unload {}", instance.name()));

    reported?;
    unloaded?;
    println!("  Unloaded {}", instance.name());
    Ok(())
}

async fn report(
    instance: &LibraryInstance,
    platform: &PlatformKey,
    selection: &HeaderSelection,
) -> Result<()> {
    println!();
    println!("  Loaded {} for {platform}", instance.name());
    print_tree(instance, 1)?;
    import_headers(instance, selection).await
}

fn print_tree(instance: &LibraryInstance, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);

    for (file, handle) in instance.libraries()? {
        println!("{indent}  lib  {file} ({})", handle.path().display());
    }
    for name in instance.headers()?.keys() {
        println!("{indent}  hdr  {name}");
    }

    let dependencies = instance.dependencies()?;
    for name in instance.dependency_order()? {
        let Some(dependency) = dependencies.get(&name) else {
            continue;
        };
        println!("{indent}  dep  {name} -> {}", dependency.name());
        print_tree(dependency, depth + 1)?;
    }
    Ok(())
}

async fn import_headers(instance: &LibraryInstance, selection: &HeaderSelection) -> Result<()> {
    let bindings = match selection {
        HeaderSelection::None => return Ok(()),
        HeaderSelection::All => instance.import_all_headers().await?,
        HeaderSelection::Named(names) => {
            let mut bindings = BTreeMap::new();
            for name in names {
                let binding = instance.header(name)?.load().await?;
                bindings.insert(name.clone(), binding);
            }
            bindings
        }
    };

    println!();
    for (name, binding) in &bindings {
        println!(
            "  {name}: {} functions, {} types",
            binding.functions.len(),
            binding.types.len()
        );
    }
    println!();
    Ok(())
}
