//! Loads the sibling packages a manifest depends on.
//!
//! # Implementation Note: all-or-nothing
//!
//! Every dependency is resolved before any of them is loaded, so a typo in
//! the manifest fails without touching the linker. The loads then run
//! concurrently, each one a full recursive `load()` of the dependency
//! package. Loads already in flight are never cancelled; when one fails,
//! the rest run to completion and every dependency that did load is
//! unloaded again, newest first.

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;

use crate::context::LoadContext;
use crate::error::{Error, Result};
use crate::lifecycle::LibraryInstance;
use crate::package::Package;

/// A loaded dependency, keyed by its manifest name.
pub(crate) type LoadedDependency = (String, Arc<LibraryInstance>);

/// Loads every dependency of `package`.
///
/// `chain` holds the names of the packages currently being loaded above
/// this one, including `package` itself, and is used to detect cycles.
/// Returns the dependencies in the order their loads completed.
pub(crate) async fn load_dependencies(
    package: &Package,
    ctx: &LoadContext,
    chain: &[String],
) -> Result<Vec<LoadedDependency>> {
    let declared = &package.manifest().library_dependencies;
    if declared.is_empty() {
        return Ok(Vec::new());
    }

    let mut resolved = Vec::with_capacity(declared.len());
    let mut errors = Vec::new();
    for (name, version) in declared {
        match ctx.resolver.resolve(package, name, version) {
            Ok(root) => resolved.push((name.clone(), version.clone(), root)),
            Err(e) => errors.push(e),
        }
    }
    if let Some(err) = Error::aggregate(errors) {
        return Err(err);
    }

    let mut pending: FuturesUnordered<_> = resolved
        .into_iter()
        .map(|(name, version, root)| load_one(name, version, root, ctx, chain))
        .collect();

    let mut loaded = Vec::with_capacity(declared.len());
    let mut errors = Vec::new();
    while let Some(result) = pending.next().await {
        match result {
            Ok(dependency) => loaded.push(dependency),
            Err(e) => {
                if errors.is_empty() {
                    tracing::debug!(
                        "Dependency of {} failed, waiting for in-flight siblings: {e}",
                        package.name()
                    );
                }
                errors.push(e);
            }
        }
    }

    if let Some(err) = Error::aggregate(errors) {
        for failure in unload_dependencies(&loaded).await {
            tracing::warn!("Rollback of {} failed: {failure}", package.name());
        }
        return Err(err);
    }

    Ok(loaded)
}

async fn load_one(
    name: String,
    version: String,
    root: PathBuf,
    ctx: &LoadContext,
    chain: &[String],
) -> Result<LoadedDependency> {
    let package = Package::open(&root, &ctx.platform).await?;

    if chain.iter().any(|ancestor| ancestor == package.name()) {
        return Err(Error::Resolution {
            name,
            version,
            reason: format!(
                "dependency cycle: {} -> {}",
                chain.join(" -> "),
                package.name()
            ),
        });
    }

    tracing::debug!("Loading dependency {name}@{version} from {}", root.display());
    let instance = Arc::new(LibraryInstance::new(package, ctx.clone()));
    instance.load_in_chain(chain).await?;
    Ok((name, instance))
}

/// Unloads `dependencies` one at a time, newest first.
///
/// Each dependency is fully torn down before the next (older) one, so a
/// package is never unloaded while a later-loaded one may still reference
/// its symbols. Every failure is returned.
pub(crate) async fn unload_dependencies(dependencies: &[LoadedDependency]) -> Vec<Error> {
    let mut errors = Vec::new();
    for (name, instance) in dependencies.iter().rev() {
        if let Err(e) = instance.unload().await {
            tracing::warn!("Unloading dependency {name} failed: {e}");
            errors.push(e);
        }
    }
    errors
}
