//! nativepkg - runtime loader for packaged native libraries.
//!
//! A generated package ships a precompiled native library per platform,
//! plus generated bindings for its headers. This crate turns such a package
//! into a live [`LibraryInstance`]:
//!
//! 1. Resolve the host to a platform key (`macos-armv8`, `linux-x86_64`, ...).
//! 2. Load every sibling package the platform manifest depends on,
//!    recursively and concurrently.
//! 3. Open the package's own library files with global symbol visibility,
//!    concurrently with step 2.
//! 4. Expose one lazy, memoized loader per declared header.
//!
//! `unload()` reverses this: own libraries first, then dependencies in
//! reverse acquisition order.
//!
//! # Example
//!
//! ```no_run
//! # async fn run() -> nativepkg_core::Result<()> {
//! let library = nativepkg_core::load("node_modules/@acme/libpng-v1.6.37").await?;
//! let png = library.header("png.h")?.load().await?;
//! println!("{} functions", png.functions.len());
//! library.unload().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Capabilities
//!
//! The OS loader, the dependency naming convention and the binding import
//! mechanism are all injected through [`LoadContext`], so each can be
//! replaced (tests use [`linker::RecordingLinker`]).

pub mod context;
mod deps;
pub mod error;
pub mod headers;
pub mod host;
pub mod lifecycle;
pub mod linker;
pub mod opener;
pub mod package;
pub mod resolver;

pub use context::LoadContext;
pub use error::{Error, Operation, Result};
pub use headers::{BindingImporter, DescriptorImporter, HeaderLoader};
pub use host::host_platform;
pub use lifecycle::{LibraryInstance, LifecycleState, load, load_with};
pub use linker::{LinkedLibrary, Linker, OpenFailure, RecordingLinker, SystemLinker};
pub use opener::LibraryFileHandle;
pub use package::Package;
pub use resolver::{DependencyResolver, SuffixResolver};

pub use nativepkg_schema as schema;
