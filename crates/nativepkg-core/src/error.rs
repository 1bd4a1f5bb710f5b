//! Error taxonomy for loading and unloading native packages.

use std::fmt;
use std::path::PathBuf;

use nativepkg_schema::SchemaError;
use thiserror::Error;

use crate::lifecycle::LifecycleState;
use crate::linker::OpenFailure;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while loading or unloading a package.
#[derive(Error, Debug)]
pub enum Error {
    /// A manifest dependency matched no installed package, several of them,
    /// or closes a dependency cycle.
    #[error("Cannot resolve dependency {name}@{version}: {reason}")]
    Resolution {
        /// Dependency name from the manifest.
        name: String,
        /// Dependency version from the manifest.
        version: String,
        /// Why resolution failed.
        reason: String,
    },

    /// A library file (or the platform directory) could not be opened.
    #[error("Failed to open {}: {source}", path.display())]
    Open {
        /// Absolute path of the file that failed.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: OpenFailure,
    },

    /// A header binding module failed to import.
    #[error("Failed to import header binding '{header}': {reason}")]
    Binding {
        /// Header name from the manifest.
        header: String,
        /// Why the import failed.
        reason: String,
    },

    /// An operation was invoked in a state that does not allow it.
    #[error("Cannot {operation} a library that is {state}")]
    Lifecycle {
        /// The rejected operation.
        operation: Operation,
        /// State the instance was in.
        state: LifecycleState,
    },

    /// A library handle failed to close during unload.
    #[error("Failed to release {}: {reason}", path.display())]
    Release {
        /// Absolute path of the library.
        path: PathBuf,
        /// Loader-reported reason.
        reason: String,
    },

    /// `package.toml` or a platform manifest is malformed.
    #[error("Invalid descriptor {}: {source}", path.display())]
    Manifest {
        /// Path of the offending file.
        path: PathBuf,
        /// Parse or validation failure.
        #[source]
        source: SchemaError,
    },

    /// A descriptor file could not be read.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Several sibling operations failed. The first entry is the failure
    /// that was observed first.
    #[error("{} failures: {}", .0.len(), join(.0))]
    Aggregate(Vec<Error>),
}

/// Operations guarded by the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `LibraryInstance::load`
    Load,
    /// `LibraryInstance::unload`
    Unload,
    /// Reading dependencies, libraries or headers of an instance.
    Inspect,
    /// Invoking a header loader.
    ImportHeader,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Load => "load",
            Self::Unload => "unload",
            Self::Inspect => "inspect",
            Self::ImportHeader => "import a header from",
        })
    }
}

fn join(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Folds collected failures into one error: `None` when empty, the
    /// error itself when alone, [`Error::Aggregate`] otherwise.
    pub fn aggregate(mut errors: Vec<Error>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Aggregate(errors)),
        }
    }

    /// The first failure, looking through aggregates.
    pub fn primary(&self) -> &Self {
        match self {
            Self::Aggregate(errors) => errors.first().map_or(self, Self::primary),
            other => other,
        }
    }

    /// All leaf failures, flattening nested aggregates.
    pub fn failures(&self) -> Vec<&Self> {
        match self {
            Self::Aggregate(errors) => errors.iter().flat_map(Self::failures).collect(),
            other => vec![other],
        }
    }

    pub(crate) fn lifecycle(operation: Operation, state: LifecycleState) -> Self {
        Self::Lifecycle { operation, state }
    }
}
