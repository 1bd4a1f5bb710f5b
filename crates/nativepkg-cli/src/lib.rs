//! nativepkg - command line front end for the native package loader.
#![allow(clippy::missing_errors_doc)]
//!
//! Inspects a package's platform manifest or loads it end to end against
//! the OS loader, the same way a consuming program would.

pub mod cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level arguments.
#[derive(Debug, Parser)]
#[command(name = "nativepkg")]
#[command(author, version, about = "nativepkg - load packaged native libraries")]
pub struct Cli {
    /// Platform directory to use instead of the detected host
    /// (e.g. `linux-x86_64`)
    #[arg(long, global = true, env = "NATIVEPKG_PLATFORM")]
    pub platform: Option<String>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the platform key of this host
    Platform,
    /// Show a package's metadata and platform manifest
    Inspect {
        /// Package root directory
        root: PathBuf,
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Load a package, report what was loaded, then unload it
    Load {
        /// Package root directory
        root: PathBuf,
        /// Import the bindings of this header (repeatable)
        #[arg(long = "header", value_name = "NAME")]
        headers: Vec<String>,
        /// Import the bindings of every declared header
        #[arg(long, conflicts_with = "headers")]
        all_headers: bool,
    },
}
