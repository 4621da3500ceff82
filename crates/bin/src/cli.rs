//! CLI argument definitions for the treelike binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inspect and edit a local treelike state
#[derive(Parser, Debug)]
#[command(name = "treelike")]
#[command(about = "Treelike: a reactive, replicated state tree")]
#[command(version)]
pub struct Cli {
    /// JSON config file; defaults are used if it does not exist
    #[arg(
        short,
        long,
        default_value = "treelike.config.json",
        env = "TREELIKE_CONFIG"
    )]
    pub config: PathBuf,

    /// Storage file, overriding `local.storage_file` from the config
    #[arg(short, long, env = "TREELIKE_STORE")]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a value (JSON, or a plain string) at a path
    Put(PutArgs),
    /// Print the value at a path
    Get(PathArgs),
    /// List the direct children of a path
    Ls(PathArgs),
    /// Print every update at a path until interrupted
    Watch(WatchArgs),
}

/// Arguments for the put command
#[derive(clap::Args, Debug)]
pub struct PutArgs {
    /// Path below the local root, `/`-separated
    pub path: String,

    /// Value to write. Objects are written as directories.
    pub value: String,
}

/// Arguments for commands that take only a path
#[derive(clap::Args, Debug)]
pub struct PathArgs {
    /// Path below the local root; empty for the root itself
    #[arg(default_value = "")]
    pub path: String,
}

/// Arguments for the watch command
#[derive(clap::Args, Debug)]
pub struct WatchArgs {
    /// Path below the local root; empty for the root itself
    #[arg(default_value = "")]
    pub path: String,

    /// How many levels to subscribe to (1 = the path only)
    #[arg(short, long, default_value_t = 1)]
    pub depth: usize,
}
