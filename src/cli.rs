//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "komplete",
    version = env!("KOMPLETE_BUILD_VERSION"),
    about = "Convert natural-language requests into a shell command plan",
    long_about = "Komplete is a CLI assistant. You type a natural-language request, \
Komplete proposes a shell command plan, asks for confirmation, then runs it. \
It also ships a background daemon that serves inline command suggestions to \
your shell.",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// The natural-language request
    #[arg(trailing_var_arg = true)]
    pub request: Vec<String>,

    /// Print the plan only, do not execute
    #[arg(long)]
    pub dry_run: bool,

    /// Override the configured model
    #[arg(long)]
    pub model: Option<String>,

    /// Override detected shell
    #[arg(long)]
    pub shell: Option<String>,

    /// Override working directory
    #[arg(long)]
    pub cwd: Option<String>,

    /// Model request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Show request/response metadata
    #[arg(long, short)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the suggestion daemon (used by shell plugin)
    #[command(hide = true)]
    Daemon {
        /// Path to write the listening port
        #[arg(long)]
        port_file: Option<PathBuf>,
    },

    /// Suggest a command completion (used by shell plugin)
    #[command(hide = true)]
    Suggest {
        /// Working directory for context
        #[arg(long)]
        cwd: Option<String>,

        /// The partially typed command
        #[arg(trailing_var_arg = true, required = true)]
        partial: Vec<String>,
    },

    /// Output shell initialization script
    Init {
        #[command(subcommand)]
        action: InitAction,
    },

    /// Manage komplete configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions for the komplete CLI itself
    Completions {
        shell: clap_complete::Shell,
    },

    /// Print detailed version information
    Version,
}

#[derive(Subcommand, Debug)]
pub enum InitAction {
    /// Output the zsh autosuggest plugin (includes alias k=komplete)
    Zsh,
    /// Output the shell alias (alias k=komplete)
    Alias,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List configured keys
    List,
    /// Print the config file path
    Path,
}
