//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Showroom back office - fetch backend data through the local cache and
/// manage that cache
#[derive(Parser, Debug)]
#[command(name = "showroom")]
#[command(about = "Showroom back-office data cache")]
#[command(version)]
pub struct Cli {
    /// Backend URL, overriding the config file and SHOWROOM_BACKEND_URL
    #[arg(long, global = true, value_name = "URL")]
    pub backend_url: Option<String>,

    /// Also write logs to this file (level from RUST_LOG, default warn)
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Save backend and cache settings to the config file
    Configure {
        #[arg(long, value_name = "URL")]
        backend_url: Option<String>,
        #[arg(long, value_name = "DIR")]
        cache_dir: Option<PathBuf>,
        /// Branch used by `fetch products` when --branch is omitted
        #[arg(long, value_name = "ID")]
        default_branch: Option<String>,
    },

    /// Store the backend API key in the OS keychain
    Login,

    /// Remove the stored API key
    Logout,

    /// Load a resource, from the cache when fresh
    Fetch {
        resource: ResourceKind,
        /// Branch id for products and employees
        #[arg(long, short)]
        branch: Option<String>,
        /// Ignore the cache and fetch from the backend
        #[arg(long)]
        refresh: bool,
        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },

    /// Keep a resource loaded and refresh it on an interval
    Watch {
        resource: ResourceKind,
        #[arg(long, short)]
        branch: Option<String>,
        /// Refresh interval in seconds
        #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
        interval: u64,
    },

    /// Show cache statistics
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Remove cache entries (all of them unless --pattern is given)
    Clear {
        /// Only remove keys containing this text, e.g. `products_`
        #[arg(long)]
        pattern: Option<String>,
    },

    /// Remove expired cache entries
    Prune,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Branches,
    Categories,
    Products,
    Employees,
    Customers,
}
