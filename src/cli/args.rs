//! CLI argument definitions using clap

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::domain::Money;

/// Sales network manager: elements, their parents, products and debts
#[derive(Parser, Debug)]
#[command(name = "salesnet")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-d info, -dd debug, -ddd trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub debug: u8,

    /// Directory with a local .salesnet.toml (default: cwd)
    #[arg(short = 'C', long, global = true, value_hint = ValueHint::DirPath)]
    pub config_dir: Option<PathBuf>,

    /// Network data file, overrides configuration
    #[arg(long, global = true, env = "SALESNET_DATA_FILE", value_hint = ValueHint::FilePath)]
    pub data_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage products
    Product {
        #[command(subcommand)]
        command: ProductCommands,
    },

    /// Manage network elements
    Element {
        #[command(subcommand)]
        command: ElementCommands,
    },

    /// Show the network as trees
    Tree,

    /// Administrative debt actions
    Debt {
        #[command(subcommand)]
        command: DebtCommands,
    },

    /// Verify stored levels against the parent chains
    Check {
        /// Rewrite drifted levels
        #[arg(long)]
        fix: bool,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProductCommands {
    /// Add a product
    Add {
        /// Unique product name
        #[arg(long)]
        name: String,
        /// Model designator
        #[arg(long)]
        model: Option<String>,
        /// Release date (YYYY-MM-DD)
        #[arg(long)]
        release_date: Option<NaiveDate>,
    },

    /// List products
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one product as JSON
    Show { id: u64 },

    /// Change product fields
    Update {
        id: u64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, conflicts_with = "clear_model")]
        model: Option<String>,
        /// Remove the model designator
        #[arg(long)]
        clear_model: bool,
        #[arg(long, conflicts_with = "clear_release_date")]
        release_date: Option<NaiveDate>,
        /// Remove the release date
        #[arg(long)]
        clear_release_date: bool,
    },

    /// Remove a product (detached from all elements)
    Remove { id: u64 },
}

/// Contact fields shared by `element add` and `element update`.
#[derive(Args, Debug, Default)]
pub struct ContactArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub country: Option<String>,
    #[arg(long)]
    pub city: Option<String>,
    #[arg(long)]
    pub street: Option<String>,
    #[arg(long)]
    pub building: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ElementCommands {
    /// Add an element; its level is derived from the parent
    Add {
        #[command(flatten)]
        contact: ContactArgs,
        /// Parent element id (omit for a root)
        #[arg(long)]
        parent: Option<u64>,
        /// Product id, repeatable
        #[arg(long = "product")]
        products: Vec<u64>,
        /// Opening debt to the parent
        #[arg(long)]
        debt: Option<Money>,
    },

    /// Change element fields or move it under another parent
    Update {
        id: u64,
        #[command(flatten)]
        contact: ContactArgs,
        /// New parent element id
        #[arg(long, conflicts_with = "detach")]
        parent: Option<u64>,
        /// Make the element a root
        #[arg(long)]
        detach: bool,
        /// Replace the product set, repeatable
        #[arg(long = "product")]
        products: Vec<u64>,
        /// Clear all products
        #[arg(long, conflicts_with = "products")]
        no_products: bool,
        /// Read-only: accepted but ignored
        #[arg(long)]
        debt: Option<Money>,
    },

    /// Show one element as JSON
    Show { id: u64 },

    /// List elements ordered by city
    List {
        /// Only elements in this country
        #[arg(long)]
        country: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Remove an element together with its subtree
    Remove { id: u64 },

    /// Create a batch of elements from a JSON array
    Import {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum DebtCommands {
    /// Reset debt to parent to zero
    Clear {
        /// Element ids
        #[arg(required = true, num_args = 1..)]
        ids: Vec<u64>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print effective configuration
    Show,
    /// Print config file locations
    Path,
    /// Print a commented config template
    Template,
}
