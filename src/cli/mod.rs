use clap::{Parser, Subcommand};

use crate::records::ItemKind;

mod commands;
mod errors;
mod handlers;
mod types;
mod validation;

pub use handlers::*;
pub use types::*;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search records
    Search {
        /// Search query. Empty lists everything.
        #[clap(allow_hyphen_values = true)]
        query: Option<String>,

        /// Rank by meaning (overrides the configured default)
        #[clap(short, long, conflicts_with = "text")]
        semantic: bool,

        /// Plain substring matching (overrides the configured default)
        #[clap(short, long)]
        text: bool,

        /// Print results as JSON
        #[clap(long, default_value = "false")]
        json: bool,
    },
    /// Compute embeddings for records that have none
    Index {},
    /// Add a record
    Add {
        /// Category name, created when missing
        #[clap(short, long)]
        category: String,

        /// Record title
        #[clap(short, long)]
        title: String,

        /// Record description
        #[clap(short, long)]
        description: Option<String>,

        /// Record kind. Inferred from the content when omitted.
        #[clap(short, long, value_enum)]
        kind: Option<ItemKind>,

        /// A url or free text
        #[clap(allow_hyphen_values = true)]
        content: String,
    },
    /// Edit a record by id. The stored embedding is kept.
    Edit {
        id: String,

        /// New title
        #[clap(short, long)]
        title: Option<String>,

        /// New description. An empty value clears it.
        #[clap(short, long)]
        description: Option<String>,

        /// New url or text
        #[clap(long, allow_hyphen_values = true)]
        content: Option<String>,

        /// New kind
        #[clap(short, long, value_enum)]
        kind: Option<ItemKind>,

        /// Move to this existing category
        #[clap(short, long)]
        category: Option<String>,
    },
    /// Delete a record by id
    Delete {
        id: String,

        /// Auto confirm
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },
    /// Manage categories
    Category {
        #[clap(subcommand)]
        action: CategoryArgs,
    },
    /// Import categories from an HTML link page
    Import {
        /// Path to the html file
        file: std::path::PathBuf,
    },
    /// Toggle semantic search
    Semantic {
        #[clap(subcommand)]
        action: SemanticArgs,
    },
    /// Manage the encoder model
    Model {
        #[clap(subcommand)]
        action: ModelArgs,
    },
}
