use clap::Subcommand;

#[derive(Subcommand, Debug, Clone)]
pub enum CategoryArgs {
    /// Create an empty category
    Add {
        /// Category name
        name: String,
    },
    /// Delete a category. Its records move to the first remaining category.
    Delete {
        /// Category name
        name: String,

        /// Auto confirm
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },
    /// List categories with record counts
    List {},
}

#[derive(Subcommand, Debug, Clone)]
pub enum SemanticArgs {
    /// Search semantically by default
    On {},
    /// Search by text by default
    Off {},
    /// Show model availability and how many records are indexed
    Status {},
}

#[derive(Subcommand, Debug, Clone)]
pub enum ModelArgs {
    /// Fetch the encoder model and vocabulary
    Download {},
}
