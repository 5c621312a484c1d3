use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod eid;
mod import;
mod library;
mod lock;
mod progress;
mod records;
mod semantic;
mod storage;
#[cfg(test)]
mod tests;

use app::AppFactory;
use cli::{Command, SemanticArgs};
use semantic::SemanticSearchService;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn require(service: &Option<SemanticSearchService>) -> anyhow::Result<&SemanticSearchService> {
    service.as_ref().context("search service not initialized")
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = cli::Args::parse();

    let paths = AppFactory::get_paths()?;
    let _lock = lock::FileLock::try_acquire(&paths.base_path)
        .with_context(|| format!("Failed to lock {}", paths.base_path.display()))?;
    let mut config = AppFactory::create_config(&paths)?;

    // toggling the mode and fetching the model never touch the records
    let service = match &args.command {
        Command::Model { .. }
        | Command::Semantic {
            action: SemanticArgs::On {} | SemanticArgs::Off {},
        } => None,
        _ => Some(AppFactory::create_service(&config)?),
    };

    match args.command {
        Command::Search {
            query,
            semantic,
            text,
            json,
        } => cli::handle_search(query, semantic, text, json, &config, require(&service)?),
        Command::Index {} => cli::handle_index(require(&service)?),
        Command::Add {
            category,
            title,
            description,
            kind,
            content,
        } => cli::handle_add(
            category,
            title,
            description,
            kind,
            content,
            require(&service)?,
        ),
        Command::Edit {
            id,
            title,
            description,
            content,
            kind,
            category,
        } => cli::handle_edit(
            id,
            records::RecordUpdate {
                title,
                description,
                content,
                kind,
                category,
            },
            require(&service)?,
        ),
        Command::Delete { id, yes } => cli::handle_delete(id, yes, require(&service)?),
        Command::Category { action } => cli::handle_category(action, require(&service)?),
        Command::Import { file } => cli::handle_import(file, require(&service)?),
        Command::Semantic { action } => cli::handle_semantic(action, &mut config, service.as_ref()),
        Command::Model { action } => cli::handle_model(action, &config),
    }
}
