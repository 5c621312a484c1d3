use std::path::PathBuf;

use anyhow::Result;

use crate::{
    app::AppFactory,
    cli::commands::{
        AddCommand, CategoryCommand, DeleteCommand, EditCommand, ImportCommand, IndexCommand,
        ModelDownloadCommand, SearchCommand, SemanticCommand,
    },
    config::Config,
    records::{ItemKind, RecordUpdate},
    semantic::SemanticSearchService,
};

use super::types::{CategoryArgs, ModelArgs, SemanticArgs};

pub fn handle_search(
    query: Option<String>,
    semantic: bool,
    text: bool,
    json: bool,
    config: &Config,
    service: &SemanticSearchService,
) -> Result<()> {
    let search_command = SearchCommand::new(query, semantic, text, json, config);
    search_command.execute(service).map_err(|e| anyhow::anyhow!(e))
}

pub fn handle_index(service: &SemanticSearchService) -> Result<()> {
    IndexCommand
        .execute(service)
        .map_err(|e| anyhow::anyhow!(e))
}

pub fn handle_add(
    category: String,
    title: String,
    description: Option<String>,
    kind: Option<ItemKind>,
    content: String,
    service: &SemanticSearchService,
) -> Result<()> {
    let add_command = AddCommand::new(category, title, description, kind, content)?;
    add_command.execute(service).map_err(|e| anyhow::anyhow!(e))
}

pub fn handle_edit(
    id: String,
    update: RecordUpdate,
    service: &SemanticSearchService,
) -> Result<()> {
    let edit_command = EditCommand::new(id, update)?;
    edit_command.execute(service).map_err(|e| anyhow::anyhow!(e))
}

pub fn handle_delete(id: String, yes: bool, service: &SemanticSearchService) -> Result<()> {
    let delete_command = DeleteCommand::new(id, yes)?;
    delete_command
        .execute(service)
        .map_err(|e| anyhow::anyhow!(e))
}

pub fn handle_category(action: CategoryArgs, service: &SemanticSearchService) -> Result<()> {
    let category_command = CategoryCommand::new(action)?;
    category_command
        .execute(service)
        .map_err(|e| anyhow::anyhow!(e))
}

pub fn handle_import(file: PathBuf, service: &SemanticSearchService) -> Result<()> {
    let import_command = ImportCommand::new(file)?;
    import_command
        .execute(service)
        .map_err(|e| anyhow::anyhow!(e))
}

pub fn handle_semantic(
    action: SemanticArgs,
    config: &mut Config,
    service: Option<&SemanticSearchService>,
) -> Result<()> {
    SemanticCommand::new(action)
        .execute(config, service)
        .map_err(|e| anyhow::anyhow!(e))
}

pub fn handle_model(action: ModelArgs, config: &Config) -> Result<()> {
    match action {
        ModelArgs::Download {} => {
            let files = AppFactory::model_files(config);
            ModelDownloadCommand::new(files)
                .execute(config)
                .map_err(|e| anyhow::anyhow!(e))
        }
    }
}
