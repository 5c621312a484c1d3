use std::fmt::Write as _;
use std::path::PathBuf;

use crate::{
    cli::{
        errors::{CliError, CliResult},
        types::{CategoryArgs, SemanticArgs},
        validation::*,
    },
    config::Config,
    eid::Eid,
    import,
    progress::{DownloadBar, IndexBar},
    records::{ItemKind, Record, RecordUpdate},
    semantic::{CategoryHits, ModelFiles, SemanticSearchService},
};

const MASKED_CONTENT: &str = "********";

fn confirm(message: &str) -> CliResult<bool> {
    match inquire::prompt_confirmation(message) {
        inquire::error::InquireResult::Ok(answer) => Ok(answer),
        inquire::error::InquireResult::Err(err) => Err(err.into()),
    }
}

/// Command for searching records
#[derive(Debug, Clone)]
pub struct SearchCommand {
    pub query: String,
    pub semantic: bool,
    pub json: bool,
}

impl SearchCommand {
    /// An explicit mode flag wins over the persisted toggle.
    pub fn new(query: Option<String>, semantic: bool, text: bool, json: bool, config: &Config) -> Self {
        let semantic = match (semantic, text) {
            (true, _) => true,
            (_, true) => false,
            _ => config.semantic_search.enabled,
        };

        Self {
            query: query.unwrap_or_default(),
            semantic,
            json,
        }
    }

    pub fn execute(self, service: &SemanticSearchService) -> CliResult<()> {
        if self.semantic && !self.query.trim().is_empty() && !service.is_model_loaded() {
            eprintln!("Model not available, using text matching. Run `linkdeck model download`.");
        }

        let results = service.search(&self.query, self.semantic);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&masked(results))?);
            return Ok(());
        }

        if results.is_empty() {
            println!("No results");
            return Ok(());
        }

        print!("{}", render_results(&results));
        Ok(())
    }
}

fn masked(mut results: Vec<CategoryHits>) -> Vec<CategoryHits> {
    for hit in results.iter_mut().flat_map(|c| c.hits.iter_mut()) {
        if hit.kind == ItemKind::Password {
            hit.content = MASKED_CONTENT.to_string();
        }
    }
    results
}

/// Plain-text listing: one block per category, one line per record.
pub fn render_results(results: &[CategoryHits]) -> String {
    let mut out = String::new();
    for category in results {
        let _ = writeln!(out, "{}", category.name);
        for hit in &category.hits {
            let content = if hit.kind == ItemKind::Password {
                MASKED_CONTENT
            } else {
                hit.content.as_str()
            };
            let _ = write!(out, "  {}  {}  {}", hit.id, hit.title, content);
            if !hit.label.is_empty() {
                let _ = write!(out, "  ({})", hit.label);
            }
            out.push('\n');
        }
    }
    out
}

/// Command for running an indexing pass
#[derive(Debug, Clone, Default)]
pub struct IndexCommand;

impl IndexCommand {
    pub fn execute(self, service: &SemanticSearchService) -> CliResult<()> {
        if !service.is_model_loaded() {
            println!("Model not available. Run `linkdeck model download` first.");
            return Ok(());
        }

        let mut pass = service.start_indexing()?;

        let cancel = pass.cancel_token();
        if let Err(err) = ctrlc::set_handler(move || {
            log::info!("Received interrupt, stopping after the current record");
            cancel.cancel();
        }) {
            log::warn!("Failed to set Ctrl+C handler: {err}");
        }

        let bar = IndexBar::new();
        for progress in &mut pass {
            bar.update(progress);
        }
        let report = pass.wait();
        bar.finish();
        let report = report?;

        if report.total == 0 {
            println!("Nothing to index");
            return Ok(());
        }

        let mut summary = format!("Indexed {}/{} records", report.embedded, report.total);
        if report.failed > 0 {
            let _ = write!(summary, ", {} failed", report.failed);
        }
        if report.cancelled {
            summary.push_str(" (cancelled)");
        }
        println!("{summary}");
        Ok(())
    }
}

/// Command for adding records
#[derive(Debug, Clone)]
pub struct AddCommand {
    pub category: String,
    pub record: Record,
}

impl AddCommand {
    pub fn new(
        category: String,
        title: String,
        description: Option<String>,
        kind: Option<ItemKind>,
        content: String,
    ) -> CliResult<Self> {
        let kind = kind.unwrap_or_else(|| infer_kind(&content));
        validate_record_create(&category, &title, &description, kind, &content)?;

        let mut record = Record::new(title.trim(), content.trim(), kind);
        if let Some(description) = description.filter(|d| !d.trim().is_empty()) {
            record = record.with_description(description.trim());
        }

        Ok(Self {
            category: category.trim().to_string(),
            record,
        })
    }

    pub fn execute(self, service: &SemanticSearchService) -> CliResult<()> {
        let id = service.add_record(&self.category, self.record)?;
        println!("{id}");
        Ok(())
    }
}

/// Command for deleting a record
#[derive(Debug, Clone)]
pub struct DeleteCommand {
    pub id: Eid,
    pub yes: bool,
}

impl DeleteCommand {
    pub fn new(id: String, yes: bool) -> CliResult<Self> {
        if id.trim().is_empty() {
            return Err(CliError::validation("id", "Id cannot be empty"));
        }
        Ok(Self {
            id: Eid::from(id.trim()),
            yes,
        })
    }

    pub fn execute(self, service: &SemanticSearchService) -> CliResult<()> {
        let record = service
            .find_record(&self.id)
            .ok_or_else(|| CliError::not_found(format!("Record not found: {}", self.id)))?;

        if !self.yes && !confirm(&format!("Delete \"{}\"?", record.title))? {
            return Ok(());
        }

        let removed = service.delete_record(&self.id)?;
        println!("Deleted \"{}\"", removed.title);
        Ok(())
    }
}

/// Command for editing a record
#[derive(Debug, Clone)]
pub struct EditCommand {
    pub id: Eid,
    pub update: RecordUpdate,
}

impl EditCommand {
    pub fn new(id: String, update: RecordUpdate) -> CliResult<Self> {
        if id.trim().is_empty() {
            return Err(CliError::validation("id", "Id cannot be empty"));
        }

        let trim = |value: Option<String>| value.map(|v| v.trim().to_string());
        let update = RecordUpdate {
            title: trim(update.title),
            description: trim(update.description),
            content: trim(update.content),
            kind: update.kind,
            category: trim(update.category),
        };
        validate_record_update(&update)?;

        Ok(Self {
            id: Eid::from(id.trim()),
            update,
        })
    }

    pub fn execute(self, service: &SemanticSearchService) -> CliResult<()> {
        let mut preview = service
            .find_record(&self.id)
            .ok_or_else(|| CliError::not_found(format!("Record not found: {}", self.id)))?;
        self.update.apply(&mut preview);
        if preview.kind == ItemKind::Link {
            validate_url(&preview.content)?;
        }

        let updated = service.update_record(&self.id, &self.update)?;
        println!("Updated \"{}\"", updated.title);
        Ok(())
    }
}

/// Command for managing categories
#[derive(Debug, Clone)]
pub struct CategoryCommand {
    pub action: CategoryArgs,
}

impl CategoryCommand {
    pub fn new(action: CategoryArgs) -> CliResult<Self> {
        match &action {
            CategoryArgs::Add { name } | CategoryArgs::Delete { name, .. } => {
                validate_category_name(name)?
            }
            CategoryArgs::List {} => {}
        }
        Ok(Self { action })
    }

    pub fn execute(self, service: &SemanticSearchService) -> CliResult<()> {
        match self.action {
            CategoryArgs::Add { name } => {
                let id = service.add_category(name.trim())?;
                println!("{id}");
            }
            CategoryArgs::Delete { name, yes } => {
                let name = name.trim();
                let count = service
                    .category_sizes()
                    .into_iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, count)| count)
                    .ok_or_else(|| CliError::not_found(format!("Category not found: {name}")))?;

                if !yes
                    && count > 0
                    && !confirm(&format!(
                        "Delete category \"{name}\" and move its {count} records?"
                    ))?
                {
                    return Ok(());
                }

                service.delete_category(name)?;
                println!("Deleted category \"{name}\"");
            }
            CategoryArgs::List {} => {
                for (name, count) in service.category_sizes() {
                    println!("{name} ({count})");
                }
            }
        }
        Ok(())
    }
}

/// Command for importing an html link page
#[derive(Debug, Clone)]
pub struct ImportCommand {
    pub file: PathBuf,
}

impl ImportCommand {
    pub fn new(file: PathBuf) -> CliResult<Self> {
        if !file.is_file() {
            return Err(CliError::not_found(format!(
                "File not found: {}",
                file.display()
            )));
        }
        Ok(Self { file })
    }

    pub fn execute(self, service: &SemanticSearchService) -> CliResult<()> {
        let categories =
            import::import_file(&self.file).map_err(|e| CliError::invalid_input(e.to_string()))?;
        let category_count = categories.len();
        let count = service.import(categories)?;
        println!("Imported {count} records from {category_count} categories");
        Ok(())
    }
}

/// Command for the persisted semantic-mode toggle
#[derive(Debug, Clone)]
pub struct SemanticCommand {
    pub action: SemanticArgs,
}

impl SemanticCommand {
    pub fn new(action: SemanticArgs) -> Self {
        Self { action }
    }

    /// `service` is only needed for `status`.
    pub fn execute(
        self,
        config: &mut Config,
        service: Option<&SemanticSearchService>,
    ) -> CliResult<()> {
        match self.action {
            SemanticArgs::On {} | SemanticArgs::Off {} => {
                let enabled = matches!(self.action, SemanticArgs::On {});
                config.semantic_search.enabled = enabled;
                config.save()?;
                println!(
                    "Semantic search {}",
                    if enabled { "enabled" } else { "disabled" }
                );
            }
            SemanticArgs::Status {} => {
                let service =
                    service.ok_or_else(|| CliError::internal("search service not initialized"))?;
                let status = service.status();
                println!(
                    "Semantic search: {}",
                    if config.semantic_search.enabled { "on" } else { "off" }
                );
                println!(
                    "Model: {}",
                    if status.model_loaded { "loaded" } else { "not available" }
                );
                println!("Indexed: {}/{} records", status.embedded, status.records);
            }
        }
        Ok(())
    }
}

/// Command for fetching the encoder model
#[derive(Debug, Clone)]
pub struct ModelDownloadCommand {
    pub files: ModelFiles,
}

impl ModelDownloadCommand {
    pub fn new(files: ModelFiles) -> Self {
        Self { files }
    }

    pub fn execute(self, config: &Config) -> CliResult<()> {
        if self.files.is_downloaded() {
            println!("Model already present in {}", self.files.dir().display());
            return Ok(());
        }

        let bar = DownloadBar::new();
        let result = self
            .files
            .download(config.semantic_search.download_timeout(), |fraction| {
                bar.update(fraction)
            });
        bar.finish();
        result?;

        println!("Model downloaded to {}", self.files.dir().display());
        println!("Run `linkdeck index` to compute embeddings.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::SearchHit;

    fn hit(title: &str, content: &str, kind: ItemKind, label: &str) -> SearchHit {
        SearchHit {
            id: Eid::from("01ID"),
            title: title.to_string(),
            description: None,
            content: content.to_string(),
            kind,
            score: 0.0,
            label: label.to_string(),
        }
    }

    #[test]
    fn test_search_mode_selection() {
        let mut config = Config::default();
        assert!(!SearchCommand::new(None, false, false, false, &config).semantic);
        assert!(SearchCommand::new(None, true, false, false, &config).semantic);

        config.semantic_search.enabled = true;
        assert!(SearchCommand::new(None, false, false, false, &config).semantic);
        assert!(!SearchCommand::new(None, false, true, false, &config).semantic);
    }

    #[test]
    fn test_render_results() {
        let results = vec![CategoryHits {
            id: Eid::from("01CAT"),
            name: "Local AI".to_string(),
            icon: None,
            hits: vec![
                hit("Ollama", "https://ollama.ai/", ItemKind::Link, "87% Match"),
                hit("Bank", "secret", ItemKind::Password, ""),
            ],
        }];

        let out = render_results(&results);
        assert_eq!(
            out,
            "Local AI\n  01ID  Ollama  https://ollama.ai/  (87% Match)\n  01ID  Bank  ********\n"
        );
    }

    #[test]
    fn test_masked_json() {
        let results = masked(vec![CategoryHits {
            id: Eid::from("01CAT"),
            name: "Vault".to_string(),
            icon: None,
            hits: vec![hit("Bank", "secret", ItemKind::Password, "")],
        }]);
        assert_eq!(results[0].hits[0].content, MASKED_CONTENT);
    }

    #[test]
    fn test_edit_command_trims_and_validates() {
        let cmd = EditCommand::new(
            " 01ID ".to_string(),
            RecordUpdate {
                title: Some(" Ollama ".to_string()),
                category: Some(" Local AI ".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(cmd.id, Eid::from("01ID"));
        assert_eq!(cmd.update.title.as_deref(), Some("Ollama"));
        assert_eq!(cmd.update.category.as_deref(), Some("Local AI"));

        assert!(EditCommand::new("01ID".to_string(), RecordUpdate::default()).is_err());
        assert!(EditCommand::new(" ".to_string(), RecordUpdate::default()).is_err());
    }

    #[test]
    fn test_add_command_infers_kind_and_trims() {
        let cmd = AddCommand::new(
            " Notes ".to_string(),
            " todo ".to_string(),
            Some("  ".to_string()),
            None,
            "buy milk".to_string(),
        )
        .unwrap();
        assert_eq!(cmd.category, "Notes");
        assert_eq!(cmd.record.title, "todo");
        assert_eq!(cmd.record.kind, ItemKind::Note);
        assert!(cmd.record.description.is_none());

        let cmd = AddCommand::new(
            "Local AI".to_string(),
            "Ollama".to_string(),
            None,
            None,
            "https://ollama.ai/".to_string(),
        )
        .unwrap();
        assert_eq!(cmd.record.kind, ItemKind::Link);
    }

    #[test]
    fn test_delete_requires_id() {
        assert!(DeleteCommand::new("  ".to_string(), true).is_err());
    }
}
