use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use homedir::my_home;

use crate::{
    config::Config,
    import,
    records::{BackendJson, RecordStore},
    semantic::{ModelFiles, OnnxEncoder, SemanticSearchService, TextEncoder},
    storage::BackendLocal,
};

const BASE_PATH_ENV: &str = "LINKDECK_BASE_PATH";

/// Filesystem locations used by the application
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_path: PathBuf,
}

/// Application factory for creating and configuring application components
pub struct AppFactory;

impl AppFactory {
    /// Get application paths, creating the base directory when needed
    pub fn get_paths() -> Result<AppPaths> {
        let base_path = Self::get_base_path()?;

        std::fs::create_dir_all(&base_path)
            .context("Failed to create application base directory")?;

        Ok(AppPaths { base_path })
    }

    pub fn create_config(paths: &AppPaths) -> Result<Config> {
        Config::load_with(&paths.base_path)
            .with_context(|| format!("Failed to load config from {}", paths.base_path.display()))
    }

    pub fn model_files(config: &Config) -> ModelFiles {
        let sem = &config.semantic_search;
        ModelFiles::new(config.model_dir(), &sem.model_url, &sem.vocab_url)
    }

    pub fn create_store(config: &Config) -> Result<Arc<dyn RecordStore>> {
        let local = BackendLocal::new(config.base_path())?;
        Ok(Arc::new(BackendJson::new(Arc::new(local), &config.data_file)))
    }

    /// Build the search service with the ONNX encoder.
    pub fn create_service(config: &Config) -> Result<SemanticSearchService> {
        let sem = &config.semantic_search;
        let encoder = OnnxEncoder::new(Self::model_files(config), sem.max_tokens)
            .with_runtime(sem.onnxruntime_path.clone());
        Self::create_service_with(config, Arc::new(encoder))
    }

    /// Build the search service around `encoder`, seeding the default
    /// link page into an empty store when configured to.
    pub fn create_service_with(
        config: &Config,
        encoder: Arc<dyn TextEncoder>,
    ) -> Result<SemanticSearchService> {
        let store = Self::create_store(config)?;
        let service = SemanticSearchService::load(store, encoder, &config.semantic_search)
            .context("Failed to load records")?;

        if config.seed_default_data && service.library().read().is_empty() {
            let defaults = import::default_categories()?;
            let count = service.import(defaults)?;
            log::info!("seeded {count} default records");
        }

        Ok(service)
    }

    fn get_base_path() -> Result<PathBuf> {
        if let Ok(base_path) = std::env::var(BASE_PATH_ENV) {
            return Ok(PathBuf::from(base_path));
        }

        let home = my_home()
            .context("Could not determine home directory")?
            .context("Home directory path is empty")?;
        Ok(default_base_path(&home))
    }
}

fn default_base_path(home: &Path) -> PathBuf {
    home.join(".local").join("share").join("linkdeck")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_base_path() {
        assert_eq!(
            default_base_path(Path::new("/home/u")),
            PathBuf::from("/home/u/.local/share/linkdeck")
        );
    }
}
