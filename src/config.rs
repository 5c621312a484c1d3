use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::semantic::{DEFAULT_RELEVANCE_THRESHOLD, MAX_TOKENS};
use crate::storage::{BackendLocal, StorageManager};

const CONFIG_FILE: &str = "config.yaml";
const DEFAULT_DATA_FILE: &str = "links.json";

const DEFAULT_MODEL_DIR: &str = "models";
const DEFAULT_MODEL_URL: &str =
    "https://huggingface.co/Xenova/all-MiniLM-L6-v2/resolve/main/onnx/model_quantized.onnx";
const DEFAULT_VOCAB_URL: &str =
    "https://huggingface.co/Xenova/all-MiniLM-L6-v2/resolve/main/vocab.txt";
/// Default bound on a single encode call in seconds
const DEFAULT_ENCODE_TIMEOUT_SECS: u64 = 30;
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// Configuration for semantic search functionality
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SemanticSearchConfig {
    /// Semantic mode toggle used when a search does not pick a mode
    #[serde(default)]
    pub enabled: bool,

    /// Directory holding model.onnx and vocab.txt, relative to the base path
    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    #[serde(default = "default_model_url")]
    pub model_url: String,

    #[serde(default = "default_vocab_url")]
    pub vocab_url: String,

    /// Records must score strictly above this to be shown [0.0, 1.0]
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_encode_timeout_secs")]
    pub encode_timeout_secs: u64,

    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// ONNX Runtime shared library. Falls back to $ORT_DYLIB_PATH, then the
    /// platform default name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onnxruntime_path: Option<PathBuf>,
}

impl Default for SemanticSearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model_dir: default_model_dir(),
            model_url: default_model_url(),
            vocab_url: default_vocab_url(),
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
            max_tokens: MAX_TOKENS,
            encode_timeout_secs: DEFAULT_ENCODE_TIMEOUT_SECS,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            onnxruntime_path: None,
        }
    }
}

impl SemanticSearchConfig {
    pub fn encode_timeout(&self) -> Duration {
        Duration::from_secs(self.encode_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

fn default_model_dir() -> String {
    DEFAULT_MODEL_DIR.to_string()
}

fn default_model_url() -> String {
    DEFAULT_MODEL_URL.to_string()
}

fn default_vocab_url() -> String {
    DEFAULT_VOCAB_URL.to_string()
}

fn default_relevance_threshold() -> f32 {
    DEFAULT_RELEVANCE_THRESHOLD
}

fn default_max_tokens() -> usize {
    MAX_TOKENS
}

fn default_encode_timeout_secs() -> u64 {
    DEFAULT_ENCODE_TIMEOUT_SECS
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_file")]
    pub data_file: String,
    /// Import the built-in link page on first start
    #[serde(default = "default_seed")]
    pub seed_default_data: bool,
    #[serde(default)]
    pub semantic_search: SemanticSearchConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            seed_default_data: default_seed(),
            semantic_search: SemanticSearchConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_data_file() -> String {
    DEFAULT_DATA_FILE.to_string()
}

fn default_seed() -> bool {
    true
}

impl Config {
    fn validate(&self) -> anyhow::Result<()> {
        if self.data_file.trim().is_empty() {
            bail!("data_file must not be empty");
        }

        let sem = &self.semantic_search;
        if !(0.0..=1.0).contains(&sem.relevance_threshold) {
            bail!(
                "semantic_search.relevance_threshold must be between 0.0 and 1.0, got {}",
                sem.relevance_threshold
            );
        }

        if sem.max_tokens == 0 {
            bail!("semantic_search.max_tokens must be greater than 0");
        }

        if sem.encode_timeout_secs == 0 {
            bail!("semantic_search.encode_timeout_secs must be greater than 0");
        }

        if sem.download_timeout_secs == 0 {
            bail!("semantic_search.download_timeout_secs must be greater than 0");
        }

        Ok(())
    }

    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        let store = BackendLocal::new(base_path)?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            store.write(CONFIG_FILE, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str =
            String::from_utf8(store.read(CONFIG_FILE)?).context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            log::debug!("upgrading {CONFIG_FILE}");
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn model_dir(&self) -> PathBuf {
        self.base_path.join(&self.semantic_search.model_dir)
    }
}
