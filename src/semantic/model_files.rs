//! Location and acquisition of the encoder artifacts.
//!
//! Two files live in the model directory:
//! - `model.onnx`: the sentence-transformer inference graph
//! - `vocab.txt`: the WordPiece vocabulary table
//!
//! Both must be present for the encoder to load.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MODEL_FILE_NAME: &str = "model.onnx";
const VOCAB_FILE_NAME: &str = "vocab.txt";

/// Share of overall download progress attributed to the model file.
const MODEL_PROGRESS_SHARE: f64 = 0.95;

const CHUNK_SIZE: usize = 8192;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ModelFiles {
    dir: PathBuf,
    model_url: String,
    vocab_url: String,
}

impl ModelFiles {
    pub fn new(dir: PathBuf, model_url: &str, vocab_url: &str) -> Self {
        Self {
            dir,
            model_url: model_url.to_string(),
            vocab_url: vocab_url.to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE_NAME)
    }

    pub fn vocab_path(&self) -> PathBuf {
        self.dir.join(VOCAB_FILE_NAME)
    }

    /// Both artifacts are on disk.
    pub fn is_downloaded(&self) -> bool {
        self.model_path().is_file() && self.vocab_path().is_file()
    }

    /// Download whichever artifacts are missing.
    ///
    /// `on_progress` receives the overall fraction in [0.0, 1.0]; the model
    /// covers the first 95%, the vocabulary the rest. Progress is only
    /// reported when the server announces a content length.
    pub fn download(
        &self,
        timeout: Duration,
        mut on_progress: impl FnMut(f64),
    ) -> Result<(), DownloadError> {
        std::fs::create_dir_all(&self.dir)?;

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        fetch_file(
            &client,
            &self.model_url,
            &self.model_path(),
            (0.0, MODEL_PROGRESS_SHARE),
            &mut on_progress,
        )?;
        fetch_file(
            &client,
            &self.vocab_url,
            &self.vocab_path(),
            (MODEL_PROGRESS_SHARE, 1.0),
            &mut on_progress,
        )?;

        on_progress(1.0);
        Ok(())
    }
}

fn fetch_file(
    client: &reqwest::blocking::Client,
    url: &str,
    destination: &Path,
    (start, end): (f64, f64),
    on_progress: &mut impl FnMut(f64),
) -> Result<(), DownloadError> {
    if destination.exists() {
        log::debug!("{} already present, skipping", destination.display());
        return Ok(());
    }

    log::info!("downloading {url}");
    let mut response = client.get(url).send()?.error_for_status()?;
    let total_bytes = response.content_length();

    // a partial file must never look like a finished download
    let temp_path = destination.with_extension("part");
    let result = (|| -> Result<(), DownloadError> {
        let mut file = File::create(&temp_path)?;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut total_read = 0u64;

        loop {
            let read = response.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read])?;
            total_read += read as u64;

            if let Some(total) = total_bytes.filter(|t| *t > 0) {
                let fraction = (total_read as f64 / total as f64).min(1.0);
                on_progress(start + fraction * (end - start));
            }
        }

        file.flush()?;
        std::fs::rename(&temp_path, destination)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }

    result
}
