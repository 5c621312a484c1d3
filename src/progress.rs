//! Terminal progress bars for indexing and model downloads.
//!
//! Bars draw to stderr and stay hidden when stderr is not a terminal.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::semantic::Progress;

const DOWNLOAD_SCALE: u64 = 1000;

fn new_bar(len: u64, template: &str) -> ProgressBar {
    if !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(len);
    let style = ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Bar for an indexing pass. The length is set by the first progress value.
pub struct IndexBar {
    bar: ProgressBar,
}

impl IndexBar {
    pub fn new() -> Self {
        Self {
            bar: new_bar(0, "{spinner} Indexing [{bar:30}] {pos}/{len} ({eta})"),
        }
    }

    pub fn update(&self, progress: Progress) {
        self.bar.set_length(progress.total as u64);
        self.bar.set_position(progress.processed as u64);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Bar for the model download, fed with fractions in `[0, 1]`.
pub struct DownloadBar {
    bar: ProgressBar,
}

impl DownloadBar {
    pub fn new() -> Self {
        Self {
            bar: new_bar(
                DOWNLOAD_SCALE,
                "{spinner} Downloading model [{bar:30}] {percent}% ({elapsed})",
            ),
        }
    }

    pub fn update(&self, fraction: f64) {
        let position = (fraction.clamp(0.0, 1.0) * DOWNLOAD_SCALE as f64).round() as u64;
        self.bar.set_position(position);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bars_accept_updates_when_hidden() {
        let index = IndexBar::new();
        index.update(Progress {
            processed: 0,
            total: 3,
        });
        index.update(Progress {
            processed: 3,
            total: 3,
        });
        index.finish();

        let download = DownloadBar::new();
        download.update(0.5);
        download.update(2.0);
        download.finish();
    }
}
