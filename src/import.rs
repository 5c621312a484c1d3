//! Import of HTML link pages.
//!
//! Every `<h3>` opens a category; the links, `<pre><code>` blocks and plain
//! paragraphs after it become its records.

use scraper::{ElementRef, Html, Selector};

use crate::records::{Category, ItemKind, Record};

const NOTE_TITLE_CHARS: usize = 30;
const SNIPPET_TITLE: &str = "Code Snippet";

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid selector: {0}")]
    Selector(String),
}

fn selector(css: &str) -> Result<Selector, ImportError> {
    Selector::parse(css).map_err(|err| ImportError::Selector(format!("{css}: {err:?}")))
}

pub fn import_file(path: &std::path::Path) -> Result<Vec<Category>, ImportError> {
    let html = std::fs::read_to_string(path).map_err(|source| ImportError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_html(&html)
}

/// Parse categories out of `html`. Categories that end up empty are dropped.
pub fn parse_html(html: &str) -> Result<Vec<Category>, ImportError> {
    let document = Html::parse_document(html);
    let blocks = selector("h3, a[href], pre, p")?;
    let code = selector("code")?;
    let anchor = selector("a")?;

    let mut categories: Vec<Category> = vec![];
    let mut current: Option<Category> = None;

    for element in document.select(&blocks) {
        if element.value().name() == "h3" {
            if let Some(done) = current.take() {
                categories.push(done);
            }
            current = Some(Category::new(&collapse_text(element)));
            continue;
        }

        let Some(category) = current.as_mut() else {
            continue;
        };

        match element.value().name() {
            "a" => {
                let href = element.value().attr("href").unwrap_or_default().trim();
                let title = collapse_text(element);
                if href.is_empty() {
                    continue;
                }
                let title = if title.is_empty() { href } else { title.as_str() };
                category.items.push(Record::new(title, href, ItemKind::Link));
            }
            "pre" => {
                let Some(code) = element.select(&code).next() else {
                    continue;
                };
                let text: String = code.text().collect();
                let text = text.trim();
                if !text.is_empty() {
                    category
                        .items
                        .push(Record::new(SNIPPET_TITLE, text, ItemKind::Snippet));
                }
            }
            "p" => {
                if element.select(&anchor).next().is_some() {
                    continue;
                }
                let text = collapse_text(element);
                if !text.is_empty() {
                    category
                        .items
                        .push(Record::new(&note_title(&text), &text, ItemKind::Note));
                }
            }
            _ => {}
        }
    }

    if let Some(done) = current {
        categories.push(done);
    }

    categories.retain(|c| !c.items.is_empty());
    Ok(categories)
}

/// The built-in link page imported on first start.
pub fn default_categories() -> Result<Vec<Category>, ImportError> {
    parse_html(DEFAULT_PAGE)
}

fn collapse_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn note_title(text: &str) -> String {
    if text.chars().count() > NOTE_TITLE_CHARS {
        let head: String = text.chars().take(NOTE_TITLE_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

const DEFAULT_PAGE: &str = r#"
<div class="main-content">
    <div class="row">
        <div class="column">
            <h3>Google AI Stuff</h3>
            <p><a href="https://notebooklm.google.com/">NoteBookLM</a></p>
            <p><a href="https://gemini.google.com/app">Gemini</a></p>
            <p><a href="https://ai.google/">Google AI</a></p>
            <p><a href="https://deepmind.google/">Google DeepMind</a></p>
            <p><a href="https://cloud.google.com/ai">Google Cloud AI</a></p>
            <p><a href="https://jules.google.com/">Jules</a></p>
            <p><a href="https://aistudio.google.com/">Google AI Studio</a></p>
            <p><a href="https://developers.google.com/">Google for Developers</a></p>
        </div>
        <div class="column">
            <h3>Other AI Stuff</h3>
            <p><a href="https://huggingface.co/">Hugging Face</a></p>
            <p><a href="https://openai.com/">OpenAI</a></p>
            <p><a href="https://www.anthropic.com/">Anthropic</a></p>
            <p><a href="https://www.perplexity.ai/">Perplexity AI</a></p>
            <p><a href="https://poe.com/">Poe by Quora</a></p>
            <p><a href="https://www.kaggle.com/">Kaggle</a></p>
            <p><a href="https://www.tensorflow.org/">TensorFlow</a></p>
        </div>
    </div>
    <div class="row">
        <div class="column">
            <h3>Local AI</h3>
            <p><a href="https://developer.nvidia.com/">NVIDIA Developer</a></p>
            <p><a href="https://rocm.docs.amd.com/en/latest/">AMD ROCm Docs</a></p>
            <p><a href="https://lmstudio.ai/">LM Studio</a></p>
            <p><a href="https://ollama.ai/">Ollama</a></p>
            <p><a href="https://jan.ai/">Jan</a></p>
            <p><a href="https://gpt4all.io/">GPT4All</a></p>
        </div>
        <div class="column">
            <h3>Machine Learning</h3>
            <p><a href="https://www.coursera.org/learn/machine-learning">Coursera ML</a></p>
            <p><a href="https://www.fast.ai/">fast.ai</a></p>
            <p><a href="https://scikit-learn.org/stable/">Scikit-learn</a></p>
            <p><a href="https://pytorch.org/">PyTorch</a></p>
            <p><a href="https://paperswithcode.com/">Papers with Code</a></p>
            <p><a href="https://distill.pub/">Distill.pub</a></p>
            <p><a href="https://www.reddit.com/r/MachineLearning/">ML Subreddit</a></p>
        </div>
        <div class="column">
            <h3>Developer Resources</h3>
            <p><a href="https://stackoverflow.com/">Stack Overflow</a></p>
            <p><a href="https://github.com/">GitHub</a></p>
            <p><a href="https://news.ycombinator.com/">Hacker News</a></p>
            <p><a href="https://dev.to/">Dev.to</a></p>
            <p><a href="https://alistapart.com/">A List Apart</a></p>
            <p><a href="https://www.smashingmagazine.com/">Smashing Magazine</a></p>
        </div>
    </div>
</div>
"#;
