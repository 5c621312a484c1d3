use url::Url;

use crate::cli::errors::{CliError, CliResult};
use crate::records::{ItemKind, RecordUpdate};

/// Validates URL format
pub fn validate_url(url: &str) -> CliResult<()> {
    if url.trim().is_empty() {
        return Err(CliError::validation("url", "URL cannot be empty"));
    }

    match Url::parse(url) {
        Ok(parsed_url) => {
            if !parsed_url.has_host() {
                return Err(CliError::validation(
                    "url",
                    "URL must have a host (https://example.com/)",
                ));
            }
            Ok(())
        }
        Err(_) => Err(CliError::validation("url", "Invalid URL format")),
    }
}

/// Validates title length
pub fn validate_title(title: &str) -> CliResult<()> {
    if title.trim().is_empty() {
        return Err(CliError::validation("title", "Title cannot be empty"));
    }
    if title.len() > 500 {
        return Err(CliError::validation(
            "title",
            "Title cannot exceed 500 characters",
        ));
    }
    Ok(())
}

/// Validates description length
pub fn validate_description(description: &str) -> CliResult<()> {
    if description.len() > 2000 {
        return Err(CliError::validation(
            "description",
            "Description cannot exceed 2000 characters",
        ));
    }
    Ok(())
}

pub fn validate_category_name(name: &str) -> CliResult<()> {
    if name.trim().is_empty() {
        return Err(CliError::validation("category", "Category name cannot be empty"));
    }
    if name.len() > 100 {
        return Err(CliError::validation(
            "category",
            "Category name cannot exceed 100 characters",
        ));
    }
    Ok(())
}

/// Content that parses as an absolute URL with a host is a link,
/// everything else a note.
pub fn infer_kind(content: &str) -> ItemKind {
    match Url::parse(content.trim()) {
        Ok(url) if url.has_host() => ItemKind::Link,
        _ => ItemKind::Note,
    }
}

/// Validates record creation input
pub fn validate_record_create(
    category: &str,
    title: &str,
    description: &Option<String>,
    kind: ItemKind,
    content: &str,
) -> CliResult<()> {
    validate_category_name(category)?;
    validate_title(title)?;

    if let Some(description) = description {
        validate_description(description)?;
    }

    if content.trim().is_empty() {
        return Err(CliError::validation("content", "Content cannot be empty"));
    }

    if kind == ItemKind::Link {
        validate_url(content)?;
    }

    Ok(())
}

/// Validates the fields an edit touches
pub fn validate_record_update(update: &RecordUpdate) -> CliResult<()> {
    if update.is_empty() {
        return Err(CliError::invalid_input("Nothing to update"));
    }
    if let Some(title) = &update.title {
        validate_title(title)?;
    }
    if let Some(description) = &update.description {
        validate_description(description)?;
    }
    if let Some(category) = &update.category {
        validate_category_name(category)?;
    }
    if update.content.as_deref().is_some_and(|c| c.trim().is_empty()) {
        return Err(CliError::validation("content", "Content cannot be empty"));
    }
    Ok(())
}
