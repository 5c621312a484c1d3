//! Text fed to the encoder for a record.

/// Build the descriptor embedded for a record.
///
/// A missing description collapses to an empty segment; it is never
/// omitted, so the shape of the text is the same for every record.
pub fn descriptor(title: &str, description: Option<&str>) -> String {
    format!(
        "Title: {}. Description: {}.",
        title,
        description.unwrap_or_default()
    )
}
