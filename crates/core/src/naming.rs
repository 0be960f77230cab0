//! Naming convention for persisted generation artifacts.

use crate::generation::Stage;
use crate::types::{JobId, SuggestionIndex};

/// Blob name for the `n`-th artifact of a stage.
///
/// Convention: `{job_id}-{suggestion_index}-{stage}-{n}.{extension}`
pub fn artifact_name(
    job_id: JobId,
    suggestion_index: SuggestionIndex,
    stage: Stage,
    n: usize,
    extension: &str,
) -> String {
    format!("{job_id}-{suggestion_index}-{}-{n}.{extension}", stage.as_str())
}

/// File extension for an image MIME type. Unknown types map to `bin`.
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => "bin",
    }
}
