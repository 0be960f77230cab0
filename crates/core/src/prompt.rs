//! Prompt assembly for the stylization and multimodal stages.
//!
//! A trimmed, non-blank custom prompt always wins. Otherwise the prompt is
//! assembled from the suggestion's outfit and scene text plus fixed format
//! and realism directives. Every prompt is cut to [`MAX_PROMPT_CHARS`] on a
//! character boundary; assembly never fails.

use crate::job::StyleSuggestion;

/// Upper bound on prompt length accepted by the providers.
pub const MAX_PROMPT_CHARS: usize = 2000;

/// Framing directive appended to assembled prompts.
pub const FORMAT_DIRECTIVE: &str = "Full-body photograph in vertical 3:4 framing, \
the person centred and visible from head to toe.";

/// Realism directive appended to assembled prompts.
pub const REALISM_DIRECTIVE: &str = "Photorealistic, natural skin texture, \
realistic lighting and shadows. Keep the person's face, body shape and skin tone unchanged.";

/// Instruction for multimodal garment compositing.
pub const TRYON_INSTRUCTION: &str = "Dress the person in the first image in the garment \
shown in the second image. Keep pose, background, face and body unchanged; match the \
garment's colour, fabric and fit exactly.";

/// Instruction for multimodal identity restoration.
pub const IDENTITY_RESTORE_INSTRUCTION: &str = "Restore the identity of the person in the \
first image using the face in the second image as reference. Change nothing else.";

/// Build the prompt sent to the stylization stage.
pub fn build_stylize_prompt(
    custom_prompt: Option<&str>,
    style: Option<&StyleSuggestion>,
    occasion: &str,
) -> String {
    if let Some(custom) = custom_prompt.map(str::trim).filter(|p| !p.is_empty()) {
        return truncate_prompt(custom);
    }

    let mut parts: Vec<String> = Vec::with_capacity(5);
    match style {
        Some(style) => {
            push_sentence(&mut parts, "Outfit", &style.outfit_description);
            push_sentence(&mut parts, "Scene", &style.scene_prompt);
        }
        None => {
            parts.push(format!(
                "Scene: a setting that suits {}.",
                occasion.trim().trim_end_matches('.')
            ));
        }
    }
    push_sentence(&mut parts, "Occasion", occasion);
    parts.push(FORMAT_DIRECTIVE.to_string());
    parts.push(REALISM_DIRECTIVE.to_string());

    truncate_prompt(&parts.join(" "))
}

/// Cut a prompt to [`MAX_PROMPT_CHARS`] characters.
pub fn truncate_prompt(prompt: &str) -> String {
    truncate_chars(prompt, MAX_PROMPT_CHARS)
}

/// Deterministically keep the first `max` characters, never splitting a
/// multi-byte character.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

fn push_sentence(parts: &mut Vec<String>, label: &str, text: &str) {
    let text = text.trim().trim_end_matches('.');
    if !text.is_empty() {
        parts.push(format!("{label}: {text}."));
    }
}
