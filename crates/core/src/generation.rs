//! Generation modes, pipeline stages, provider identifiers and job input
//! validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::prompt::MAX_PROMPT_CHARS;

// ---------------------------------------------------------------------------
// Defaults and limits
// ---------------------------------------------------------------------------

/// Suggestions created per job when the caller does not ask for a count.
pub const DEFAULT_SUGGESTION_COUNT: usize = 3;

/// Hard ceiling on suggestions per job.
pub const MAX_SUGGESTION_COUNT: usize = 5;

/// Longest custom prompt accepted at job creation, after trimming. Equal to
/// the provider prompt limit so an accepted prompt is sent unchanged.
pub const MAX_CUSTOM_PROMPT_CHARS: usize = MAX_PROMPT_CHARS;

/// Longest occasion string accepted at job creation.
pub const MAX_OCCASION_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Generation mode
// ---------------------------------------------------------------------------

/// Which sequence of provider stages a job runs for each suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationMode {
    /// Garment composited straight onto the portrait.
    TryonOnly,
    /// Portrait stylized into a scene, then the garment is tried on.
    SimpleScene,
    /// As `SimpleScene`, followed by identity restoration.
    AdvancedScene,
}

impl GenerationMode {
    /// Ordered stages executed for this mode.
    pub fn stages(self) -> &'static [Stage] {
        match self {
            Self::TryonOnly => &[Stage::TryOn],
            Self::SimpleScene => &[Stage::Stylize, Stage::TryOn],
            Self::AdvancedScene => &[Stage::Stylize, Stage::TryOn, Stage::IdentityRestore],
        }
    }

    /// Whether the mode starts with a prompt-driven stylization stage.
    pub fn needs_prompt(self) -> bool {
        self.stages().contains(&Stage::Stylize)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TryonOnly => "tryon-only",
            Self::SimpleScene => "simple-scene",
            Self::AdvancedScene => "advanced-scene",
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// One provider call in a suggestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Stylize,
    TryOn,
    IdentityRestore,
}

impl Stage {
    /// Short token used in artifact names and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stylize => "stylize",
            Self::TryOn => "tryon",
            Self::IdentityRestore => "restore",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Identifier of an image-generation back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderId {
    /// Fast single-pass try-on / stylization service.
    TryonService,
    /// General multimodal generative service.
    Multimodal,
}

impl ProviderId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TryonService => "tryon-service",
            Self::Multimodal => "multimodal",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "tryon-service" => Ok(Self::TryonService),
            "multimodal" => Ok(Self::Multimodal),
            other => Err(CoreError::Validation(format!(
                "Unknown provider '{other}'. Must be one of: tryon-service, multimodal"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Resolve and validate the requested suggestion count.
pub fn resolve_suggestion_count(requested: Option<usize>) -> Result<usize, CoreError> {
    match requested {
        None => Ok(DEFAULT_SUGGESTION_COUNT),
        Some(n) if (1..=MAX_SUGGESTION_COUNT).contains(&n) => Ok(n),
        Some(n) => Err(CoreError::Validation(format!(
            "suggestion_count must be between 1 and {MAX_SUGGESTION_COUNT}, got {n}"
        ))),
    }
}

/// Validate that an image reference is an http(s) or `data:` URL.
pub fn validate_image_ref(field: &str, value: &str) -> Result<(), CoreError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    let supported = value.starts_with("http://")
        || value.starts_with("https://")
        || value.starts_with("data:image/");
    if supported {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "{field} must be an http(s) URL or an image data URL"
        )))
    }
}

/// Validate the occasion text.
pub fn validate_occasion(occasion: &str) -> Result<(), CoreError> {
    let trimmed = occasion.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("occasion must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_OCCASION_CHARS {
        return Err(CoreError::Validation(format!(
            "occasion must be at most {MAX_OCCASION_CHARS} characters"
        )));
    }
    Ok(())
}

/// Validate an optional custom prompt override.
pub fn validate_custom_prompt(prompt: Option<&str>) -> Result<(), CoreError> {
    match prompt {
        Some(p) if p.trim().chars().count() > MAX_CUSTOM_PROMPT_CHARS => Err(CoreError::Validation(
            format!("custom_prompt must be at most {MAX_CUSTOM_PROMPT_CHARS} characters"),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_serialize_kebab_case() {
        assert_eq!(
            serde_json::to_value(GenerationMode::TryonOnly).unwrap(),
            "tryon-only"
        );
        let mode: GenerationMode = serde_json::from_value("advanced-scene".into()).unwrap();
        assert_eq!(mode, GenerationMode::AdvancedScene);
    }

    #[test]
    fn stage_order_per_mode() {
        assert_eq!(GenerationMode::TryonOnly.stages(), &[Stage::TryOn]);
        assert_eq!(
            GenerationMode::SimpleScene.stages(),
            &[Stage::Stylize, Stage::TryOn]
        );
        assert_eq!(
            GenerationMode::AdvancedScene.stages(),
            &[Stage::Stylize, Stage::TryOn, Stage::IdentityRestore]
        );
        assert!(!GenerationMode::TryonOnly.needs_prompt());
        assert!(GenerationMode::SimpleScene.needs_prompt());
    }

    #[test]
    fn provider_id_parses_known_names() {
        assert_eq!(
            "tryon-service".parse::<ProviderId>().unwrap(),
            ProviderId::TryonService
        );
        assert_eq!(" multimodal ".parse::<ProviderId>().unwrap(), ProviderId::Multimodal);
        assert!("vendor-x".parse::<ProviderId>().is_err());
    }

    #[test]
    fn suggestion_count_defaults_and_bounds() {
        assert_eq!(resolve_suggestion_count(None).unwrap(), DEFAULT_SUGGESTION_COUNT);
        assert_eq!(resolve_suggestion_count(Some(1)).unwrap(), 1);
        assert!(resolve_suggestion_count(Some(0)).is_err());
        assert!(resolve_suggestion_count(Some(MAX_SUGGESTION_COUNT + 1)).is_err());
    }

    #[test]
    fn image_refs_accept_urls_and_data_urls() {
        assert!(validate_image_ref("human_image_url", "https://cdn.example.com/a.jpg").is_ok());
        assert!(validate_image_ref("human_image_url", "data:image/png;base64,AAAA").is_ok());
        assert!(validate_image_ref("human_image_url", "  ").is_err());
        assert!(validate_image_ref("human_image_url", "ftp://host/a.jpg").is_err());
    }

    #[test]
    fn occasion_must_be_present() {
        assert!(validate_occasion("wedding guest").is_ok());
        assert!(validate_occasion("   ").is_err());
        assert!(validate_occasion(&"x".repeat(MAX_OCCASION_CHARS + 1)).is_err());
    }

    #[test]
    fn custom_prompt_length_is_capped() {
        assert!(validate_custom_prompt(None).is_ok());
        assert!(validate_custom_prompt(Some("short")).is_ok());
        assert!(validate_custom_prompt(Some(&"p".repeat(MAX_CUSTOM_PROMPT_CHARS + 1))).is_err());
    }

    #[test]
    fn custom_prompt_limit_matches_provider_limit() {
        assert_eq!(MAX_CUSTOM_PROMPT_CHARS, MAX_PROMPT_CHARS);
        let at_limit = format!("  {}  ", "p".repeat(MAX_PROMPT_CHARS));
        assert!(validate_custom_prompt(Some(&at_limit)).is_ok());
        assert!(validate_custom_prompt(Some(&"p".repeat(MAX_PROMPT_CHARS + 1))).is_err());
    }
}
