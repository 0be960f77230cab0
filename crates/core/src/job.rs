//! Job and suggestion records plus the suggestion state machine.
//!
//! Every mutation of a stored job goes through [`Job::apply_suggestion_patch`],
//! [`Job::request_cancel`] or [`Job::fail`]. Those methods enforce the
//! invariants (terminal suggestions are frozen, previews are written once,
//! success carries at least one image) and recompute the aggregate
//! `status`, `ui_ready` and `updated_at` fields.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::generation::{GenerationMode, ProviderId};
use crate::types::{JobId, SuggestionIndex, Timestamp};

/// Error text written to suggestions stopped by a cancellation request.
pub const CANCELLED_MESSAGE: &str = "Generation cancelled";

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Aggregate job status, derived from the suggestions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// No suggestion has been triggered yet.
    Pending,
    /// At least one suggestion has left `pending` and work remains.
    Processing,
    /// Every suggestion is terminal. Says nothing about success.
    Completed,
    /// The job itself could not be prepared (no suggestion text).
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Lifecycle of a single suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    GeneratingImages,
    ProcessingTryon,
    Succeeded,
    Failed,
}

impl SuggestionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether a pipeline run currently owns this suggestion.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::GeneratingImages | Self::ProcessingTryon)
    }

    /// Allowed forward transitions. Staying in place is always allowed for
    /// non-terminal states.
    pub fn can_transition_to(self, next: Self) -> bool {
        use SuggestionStatus::*;
        match (self, next) {
            (a, b) if a == b => !a.is_terminal(),
            (Pending, GeneratingImages | Failed) => true,
            (GeneratingImages, ProcessingTryon | Succeeded | Failed) => true,
            (ProcessingTryon, Succeeded | Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::GeneratingImages => "generating_images",
            Self::ProcessingTryon => "processing_tryon",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Optional description of the person, used to flavour suggestion text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub style_preferences: Vec<String>,
}

/// Immutable snapshot of what the user asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInput {
    pub human_image_url: String,
    pub garment_image_url: String,
    pub mode: GenerationMode,
    pub occasion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_profile: Option<UserProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
}

impl JobInput {
    /// Strip surrounding whitespace from the image references so the
    /// stored values are the ones validation accepted.
    pub fn normalized(mut self) -> Self {
        self.human_image_url = self.human_image_url.trim().to_string();
        self.garment_image_url = self.garment_image_url.trim().to_string();
        self
    }

    /// The custom prompt override, trimmed, if the user supplied a
    /// non-blank one.
    pub fn effective_custom_prompt(&self) -> Option<&str> {
        self.custom_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// Outfit and scene text produced upstream for one suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleSuggestion {
    pub title: String,
    pub outfit_description: String,
    pub scene_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Suggestion
// ---------------------------------------------------------------------------

/// One candidate outfit/scene inside a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub index: SuggestionIndex,
    pub status: SuggestionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleSuggestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_prompt: Option<String>,
    #[serde(default)]
    pub intermediate_image_urls: Vec<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
}

impl Suggestion {
    /// A fresh, untriggered suggestion.
    pub fn pending(index: SuggestionIndex) -> Self {
        Self {
            index,
            status: SuggestionStatus::Pending,
            style: None,
            final_prompt: None,
            intermediate_image_urls: Vec::new(),
            image_urls: Vec::new(),
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Apply a patch, enforcing the suggestion invariants.
    pub fn apply(&mut self, patch: &SuggestionPatch, now: Timestamp) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "Suggestion {} is already {} and cannot change",
                self.index,
                self.status.as_str()
            )));
        }

        let next = patch.status.unwrap_or(self.status);
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "Suggestion {} cannot move from {} to {}",
                self.index,
                self.status.as_str(),
                next.as_str()
            )));
        }

        if patch.style.is_some() && self.status != SuggestionStatus::Pending {
            return Err(CoreError::Conflict(format!(
                "Suggestion {} text can only change while pending",
                self.index
            )));
        }

        if let Some(urls) = &patch.intermediate_image_urls {
            if urls.is_empty() {
                return Err(CoreError::Validation(
                    "intermediate_image_urls must contain at least one image".into(),
                ));
            }
            if !self.intermediate_image_urls.is_empty() {
                return Err(CoreError::Conflict(format!(
                    "Suggestion {} previews were already written",
                    self.index
                )));
            }
        }

        let image_urls = patch.image_urls.as_ref();
        match next {
            SuggestionStatus::Succeeded => {
                if image_urls.map_or(true, Vec::is_empty) {
                    return Err(CoreError::Validation(
                        "A succeeded suggestion needs at least one image".into(),
                    ));
                }
            }
            _ if image_urls.is_some() => {
                return Err(CoreError::Validation(
                    "image_urls may only be written together with succeeded".into(),
                ));
            }
            _ => {}
        }

        match next {
            SuggestionStatus::Failed => {
                if patch.error.as_deref().map_or(true, |e| e.trim().is_empty()) {
                    return Err(CoreError::Validation(
                        "A failed suggestion needs an error message".into(),
                    ));
                }
            }
            _ if patch.error.is_some() => {
                return Err(CoreError::Validation(
                    "error may only be written together with failed".into(),
                ));
            }
            _ => {}
        }

        // All checks passed; mutate.
        if let Some(style) = &patch.style {
            self.style = Some(style.clone());
        }
        if let Some(prompt) = &patch.final_prompt {
            self.final_prompt = Some(prompt.clone());
        }
        if let Some(urls) = &patch.intermediate_image_urls {
            self.intermediate_image_urls = urls.clone();
        }
        if let Some(urls) = image_urls {
            self.image_urls = urls.clone();
        }
        if let Some(error) = &patch.error {
            self.error = Some(error.clone());
        }
        if next == SuggestionStatus::GeneratingImages && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = next;
        Ok(())
    }
}

/// Field-scoped update of one suggestion. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SuggestionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleSuggestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intermediate_image_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SuggestionPatch {
    /// Attach advisor text to a pending suggestion.
    pub fn style(style: StyleSuggestion) -> Self {
        Self {
            style: Some(style),
            ..Default::default()
        }
    }

    /// A pipeline run has started.
    pub fn started() -> Self {
        Self {
            status: Some(SuggestionStatus::GeneratingImages),
            ..Default::default()
        }
    }

    /// Stylization finished; previews are available.
    pub fn previews(final_prompt: String, urls: Vec<String>) -> Self {
        Self {
            status: Some(SuggestionStatus::ProcessingTryon),
            final_prompt: Some(final_prompt),
            intermediate_image_urls: Some(urls),
            ..Default::default()
        }
    }

    pub fn succeeded(urls: Vec<String>) -> Self {
        Self {
            status: Some(SuggestionStatus::Succeeded),
            image_urls: Some(urls),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(SuggestionStatus::Failed),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One end-to-end generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub status: JobStatus,
    pub input: JobInput,
    pub suggestions: Vec<Suggestion>,
    /// At least one suggestion succeeded and none is generating right now.
    /// A display hint only; `status` is the orchestration state.
    pub ui_ready: bool,
    #[serde(default)]
    pub cancel_requested: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Create a job with `suggestion_count` pending suggestions.
    pub fn new(input: JobInput, suggestion_count: usize, now: Timestamp) -> Self {
        Self {
            job_id: JobId::new(),
            status: JobStatus::Pending,
            input,
            suggestions: (0..suggestion_count).map(Suggestion::pending).collect(),
            ui_ready: false,
            cancel_requested: false,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn suggestion(&self, index: SuggestionIndex) -> Result<&Suggestion, CoreError> {
        self.suggestions
            .get(index)
            .ok_or_else(|| CoreError::NotFound {
                entity: "Suggestion",
                id: format!("{}/{index}", self.job_id),
            })
    }

    /// Apply a patch to `suggestions[index]` and refresh the aggregates.
    pub fn apply_suggestion_patch(
        &mut self,
        index: SuggestionIndex,
        patch: &SuggestionPatch,
        now: Timestamp,
    ) -> Result<&Suggestion, CoreError> {
        let job_id = self.job_id;
        let suggestion = self
            .suggestions
            .get_mut(index)
            .ok_or_else(|| CoreError::NotFound {
                entity: "Suggestion",
                id: format!("{job_id}/{index}"),
            })?;
        suggestion.apply(patch, now)?;
        self.refresh(now);
        Ok(&self.suggestions[index])
    }

    /// Flag the job as cancelled. Suggestions nobody has started yet are
    /// closed immediately; in-flight runs stop at their next stage boundary.
    pub fn request_cancel(&mut self, now: Timestamp) -> Result<(), CoreError> {
        if self.status == JobStatus::Completed {
            return Err(CoreError::Conflict(
                "Job has already completed and cannot be cancelled".into(),
            ));
        }
        self.cancel_requested = true;
        let patch = SuggestionPatch::failed(CANCELLED_MESSAGE);
        for suggestion in self
            .suggestions
            .iter_mut()
            .filter(|s| s.status == SuggestionStatus::Pending)
        {
            suggestion.apply(&patch, now)?;
        }
        self.refresh(now);
        Ok(())
    }

    /// Record a job-level failure (suggestion text could not be produced).
    pub fn fail(&mut self, error: impl Into<String>, now: Timestamp) {
        self.error = Some(error.into());
        self.refresh(now);
    }

    /// Recompute `status`, `ui_ready` and `updated_at`.
    pub fn refresh(&mut self, now: Timestamp) {
        self.status = self.derive_status();
        self.ui_ready = self.derive_ui_ready();
        self.updated_at = now;
    }

    fn derive_status(&self) -> JobStatus {
        let all_terminal = !self.suggestions.is_empty()
            && self.suggestions.iter().all(|s| s.status.is_terminal());
        if all_terminal {
            JobStatus::Completed
        } else if self.error.is_some() {
            JobStatus::Failed
        } else if self
            .suggestions
            .iter()
            .any(|s| s.status != SuggestionStatus::Pending)
        {
            JobStatus::Processing
        } else {
            JobStatus::Pending
        }
    }

    fn derive_ui_ready(&self) -> bool {
        let any_succeeded = self
            .suggestions
            .iter()
            .any(|s| s.status == SuggestionStatus::Succeeded);
        let any_generating = self.suggestions.iter().any(|s| s.status.is_in_flight());
        any_succeeded && !any_generating
    }
}
