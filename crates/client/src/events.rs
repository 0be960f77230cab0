//! Per-suggestion lifecycle events derived from consecutive snapshots.

use drape_core::job::{Job, Suggestion, SuggestionStatus};
use drape_core::types::SuggestionIndex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionEvent {
    /// Outfit and scene text is available.
    TextReady { index: SuggestionIndex },
    /// Stylized previews were written.
    PreviewReady {
        index: SuggestionIndex,
        image_urls: Vec<String>,
    },
    /// The suggestion succeeded with its final images.
    FinalReady {
        index: SuggestionIndex,
        image_urls: Vec<String>,
    },
    Failed {
        index: SuggestionIndex,
        error: String,
    },
}

impl SuggestionEvent {
    pub fn index(&self) -> SuggestionIndex {
        match self {
            Self::TextReady { index }
            | Self::PreviewReady { index, .. }
            | Self::FinalReady { index, .. }
            | Self::Failed { index, .. } => *index,
        }
    }
}

/// Events raised by moving from `previous` to `current`.
///
/// With no previous snapshot every fact in `current` is new. Suggestions may
/// finish in any order; events are emitted in index order, and within one
/// suggestion as text, preview, then final or failed.
pub fn diff_suggestions(previous: Option<&Job>, current: &Job) -> Vec<SuggestionEvent> {
    let mut events = Vec::new();
    for now in &current.suggestions {
        let before = previous.and_then(|job| job.suggestions.get(now.index));
        diff_one(before, now, &mut events);
    }
    events
}

fn diff_one(before: Option<&Suggestion>, now: &Suggestion, events: &mut Vec<SuggestionEvent>) {
    let index = now.index;

    if now.style.is_some() && before.map_or(true, |b| b.style.is_none()) {
        events.push(SuggestionEvent::TextReady { index });
    }

    if !now.intermediate_image_urls.is_empty()
        && before.map_or(true, |b| b.intermediate_image_urls.is_empty())
    {
        events.push(SuggestionEvent::PreviewReady {
            index,
            image_urls: now.intermediate_image_urls.clone(),
        });
    }

    let newly = |status: SuggestionStatus| {
        now.status == status && before.map_or(true, |b| b.status != status)
    };
    if newly(SuggestionStatus::Succeeded) {
        events.push(SuggestionEvent::FinalReady {
            index,
            image_urls: now.image_urls.clone(),
        });
    } else if newly(SuggestionStatus::Failed) {
        events.push(SuggestionEvent::Failed {
            index,
            error: now.error.clone().unwrap_or_default(),
        });
    }
}
