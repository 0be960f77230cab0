//! Suggestion text.
//!
//! Before any image is generated each suggestion needs an outfit and scene
//! description. [`StyleAdvisor`] is that collaborator; [`TemplateAdvisor`]
//! is a deterministic implementation driven by the occasion.

use async_trait::async_trait;
use drape_core::job::{JobInput, StyleSuggestion};

#[derive(Debug, thiserror::Error)]
pub enum AdvisorError {
    #[error("Style advisor unavailable: {0}")]
    Unavailable(String),

    #[error("Style advisor returned no suggestions")]
    Empty,
}

#[async_trait]
pub trait StyleAdvisor: Send + Sync {
    /// Produce up to `count` suggestions for the job input, in display order.
    async fn suggest(
        &self,
        input: &JobInput,
        count: usize,
    ) -> Result<Vec<StyleSuggestion>, AdvisorError>;
}

/// (title, outfit, scene)
type Template = (&'static str, &'static str, &'static str);

const WORK: &[Template] = &[
    ("Boardroom ready", "Tailored blazer over a crisp shirt with slim trousers", "Bright modern office with floor-to-ceiling windows"),
    ("Creative studio", "Relaxed knit layered over straight-leg chinos", "Sunlit design studio with concrete walls and plants"),
    ("Client lunch", "Soft-shouldered jacket with a fine-gauge top", "Upscale bistro at midday, white tablecloths"),
];

const EVENING: &[Template] = &[
    ("Rooftop evening", "Sleek dark layers with polished accessories", "City rooftop bar at dusk with warm string lights"),
    ("Gallery opening", "Monochrome outfit with one statement piece", "Minimal white art gallery under spotlights"),
    ("Late dinner", "Elevated separates in deep jewel tones", "Candle-lit restaurant with velvet booths"),
];

const CELEBRATION: &[Template] = &[
    ("Garden ceremony", "Light, flowing formalwear in soft pastels", "Rose garden with an arch of white flowers"),
    ("Ballroom", "Structured formalwear with refined detailing", "Grand ballroom with crystal chandeliers"),
    ("Golden hour toast", "Polished outfit in warm neutrals", "Vineyard terrace at sunset"),
];

const LEISURE: &[Template] = &[
    ("Seaside stroll", "Breezy linen pieces in sandy tones", "Sunny boardwalk by the sea"),
    ("Weekend market", "Easy casual layers with clean sneakers", "Busy open-air market with colourful stalls"),
    ("Park afternoon", "Relaxed everyday outfit with a light jacket", "Leafy city park in soft afternoon light"),
];

fn templates_for(occasion: &str) -> &'static [Template] {
    let occasion = occasion.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| occasion.contains(w));
    if has(&["work", "office", "interview", "meeting", "business"]) {
        WORK
    } else if has(&["wedding", "gala", "ceremony", "graduation", "formal"]) {
        CELEBRATION
    } else if has(&["party", "dinner", "date", "night", "club", "concert"]) {
        EVENING
    } else {
        LEISURE
    }
}

/// Deterministic occasion-driven suggestions.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateAdvisor;

#[async_trait]
impl StyleAdvisor for TemplateAdvisor {
    async fn suggest(
        &self,
        input: &JobInput,
        count: usize,
    ) -> Result<Vec<StyleSuggestion>, AdvisorError> {
        let templates = templates_for(&input.occasion);
        let preferences = input
            .user_profile
            .as_ref()
            .map(|p| p.style_preferences.join(", "))
            .filter(|p| !p.is_empty());

        let suggestions = (0..count)
            .map(|i| {
                let (title, outfit, scene) = templates[i % templates.len()];
                let outfit_description = match &preferences {
                    Some(prefs) => format!("{outfit}, leaning {prefs}"),
                    None => outfit.to_string(),
                };
                StyleSuggestion {
                    title: title.to_string(),
                    outfit_description,
                    scene_prompt: scene.to_string(),
                    notes: Some(format!("Styled for {}", input.occasion.trim())),
                }
            })
            .collect();
        Ok(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use drape_core::generation::GenerationMode;
    use drape_core::job::UserProfile;

    use super::*;

    fn input(occasion: &str) -> JobInput {
        JobInput {
            human_image_url: "https://img.test/me.jpg".into(),
            garment_image_url: "https://img.test/top.jpg".into(),
            mode: GenerationMode::SimpleScene,
            occasion: occasion.into(),
            user_profile: None,
            custom_prompt: None,
            provider: None,
        }
    }

    #[tokio::test]
    async fn produces_requested_count_deterministically() {
        let a = TemplateAdvisor.suggest(&input("Job interview"), 5).await.unwrap();
        let b = TemplateAdvisor.suggest(&input("Job interview"), 5).await.unwrap();
        assert_eq!(a.len(), 5);
        assert_eq!(a, b);
        assert_eq!(a[0].title, "Boardroom ready");
        assert_eq!(a[3].title, a[0].title);
    }

    #[tokio::test]
    async fn occasion_selects_scene_family() {
        let wedding = TemplateAdvisor.suggest(&input("Beach wedding"), 1).await.unwrap();
        assert_eq!(wedding[0].title, "Garden ceremony");
        let other = TemplateAdvisor.suggest(&input("Sunday errands"), 1).await.unwrap();
        assert_eq!(other[0].title, "Seaside stroll");
    }

    #[tokio::test]
    async fn style_preferences_flavour_the_outfit() {
        let mut job_input = input("date night");
        job_input.user_profile = Some(UserProfile {
            style_preferences: vec!["minimalist".into(), "earth tones".into()],
            ..Default::default()
        });
        let s = TemplateAdvisor.suggest(&job_input, 1).await.unwrap();
        assert!(s[0].outfit_description.ends_with("leaning minimalist, earth tones"));
    }
}
