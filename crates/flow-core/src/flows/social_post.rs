use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::contract::{FlowContract, RenderedPrompt};
use crate::validate::{Issues, Validate};

const MAX_HASHTAGS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Linkedin,
    Instagram,
    Facebook,
}

impl Platform {
    pub fn max_chars(self) -> usize {
        match self {
            Platform::Twitter => 280,
            Platform::Linkedin => 3000,
            Platform::Instagram => 2200,
            Platform::Facebook => 5000,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Platform::Twitter => "X (Twitter)",
            Platform::Linkedin => "LinkedIn",
            Platform::Instagram => "Instagram",
            Platform::Facebook => "Facebook",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Casual,
    Excited,
}

impl Tone {
    fn label(self) -> &'static str {
        match self {
            Tone::Professional => "professional",
            Tone::Casual => "casual",
            Tone::Excited => "excited",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SocialPostInput {
    pub event_title: String,
    #[serde(default)]
    pub event_description: String,
    #[serde(default)]
    pub event_date: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub platform: Platform,
    #[serde(default)]
    pub tone: Tone,
}

impl Validate for SocialPostInput {
    fn validate(&self, issues: &mut Issues) {
        issues.non_empty("event_title", &self.event_title);
        issues.max_chars("event_title", &self.event_title, 200);
        issues.max_chars("event_description", &self.event_description, 2000);
    }
}

/// An empty post with no hashtags is a valid answer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SocialPostOutput {
    pub post: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

impl Validate for SocialPostOutput {
    // Per-platform limits are enforced by `SocialPostFlow::check_output`.
    fn validate(&self, issues: &mut Issues) {
        issues.max_chars("post", &self.post, Platform::Facebook.max_chars());
        issues.max_items("hashtags", &self.hashtags, MAX_HASHTAGS);
        for (idx, tag) in self.hashtags.iter().enumerate() {
            if tag.chars().any(char::is_whitespace) {
                issues.push(&format!("hashtags[{idx}]"), "must not contain whitespace");
            }
        }
    }
}

/// Drafts a promotional post for an event.
#[derive(Clone, Copy, Debug, Default)]
pub struct SocialPostFlow;

impl FlowContract for SocialPostFlow {
    const NAME: &'static str = "social_post";

    type Input = SocialPostInput;
    type Output = SocialPostOutput;

    fn render_prompt(&self, input: &Self::Input) -> RenderedPrompt {
        let mut details = format!("Title: {}\n", input.event_title);
        if !input.event_description.trim().is_empty() {
            details.push_str(&format!("Description: {}\n", input.event_description));
        }
        if let Some(date) = &input.event_date {
            details.push_str(&format!("Date: {date}\n"));
        }
        if let Some(location) = &input.location {
            details.push_str(&format!("Location: {location}\n"));
        }

        RenderedPrompt {
            system: format!(
                "You write social media posts promoting events. Write for {} in a {} tone, \
                 at most {} characters, and suggest up to {} hashtags without spaces.",
                input.platform.label(),
                input.tone.label(),
                input.platform.max_chars(),
                MAX_HASHTAGS
            ),
            user: details,
        }
    }

    fn fallback(&self, _input: &Self::Input) -> Self::Output {
        SocialPostOutput::default()
    }

    fn check_output(&self, input: &Self::Input, output: &Self::Output, issues: &mut Issues) {
        issues.max_chars("post", &output.post, input.platform.max_chars());
    }
}
