use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::contract::{FlowContract, RenderedPrompt};
use crate::validate::{Issues, Validate};

pub const MAX_CONTENT_CHARS: usize = 5000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    EventDescription,
    #[default]
    Comment,
    Review,
    ChatMessage,
    Profile,
}

impl ContentKind {
    fn label(self) -> &'static str {
        match self {
            ContentKind::EventDescription => "event description",
            ContentKind::Comment => "comment",
            ContentKind::Review => "review",
            ContentKind::ChatMessage => "chat message",
            ContentKind::Profile => "profile",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ModerationInput {
    pub content: String,
    #[serde(default)]
    pub content_kind: ContentKind,
}

impl Validate for ModerationInput {
    fn validate(&self, issues: &mut Issues) {
        issues.non_empty("content", &self.content);
        issues.max_chars("content", &self.content, MAX_CONTENT_CHARS);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allow,
    Review,
    Block,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModerationOutput {
    pub verdict: Verdict,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub rationale: String,
}

impl Validate for ModerationOutput {
    fn validate(&self, issues: &mut Issues) {
        issues.max_items("categories", &self.categories, 10);
        issues.max_chars("rationale", &self.rationale, 1000);
    }
}

/// Screens user-generated content before it is published.
#[derive(Clone, Copy, Debug, Default)]
pub struct ModerationFlow;

impl FlowContract for ModerationFlow {
    const NAME: &'static str = "moderation";

    type Input = ModerationInput;
    type Output = ModerationOutput;

    fn render_prompt(&self, input: &Self::Input) -> RenderedPrompt {
        RenderedPrompt {
            system: "You moderate user content on an event platform. Return verdict `allow` for \
                     acceptable content, `review` when a human should look, and `block` for \
                     harassment, hate, spam, scams or explicit content. List the matched \
                     categories and a short rationale."
                .to_string(),
            user: format!(
                "Content type: {}\nContent:\n\"\"\"\n{}\n\"\"\"",
                input.content_kind.label(),
                input.content
            ),
        }
    }

    // Unscreened content goes to a human.
    fn fallback(&self, _input: &Self::Input) -> Self::Output {
        ModerationOutput {
            verdict: Verdict::Review,
            categories: Vec::new(),
            rationale: "Automated moderation unavailable; queued for manual review.".to_string(),
        }
    }
}
