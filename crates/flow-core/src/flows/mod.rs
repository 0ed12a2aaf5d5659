//! Built-in capabilities served by the gateway.

mod chatbot;
mod insights;
mod moderation;
mod recommendations;
mod social_post;

pub use chatbot::{
    ChatRole, ChatTurn, ChatbotFlow, ChatbotInput, ChatbotOutput, EventContext, UNAVAILABLE_REPLY,
};
pub use insights::{InsightsFlow, InsightsInput, InsightsOutput};
pub use moderation::{ContentKind, ModerationFlow, ModerationInput, ModerationOutput, Verdict};
pub use recommendations::{
    CandidateEvent, Recommendation, RecommendationsFlow, RecommendationsInput,
    RecommendationsOutput,
};
pub use social_post::{Platform, SocialPostFlow, SocialPostInput, SocialPostOutput, Tone};
