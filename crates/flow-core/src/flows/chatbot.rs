use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::contract::{json_block, FlowContract, RenderedPrompt};
use crate::validate::{Issues, Validate};

pub const MAX_MESSAGE_CHARS: usize = 2000;
pub const MAX_HISTORY_TURNS: usize = 20;
const MAX_SUGGESTED_ACTIONS: usize = 5;

pub const UNAVAILABLE_REPLY: &str =
    "Sorry, the event assistant is unavailable right now. Please try again in a few minutes.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventContext {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub agenda: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatbotInput {
    pub message: String,
    #[serde(default)]
    pub event_context: Option<EventContext>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

impl Validate for ChatbotInput {
    fn validate(&self, issues: &mut Issues) {
        issues.non_empty("message", &self.message);
        issues.max_chars("message", &self.message, MAX_MESSAGE_CHARS);
        issues.max_items("history", &self.history, MAX_HISTORY_TURNS);
        for (idx, turn) in self.history.iter().enumerate() {
            issues.max_chars(&format!("history[{idx}].content"), &turn.content, MAX_MESSAGE_CHARS);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChatbotOutput {
    pub reply: String,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
}

impl Validate for ChatbotOutput {
    fn validate(&self, issues: &mut Issues) {
        issues.non_empty("reply", &self.reply);
        issues.max_chars("reply", &self.reply, 4000);
        issues.max_items("suggested_actions", &self.suggested_actions, MAX_SUGGESTED_ACTIONS);
    }
}

/// Answers attendee questions about an event.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChatbotFlow;

impl FlowContract for ChatbotFlow {
    const NAME: &'static str = "chatbot";

    type Input = ChatbotInput;
    type Output = ChatbotOutput;

    fn render_prompt(&self, input: &Self::Input) -> RenderedPrompt {
        let mut user = String::new();
        if let Some(context) = &input.event_context {
            user.push_str("Event context:\n");
            user.push_str(&json_block(context));
            user.push_str("\n\n");
        }
        if !input.history.is_empty() {
            user.push_str("Conversation so far:\n");
            for turn in &input.history {
                let speaker = match turn.role {
                    ChatRole::User => "Attendee",
                    ChatRole::Assistant => "Assistant",
                };
                user.push_str(&format!("{speaker}: {}\n", turn.content));
            }
            user.push('\n');
        }
        user.push_str(&format!("Attendee: {}", input.message));

        RenderedPrompt {
            system: "You are the event assistant for an event platform. Answer briefly and only \
                     from the event context given. If you do not know, say so. Suggest up to five \
                     short follow-up actions the attendee can take."
                .to_string(),
            user,
        }
    }

    fn fallback(&self, _input: &Self::Input) -> Self::Output {
        ChatbotOutput {
            reply: UNAVAILABLE_REPLY.to_string(),
            suggested_actions: Vec::new(),
        }
    }
}
