use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::contract::{json_block, FlowContract, RenderedPrompt};
use crate::validate::{Issues, Validate};

pub const MAX_CANDIDATES: usize = 50;
pub const MAX_LIMIT: u32 = 10;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CandidateEvent {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RecommendationsInput {
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub attended_events: Vec<String>,
    pub candidate_events: Vec<CandidateEvent>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    5
}

impl Validate for RecommendationsInput {
    fn validate(&self, issues: &mut Issues) {
        issues.max_items("interests", &self.interests, 25);
        issues.max_items("attended_events", &self.attended_events, 100);
        issues.max_items("candidate_events", &self.candidate_events, MAX_CANDIDATES);
        issues.range("limit", self.limit, 1, MAX_LIMIT);
        for (idx, event) in self.candidate_events.iter().enumerate() {
            issues.non_empty(&format!("candidate_events[{idx}].id"), &event.id);
            issues.non_empty(&format!("candidate_events[{idx}].title"), &event.title);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Recommendation {
    pub event_id: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecommendationsOutput {
    pub recommendations: Vec<Recommendation>,
}

impl Validate for RecommendationsOutput {
    fn validate(&self, issues: &mut Issues) {
        issues.max_items("recommendations", &self.recommendations, MAX_LIMIT as usize);
        for (idx, item) in self.recommendations.iter().enumerate() {
            issues.non_empty(&format!("recommendations[{idx}].event_id"), &item.event_id);
            issues.non_empty(&format!("recommendations[{idx}].reason"), &item.reason);
        }
    }
}

/// Ranks upcoming events for an attendee.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecommendationsFlow;

impl FlowContract for RecommendationsFlow {
    const NAME: &'static str = "recommendations";

    type Input = RecommendationsInput;
    type Output = RecommendationsOutput;

    fn render_prompt(&self, input: &Self::Input) -> RenderedPrompt {
        RenderedPrompt {
            system: "You recommend events to attendees of an event platform. Only recommend \
                     events from the candidate list, ranked best first, each with a one sentence \
                     reason tied to the attendee's interests or history."
                .to_string(),
            user: format!(
                "Interests: {}\nPreviously attended: {}\nReturn at most {} recommendations.\n\
                 Candidate events:\n{}",
                join_or_none(&input.interests),
                join_or_none(&input.attended_events),
                input.limit,
                json_block(&input.candidate_events)
            ),
        }
    }

    fn fallback(&self, _input: &Self::Input) -> Self::Output {
        RecommendationsOutput::default()
    }

    fn check_output(&self, input: &Self::Input, output: &Self::Output, issues: &mut Issues) {
        issues.max_items("recommendations", &output.recommendations, input.limit as usize);
        let mut seen = HashSet::new();
        for (idx, item) in output.recommendations.iter().enumerate() {
            let field = format!("recommendations[{idx}].event_id");
            if !input.candidate_events.iter().any(|event| event.id == item.event_id) {
                issues.push(&field, "must name one of the candidate events");
            } else if !seen.insert(item.event_id.as_str()) {
                issues.push(&field, "must not repeat an event");
            }
        }
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}
