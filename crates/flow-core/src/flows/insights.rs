use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::contract::{json_block, FlowContract, RenderedPrompt};
use crate::validate::{Issues, Validate};

const MAX_METRICS: usize = 50;
const MAX_POINTS: usize = 10;

#[derive(Clone, Debug, Deserialize)]
pub struct InsightsInput {
    pub event_name: String,
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub period: Option<String>,
}

impl Validate for InsightsInput {
    fn validate(&self, issues: &mut Issues) {
        issues.non_empty("event_name", &self.event_name);
        if self.metrics.is_empty() {
            issues.push("metrics", "must contain at least one metric");
        }
        if self.metrics.len() > MAX_METRICS {
            issues.push(
                "metrics",
                format!("must contain at most {MAX_METRICS} metrics (got {})", self.metrics.len()),
            );
        }
        for (name, value) in &self.metrics {
            if !value.is_finite() {
                issues.push(&format!("metrics.{name}"), "must be a finite number");
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InsightsOutput {
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl Validate for InsightsOutput {
    fn validate(&self, issues: &mut Issues) {
        issues.max_chars("summary", &self.summary, 2000);
        issues.max_items("highlights", &self.highlights, MAX_POINTS);
        issues.max_items("recommendations", &self.recommendations, MAX_POINTS);
    }
}

/// Summarizes organizer analytics in plain language.
#[derive(Clone, Copy, Debug, Default)]
pub struct InsightsFlow;

impl FlowContract for InsightsFlow {
    const NAME: &'static str = "insights";

    type Input = InsightsInput;
    type Output = InsightsOutput;

    fn render_prompt(&self, input: &Self::Input) -> RenderedPrompt {
        let period = input.period.as_deref().unwrap_or("the event so far");
        RenderedPrompt {
            system: "You are an analyst for event organizers. Summarize the metrics in two or \
                     three sentences, list notable highlights, and give concrete recommendations \
                     to improve attendance and engagement. Do not invent numbers."
                .to_string(),
            user: format!(
                "Event: {}\nPeriod: {period}\nMetrics:\n{}",
                input.event_name,
                json_block(&input.metrics)
            ),
        }
    }

    fn fallback(&self, _input: &Self::Input) -> Self::Output {
        InsightsOutput::default()
    }
}
