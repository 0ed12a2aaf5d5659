use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::validate::{Issues, Validate};

/// System and user text sent to the generation provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

/// Typed request/response contract for a single capability.
pub trait FlowContract: Send + Sync + 'static {
    /// Capability key, also the HTTP path segment.
    const NAME: &'static str;

    type Input: DeserializeOwned + Validate + Send + Sync;
    type Output: Serialize + DeserializeOwned + JsonSchema + Validate + Send + Sync;

    fn render_prompt(&self, input: &Self::Input) -> RenderedPrompt;

    /// Well-formed answer used whenever generation fails.
    fn fallback(&self, input: &Self::Input) -> Self::Output;

    /// Output rules that depend on the request, run after the output's own `Validate` rules.
    fn check_output(&self, _input: &Self::Input, _output: &Self::Output, _issues: &mut Issues) {}

    fn output_schema(&self) -> Value {
        serde_json::to_value(schema_for!(Self::Output)).unwrap_or(Value::Null)
    }
}

pub(crate) fn json_block<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}
