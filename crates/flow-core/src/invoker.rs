use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::contract::FlowContract;
use crate::errors::{FlowError, ProviderError};
use crate::provider::{GenerationProvider, GenerationRequest};
use crate::validate::{validate_value, Issues, Validation};

/// Flow result plus whether the fallback stood in for a generated answer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlowReply<T> {
    pub output: T,
    pub degraded: bool,
}

impl<T> FlowReply<T> {
    pub fn generated(output: T) -> Self {
        Self {
            output,
            degraded: false,
        }
    }

    pub fn fallback(output: T) -> Self {
        Self {
            output,
            degraded: true,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FlowReply<U> {
        FlowReply {
            output: f(self.output),
            degraded: self.degraded,
        }
    }
}

/// Resolves a generation result at the flow boundary.
pub trait OrFallback<T> {
    fn or_fallback(self, flow: &str, fallback: impl FnOnce() -> T) -> FlowReply<T>;
}

impl<T> OrFallback<T> for Result<T, ProviderError> {
    fn or_fallback(self, flow: &str, fallback: impl FnOnce() -> T) -> FlowReply<T> {
        match self {
            Ok(output) => FlowReply::generated(output),
            Err(err) => {
                warn!(flow, kind = err.kind(), error = %err, "generation failed; serving fallback");
                FlowReply::fallback(fallback())
            }
        }
    }
}

/// Runs flows against one generation provider.
#[derive(Clone)]
pub struct FlowInvoker {
    provider: Arc<dyn GenerationProvider>,
}

impl FlowInvoker {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Validates `raw_input`, generates once, and validates the answer.
    ///
    /// Only invalid input is an error. Any generation failure, including an
    /// answer that does not satisfy the output contract, yields the fallback.
    pub async fn invoke<C: FlowContract>(
        &self,
        contract: &C,
        raw_input: &Value,
    ) -> Result<FlowReply<C::Output>, FlowError> {
        let input = match validate_value::<C::Input>(raw_input) {
            Validation::Valid(input) => input,
            Validation::Invalid(issues) => {
                debug!(flow = C::NAME, issues = issues.len(), "flow input rejected");
                return Err(FlowError::InvalidInput(issues));
            }
        };

        let output = self.generate(contract, &input).await;
        Ok(output.or_fallback(C::NAME, || contract.fallback(&input)))
    }

    async fn generate<C: FlowContract>(
        &self,
        contract: &C,
        input: &C::Input,
    ) -> Result<C::Output, ProviderError> {
        let request = GenerationRequest {
            flow: C::NAME,
            prompt: contract.render_prompt(input),
            output_schema: contract.output_schema(),
        };
        let raw = self.provider.generate(&request).await?;
        let output = validate_value::<C::Output>(&raw)
            .into_result()
            .map_err(ProviderError::InvalidOutput)?;

        let mut issues = Issues::new();
        contract.check_output(input, &output, &mut issues);
        if !issues.is_empty() {
            return Err(ProviderError::InvalidOutput(issues.into_vec()));
        }
        Ok(output)
    }
}
