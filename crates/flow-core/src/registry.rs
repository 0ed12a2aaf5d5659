use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::contract::FlowContract;
use crate::errors::FlowError;
use crate::flows::{ChatbotFlow, InsightsFlow, ModerationFlow, RecommendationsFlow, SocialPostFlow};
use crate::invoker::{FlowInvoker, FlowReply};

/// A flow with its input and output types erased to JSON.
#[async_trait]
pub trait DynFlow: Send + Sync {
    fn name(&self) -> &'static str;

    fn output_schema(&self) -> Value;

    async fn invoke(
        &self,
        invoker: &FlowInvoker,
        raw_input: &Value,
    ) -> Result<FlowReply<Value>, FlowError>;
}

struct Erased<C>(C);

#[async_trait]
impl<C: FlowContract> DynFlow for Erased<C> {
    fn name(&self) -> &'static str {
        C::NAME
    }

    fn output_schema(&self) -> Value {
        self.0.output_schema()
    }

    async fn invoke(
        &self,
        invoker: &FlowInvoker,
        raw_input: &Value,
    ) -> Result<FlowReply<Value>, FlowError> {
        let reply = invoker.invoke(&self.0, raw_input).await?;
        let degraded = reply.degraded;
        let output =
            serde_json::to_value(reply.output).map_err(|err| FlowError::Encode(err.to_string()))?;
        Ok(FlowReply { output, degraded })
    }
}

/// Capability key to flow lookup. Read-only once the server starts.
#[derive(Clone, Default)]
pub struct FlowRegistry {
    flows: BTreeMap<&'static str, Arc<dyn DynFlow>>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(RecommendationsFlow);
        registry.register(ChatbotFlow);
        registry.register(ModerationFlow);
        registry.register(SocialPostFlow);
        registry.register(InsightsFlow);
        registry
    }

    pub fn register<C: FlowContract>(&mut self, contract: C) {
        self.flows.insert(C::NAME, Arc::new(Erased(contract)));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DynFlow>> {
        self.flows.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.flows.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.flows.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub async fn invoke(
        &self,
        invoker: &FlowInvoker,
        name: &str,
        raw_input: &Value,
    ) -> Result<FlowReply<Value>, FlowError> {
        let flow = self
            .get(name)
            .ok_or_else(|| FlowError::UnknownFlow(name.to_string()))?;
        flow.invoke(invoker, raw_input).await
    }
}
