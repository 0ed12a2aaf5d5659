//! Prompt flows with typed input and output contracts.
//!
//! A flow validates its input, asks a [`GenerationProvider`] for a JSON
//! answer, and validates that answer. Anything that goes wrong after input
//! validation yields the flow's fallback instead of an error.

pub mod contract;
pub mod errors;
pub mod flows;
pub mod invoker;
pub mod openai;
pub mod provider;
pub mod registry;
pub mod utils;
pub mod validate;

pub use contract::{FlowContract, RenderedPrompt};
pub use errors::{FlowError, ProviderError};
pub use invoker::{FlowInvoker, FlowReply, OrFallback};
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use provider::{DisabledProvider, GenerationProvider, GenerationRequest, MockProvider};
pub use registry::{DynFlow, FlowRegistry};
pub use validate::{validate_value, Issues, Validate, Validation, ValidationIssue};
