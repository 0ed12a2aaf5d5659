//! Admission control for AI capabilities.
//!
//! A request is admitted only when the caller is authenticated, the feature
//! flag is on, the caller's plan includes the capability, and the caller's
//! per-capability window still has room.

pub mod gate;
pub mod identity;
pub mod rate_limit;

pub use gate::{Admission, AdmissionEvent, AdmissionGate, RejectReason};
pub use identity::{
    AcceptAnyToken, IdentityProvider, RequestContext, SessionIdentityProvider,
    StaticTokenVerifier, TokenVerifier,
};
pub use rate_limit::{RateLimitUsage, RateLimiter};
