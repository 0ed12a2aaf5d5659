pub mod defaults;
pub mod errors;
pub mod loader;
pub mod model;
pub mod overlay;

pub use defaults::default_snapshot;
pub use errors::PolicyError;
pub use loader::{load_snapshot, load_snapshot_with_options, LoadOptions};
pub use model::{PolicySnapshot, PolicySource, RateLimitPolicy, RateLimitRule};
pub use overlay::{apply_override_to_snapshot, apply_policy_value, PolicyPath};

#[cfg(test)]
mod tests;
