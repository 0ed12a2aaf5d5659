mod app;
pub mod check;
pub mod commands;
pub mod env;
pub mod policy;
pub mod runtime;
pub mod serve;

pub use app::run;
pub use check::{cmd_check, CheckArgs};
pub use commands::Commands;
pub use env::CliArgs;
pub use policy::{cmd_policy, PolicyArgs};
pub use serve::{cmd_serve, ServeArgs};
