use clap::Subcommand;

use super::check::CheckArgs;
use super::policy::PolicyArgs;
use super::serve::ServeArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the AI gateway HTTP server
    Serve(ServeArgs),

    /// Inspect the effective admission policy
    Policy(PolicyArgs),

    /// Dry-run admission for a user and capability against the effective policy
    Check(CheckArgs),
}
