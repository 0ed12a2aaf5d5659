use std::collections::BTreeMap;

use anyhow::Result;
use clap::{Args, Subcommand};
use eventra_policy_center::{PolicySnapshot, PolicySource};
use serde_json::json;

#[derive(Args, Clone, Debug)]
pub struct PolicyArgs {
    #[command(subcommand)]
    pub command: PolicyCommand,
}

#[derive(Subcommand, Clone, Debug)]
pub enum PolicyCommand {
    /// Print the effective policy after files and environment overrides
    Show(PolicyShowArgs),
}

#[derive(Args, Clone, Debug)]
pub struct PolicyShowArgs {
    /// Output JSON instead of human summary
    #[arg(long)]
    pub json: bool,
}

pub fn cmd_policy(args: PolicyArgs, policy: &PolicySnapshot) -> Result<()> {
    match args.command {
        PolicyCommand::Show(show_args) => {
            if show_args.json {
                let payload = json!({
                    "policy": policy,
                    "capabilities": capability_rows(policy),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                print!("{}", render_summary(policy));
            }
        }
    }
    Ok(())
}

fn capability_rows(policy: &PolicySnapshot) -> Vec<serde_json::Value> {
    policy
        .known_capabilities()
        .into_iter()
        .map(|capability| {
            let rule = policy.rate_limit_for(&capability);
            json!({
                "capability": capability,
                "enabled": policy.feature_enabled(&capability),
                "plans": policy.entitled_plans(&capability),
                "rate_limit_class": policy.rate_limit_class(&capability),
                "limit": rule.limit,
                "window_ms": rule.window_ms,
            })
        })
        .collect()
}

fn render_summary(policy: &PolicySnapshot) -> String {
    let mut out = String::new();
    out.push_str(&format!("Policy Revision: {}\n\n", policy.rev));

    for capability in policy.known_capabilities() {
        let rule = policy.rate_limit_for(&capability);
        let plans = policy
            .entitled_plans(&capability)
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let limit = if rule.is_unlimited() {
            "unlimited".to_string()
        } else {
            format!("{}/{}ms", rule.limit, rule.window_ms)
        };
        out.push_str(&format!(
            "{:<16} enabled={:<5} plans=[{}] class={} limit={}\n",
            capability,
            policy.feature_enabled(&capability),
            plans,
            policy.rate_limit_class(&capability),
            limit
        ));
    }

    out.push('\n');
    out.push_str(&format!(
        "Rate Limit Classes (default={}) → {}\n",
        policy.rate_limits.default_class,
        policy
            .rate_limits
            .classes
            .iter()
            .map(|(name, rule)| format!("{}={}/{}ms", name, rule.limit, rule.window_ms))
            .collect::<Vec<_>>()
            .join(" ")
    ));

    let mut sources: BTreeMap<&'static str, usize> = BTreeMap::new();
    for entry in policy.provenance.values() {
        *sources.entry(source_label(entry.source)).or_default() += 1;
    }
    out.push_str(&format!(
        "Provenance → {}\n",
        sources
            .iter()
            .map(|(source, count)| format!("{}={}", source, count))
            .collect::<Vec<_>>()
            .join(" ")
    ));
    out
}

fn source_label(source: PolicySource) -> &'static str {
    match source {
        PolicySource::Builtin => "builtin",
        PolicySource::File => "file",
        PolicySource::Env => "env",
        PolicySource::Cli => "cli",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventra_policy_center::default_snapshot;

    #[test]
    fn summary_lists_every_capability() {
        let policy = default_snapshot();
        let summary = render_summary(&policy);
        for capability in policy.known_capabilities() {
            assert!(summary.contains(&capability), "missing {capability}");
        }
        assert!(summary.contains("Rate Limit Classes (default=interactive)"));
    }

    #[test]
    fn capability_rows_report_entitled_plans() {
        let policy = default_snapshot();
        let rows = capability_rows(&policy);
        let insights = rows
            .iter()
            .find(|row| row["capability"] == "insights")
            .expect("insights row");
        let plans = insights["plans"].as_array().unwrap();
        assert!(!plans.iter().any(|plan| plan == "free"));
        assert!(!plans.iter().any(|plan| plan == "pro"));
    }
}
