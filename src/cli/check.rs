use std::sync::Arc;

use admission_gate::{Admission, AdmissionGate, RateLimiter};
use anyhow::Result;
use clap::Args;
use eventra_core_types::{Identity, PlanTier, Role};
use eventra_policy_center::PolicySnapshot;
use serde::Serialize;

#[derive(Args, Clone, Debug)]
pub struct CheckArgs {
    /// Capability to check, e.g. chatbot
    pub capability: String,

    /// User identifier used for the rate-limit key
    #[arg(long, default_value = "cli-user")]
    pub user_id: String,

    /// Plan tier of the simulated caller
    #[arg(long, default_value = "free")]
    pub plan: PlanTier,

    /// Role of the simulated caller
    #[arg(long, default_value = "attendee")]
    pub role: Role,

    /// Simulate this many back-to-back requests within one window
    #[arg(long, default_value_t = 1)]
    pub requests: u32,

    /// Output JSON instead of human summary
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    capability: String,
    identity: Identity,
    enabled: bool,
    entitled_plans: Vec<PlanTier>,
    rate_limit_class: String,
    limit: u32,
    window_ms: u64,
    admitted: u32,
    outcomes: Vec<&'static str>,
}

/// Runs admission against a private limiter; nothing is shared with a running gateway.
pub fn cmd_check(args: CheckArgs, policy: PolicySnapshot) -> Result<()> {
    let report = evaluate(&args, policy);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Identity   → {}", report.identity);
    println!(
        "Capability → {} (enabled={}, plans=[{}])",
        report.capability,
        report.enabled,
        report
            .entitled_plans
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    );
    if report.limit == 0 {
        println!("Rate Limit → class={} unlimited", report.rate_limit_class);
    } else {
        println!(
            "Rate Limit → class={} {}/{}ms",
            report.rate_limit_class, report.limit, report.window_ms
        );
    }
    for (idx, outcome) in report.outcomes.iter().enumerate() {
        println!("  #{:<3} {}", idx + 1, outcome);
    }
    println!("Admitted {}/{}", report.admitted, report.outcomes.len());
    Ok(())
}

fn evaluate(args: &CheckArgs, policy: PolicySnapshot) -> CheckReport {
    let capability = args.capability.trim().to_string();
    let identity = Identity::new(args.user_id.clone(), args.role, args.plan);
    let gate = AdmissionGate::new(Arc::new(policy), Arc::new(RateLimiter::new()));

    let outcomes: Vec<Admission> = (0..args.requests.max(1))
        .map(|_| gate.check_admission(Some(&identity), &capability))
        .collect();

    let policy = gate.policy();
    let rule = policy.rate_limit_for(&capability);
    CheckReport {
        enabled: policy.feature_enabled(&capability),
        entitled_plans: policy.entitled_plans(&capability),
        rate_limit_class: policy.rate_limit_class(&capability).to_string(),
        limit: rule.limit,
        window_ms: rule.window_ms,
        admitted: outcomes.iter().filter(|a| a.is_admitted()).count() as u32,
        outcomes: outcomes.iter().map(Admission::outcome).collect(),
        capability,
        identity,
    }
}
