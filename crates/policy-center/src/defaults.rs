use std::collections::BTreeMap;

use eventra_core_types::PlanTier;

use crate::model::{PolicySnapshot, RateLimitPolicy, RateLimitRule};

pub const RECOMMENDATIONS: &str = "recommendations";
pub const CHATBOT: &str = "chatbot";
pub const MODERATION: &str = "moderation";
pub const SOCIAL_POST: &str = "social_post";
pub const INSIGHTS: &str = "insights";

pub fn default_snapshot() -> PolicySnapshot {
    let features = [RECOMMENDATIONS, CHATBOT, MODERATION, SOCIAL_POST, INSIGHTS]
        .into_iter()
        .map(|name| (name.to_string(), true))
        .collect();

    let mut plans = BTreeMap::new();
    plans.insert(
        PlanTier::Free,
        entitlements(&[
            (RECOMMENDATIONS, false),
            (CHATBOT, true),
            (MODERATION, true),
            (SOCIAL_POST, false),
            (INSIGHTS, false),
        ]),
    );
    plans.insert(
        PlanTier::Pro,
        entitlements(&[
            (RECOMMENDATIONS, true),
            (CHATBOT, true),
            (MODERATION, true),
            (SOCIAL_POST, true),
            (INSIGHTS, false),
        ]),
    );
    plans.insert(
        PlanTier::Enterprise,
        entitlements(&[
            (RECOMMENDATIONS, true),
            (CHATBOT, true),
            (MODERATION, true),
            (SOCIAL_POST, true),
            (INSIGHTS, true),
        ]),
    );

    let mut classes = BTreeMap::new();
    classes.insert("generation".to_string(), RateLimitRule::new(10, 60_000));
    classes.insert("interactive".to_string(), RateLimitRule::new(30, 60_000));
    classes.insert("read".to_string(), RateLimitRule::new(60, 60_000));

    let capabilities = [
        (RECOMMENDATIONS, "generation"),
        (SOCIAL_POST, "generation"),
        (INSIGHTS, "generation"),
        (CHATBOT, "interactive"),
        (MODERATION, "read"),
    ]
    .into_iter()
    .map(|(capability, class)| (capability.to_string(), class.to_string()))
    .collect();

    PolicySnapshot {
        rev: 1,
        features,
        plans,
        rate_limits: RateLimitPolicy {
            default_class: "interactive".to_string(),
            classes,
            capabilities,
        },
        provenance: Default::default(),
    }
}

fn entitlements(entries: &[(&str, bool)]) -> BTreeMap<String, bool> {
    entries
        .iter()
        .map(|(capability, allowed)| (capability.to_string(), *allowed))
        .collect()
}
