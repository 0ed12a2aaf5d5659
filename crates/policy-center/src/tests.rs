use crate::defaults::{default_snapshot, CHATBOT, INSIGHTS, RECOMMENDATIONS};
use crate::errors::PolicyError;
use crate::loader::{load_snapshot, load_snapshot_with_options, LoadOptions};
use crate::model::{PolicySource, RateLimitRule, FALLBACK_RATE_LIMIT};
use crate::overlay::{apply_override_to_snapshot, PolicyPath};
use eventra_core_types::PlanTier;
use std::env;
use std::sync::{Mutex, OnceLock};

#[test]
fn default_snapshot_gates_recommendations_behind_pro() {
    let snapshot = default_snapshot();
    assert!(snapshot.feature_enabled(RECOMMENDATIONS));
    assert!(!snapshot.plan_allows(PlanTier::Free, RECOMMENDATIONS));
    assert!(snapshot.plan_allows(PlanTier::Pro, RECOMMENDATIONS));
    assert_eq!(
        snapshot.entitled_plans(INSIGHTS),
        vec![PlanTier::Enterprise]
    );
}

#[test]
fn unknown_capability_is_denied_and_uses_default_class() {
    let snapshot = default_snapshot();
    assert!(!snapshot.feature_enabled("ticket_pricing"));
    assert!(!snapshot.plan_allows(PlanTier::Enterprise, "ticket_pricing"));
    assert_eq!(snapshot.rate_limit_class("ticket_pricing"), "interactive");
    assert_eq!(
        snapshot.rate_limit_for("ticket_pricing"),
        RateLimitRule::new(30, 60_000)
    );
}

#[test]
fn missing_default_class_falls_back_to_builtin_rule() {
    let mut snapshot = default_snapshot();
    snapshot.rate_limits.classes.clear();
    assert_eq!(snapshot.rate_limit_for(CHATBOT), FALLBACK_RATE_LIMIT);
}

#[test]
fn load_snapshot_applies_policy_file() {
    let _guard = env_guard().lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("policy.yaml");
    std::fs::write(
        &file_path,
        r#"features:
  insights: false
plans:
  free:
    recommendations: true
rate_limits:
  classes:
    generation:
      limit: 5
    interactive:
      limit: 500
    burst:
      limit: 3
      window: 2s
  capabilities:
    chatbot: burst
"#,
    )
    .unwrap();

    let snapshot = load_snapshot(Some(&file_path)).unwrap();
    assert!(!snapshot.feature_enabled(INSIGHTS));
    assert!(snapshot.plan_allows(PlanTier::Free, RECOMMENDATIONS));
    assert_eq!(snapshot.rate_limit_for(RECOMMENDATIONS).limit, 5);
    // files may only tighten an existing limit
    assert_eq!(snapshot.rate_limits.classes["interactive"].limit, 30);
    assert_eq!(
        snapshot.rate_limit_for(CHATBOT),
        RateLimitRule::new(3, 2_000)
    );
    assert_eq!(
        snapshot.provenance["features.insights"].source,
        PolicySource::File
    );
}

#[test]
fn missing_policy_file_is_skipped() {
    let _guard = env_guard().lock().unwrap();
    let options = LoadOptions {
        paths: vec!["does/not/exist.yaml".into()],
        include_env: false,
        include_cli_env: false,
    };
    let snapshot = load_snapshot_with_options(&options).unwrap();
    assert_eq!(snapshot.rev, 1);
    assert_eq!(
        snapshot.provenance["features.chatbot"].source,
        PolicySource::Builtin
    );
}

#[test]
fn env_cascade_prefers_stricter_value() {
    let _guard = env_guard().lock().unwrap();
    let key = "EVENTRA_POLICY__RATE_LIMITS__CLASSES__GENERATION__LIMIT";
    env::set_var(key, "4");
    let snapshot = load_snapshot(None).expect("load snapshot");
    env::remove_var(key);
    assert_eq!(snapshot.rate_limits.classes["generation"].limit, 4);
    assert_eq!(
        snapshot
            .provenance
            .get("rate_limits.classes.generation.limit")
            .expect("provenance")
            .source,
        PolicySource::Env
    );
}

#[test]
fn env_json_overrides_feature_flags() {
    let _guard = env_guard().lock().unwrap();
    env::set_var(
        "EVENTRA_POLICY_OVERRIDE_JSON",
        r#"{"features": {"chatbot": false}}"#,
    );
    let snapshot = load_snapshot(None).expect("load snapshot");
    env::remove_var("EVENTRA_POLICY_OVERRIDE_JSON");
    assert!(!snapshot.feature_enabled(CHATBOT));
}

#[test]
fn cli_overrides_replace_and_record_provenance() {
    let _guard = env_guard().lock().unwrap();
    env::set_var(
        "EVENTRA_POLICY_CLI_OVERRIDES",
        "plans.free.insights=true,rate_limits.classes.generation.limit=100",
    );
    let snapshot = load_snapshot(None).expect("load snapshot with cli");
    env::remove_var("EVENTRA_POLICY_CLI_OVERRIDES");
    assert!(snapshot.plan_allows(PlanTier::Free, INSIGHTS));
    assert_eq!(snapshot.rate_limits.classes["generation"].limit, 100);
    assert_eq!(
        snapshot
            .provenance
            .get("plans.free.insights")
            .unwrap()
            .source,
        PolicySource::Cli
    );
}

#[test]
fn file_layer_cannot_loosen_rate_limits() {
    let _guard = env_guard().lock().unwrap();
    let mut snapshot = load_snapshot_with_options(&LoadOptions::default()).unwrap();

    for (path, value) in [
        ("rate_limits.classes.generation.limit", serde_json::json!(0)),
        ("rate_limits.classes.generation.window", serde_json::json!("10s")),
        ("rate_limits.classes.read.window_ms", serde_json::json!(120_000)),
    ] {
        apply_override_to_snapshot(&mut snapshot, path, &value, PolicySource::File).unwrap();
    }

    assert_eq!(
        snapshot.rate_limits.classes["generation"],
        RateLimitRule::new(10, 60_000)
    );
    assert_eq!(snapshot.rate_limits.classes["read"].window_ms, 120_000);

    apply_override_to_snapshot(
        &mut snapshot,
        "rate_limits.classes.generation.limit",
        &serde_json::json!(0),
        PolicySource::Cli,
    )
    .unwrap();
    assert!(snapshot.rate_limit_for(RECOMMENDATIONS).is_unlimited());
}

#[test]
fn unsupported_paths_are_rejected() {
    let mut snapshot = default_snapshot();
    let err = apply_override_to_snapshot(
        &mut snapshot,
        "scheduler.limits.global_slots",
        &serde_json::json!(4),
        PolicySource::Cli,
    )
    .unwrap_err();
    assert!(matches!(err, PolicyError::UnsupportedPath(_)));

    let err = apply_override_to_snapshot(
        &mut snapshot,
        "plans.platinum.chatbot",
        &serde_json::json!(true),
        PolicySource::Cli,
    )
    .unwrap_err();
    assert!(matches!(err, PolicyError::UnsupportedPath(_)));
}

#[test]
fn invalid_values_are_rejected() {
    let mut snapshot = default_snapshot();
    let err = apply_override_to_snapshot(
        &mut snapshot,
        "rate_limits.classes.read.window",
        &serde_json::json!("soon"),
        PolicySource::Cli,
    )
    .unwrap_err();
    assert!(matches!(err, PolicyError::InvalidValue(_)));

    let err = apply_override_to_snapshot(
        &mut snapshot,
        "features.chatbot",
        &serde_json::json!("yes please"),
        PolicySource::Cli,
    )
    .unwrap_err();
    assert!(matches!(err, PolicyError::InvalidValue(_)));
}

#[test]
fn builtin_provenance_covers_every_policy_value() {
    let _guard = env_guard().lock().unwrap();
    let snapshot = load_snapshot_with_options(&LoadOptions::default()).unwrap();
    let paths = snapshot.policy_paths();
    assert!(paths.contains(&PolicyPath::ClassWindow("read".into())));
    for path in paths {
        let provenance = snapshot
            .provenance
            .get(&path.key())
            .unwrap_or_else(|| panic!("no provenance for {path}"));
        assert_eq!(provenance.source, PolicySource::Builtin);
    }
    assert_eq!(snapshot.provenance.len(), snapshot.policy_paths().len());
}

#[test]
fn bad_path_in_policy_file_names_the_file() {
    let _guard = env_guard().lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("typo.yaml");
    std::fs::write(
        &file_path,
        "rate_limits:\n  classes:\n    generation:\n      limt: 5\n",
    )
    .unwrap();

    let err = load_snapshot(Some(&file_path)).unwrap_err();
    assert!(matches!(err.root(), PolicyError::UnsupportedPath(path) if path.ends_with("limt")));
    let message = err.to_string();
    assert!(message.contains("typo.yaml"), "{message}");

    std::fs::write(&file_path, "scheduler:\n  slots: 4\n").unwrap();
    let err = load_snapshot(Some(&file_path)).unwrap_err();
    assert!(matches!(err.root(), PolicyError::UnsupportedPath(_)));
    assert!(err.to_string().contains("typo.yaml"));
}

#[test]
fn bad_env_path_names_the_variable() {
    let _guard = env_guard().lock().unwrap();
    let key = "EVENTRA_POLICY__RATE_LIMITS__CLASSES__GENERATION__BURST";
    env::set_var(key, "4");
    let result = load_snapshot(None);
    env::remove_var(key);

    let err = result.unwrap_err();
    assert!(matches!(err.root(), PolicyError::UnsupportedPath(_)));
    assert!(err.to_string().contains(key));
}

#[test]
fn zero_window_on_limited_class_is_rejected() {
    let _guard = env_guard().lock().unwrap();
    env::set_var(
        "EVENTRA_POLICY_CLI_OVERRIDES",
        "rate_limits.classes.generation.window_ms=0",
    );
    let result = load_snapshot(None);
    env::remove_var("EVENTRA_POLICY_CLI_OVERRIDES");
    assert!(matches!(result.unwrap_err().root(), PolicyError::Invalid(_)));

    // An unlimited class never consults its window.
    env::set_var(
        "EVENTRA_POLICY_CLI_OVERRIDES",
        "rate_limits.classes.generation.limit=0,rate_limits.classes.generation.window_ms=0",
    );
    let result = load_snapshot(None);
    env::remove_var("EVENTRA_POLICY_CLI_OVERRIDES");
    assert!(result.unwrap().rate_limit_for(RECOMMENDATIONS).is_unlimited());
}

#[test]
fn dangling_class_references_are_rejected() {
    let _guard = env_guard().lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("policy.yaml");

    std::fs::write(
        &file_path,
        "rate_limits:\n  capabilities:\n    chatbot: bursty\n",
    )
    .unwrap();
    let err = load_snapshot(Some(&file_path)).unwrap_err();
    assert!(matches!(err.root(), PolicyError::Invalid(message) if message.contains("bursty")));

    std::fs::write(&file_path, "rate_limits:\n  default_class: nightly\n").unwrap();
    let err = load_snapshot(Some(&file_path)).unwrap_err();
    assert!(matches!(err.root(), PolicyError::Invalid(message) if message.contains("nightly")));
}

fn env_guard() -> &'static Mutex<()> {
    static ENV_GUARD: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_GUARD.get_or_init(|| Mutex::new(()))
}
