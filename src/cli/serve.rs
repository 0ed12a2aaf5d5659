use std::env;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use admission_gate::{
    IdentityProvider, RateLimiter, SessionIdentityProvider, StaticTokenVerifier,
};
use anyhow::{Context, Result};
use clap::Args;
use eventra_policy_center::PolicySnapshot;
use flow_core::{DisabledProvider, FlowInvoker, FlowRegistry, GenerationProvider, OpenAiProvider};
use tokio::net::TcpListener;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{Config, ProviderKind, RateLimitGcConfig};
use crate::server::{build_router, GatewayState};

const AUTH_TOKENS_ENV: &str = "EVENTRA_AUTH_TOKENS";

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Address to bind (overrides config)
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Session token accepted by the gateway (repeat for multiple tokens)
    #[arg(long = "auth-token", value_name = "TOKEN")]
    pub auth_token: Vec<String>,

    /// Never call the generation provider; every flow answers with its fallback
    #[arg(long)]
    pub offline: bool,
}

pub async fn cmd_serve(args: ServeArgs, config: Config, policy: PolicySnapshot) -> Result<()> {
    config.validate()?;

    let limiter = Arc::new(RateLimiter::new());
    spawn_rate_limit_cleanup(Arc::clone(&limiter), &config.rate_limit_gc);

    let identity = build_identity_provider(&args);
    let selection = build_generation_provider(&args, &config)?;
    let invoker = FlowInvoker::new(Arc::clone(&selection.provider));
    let flows = Arc::new(FlowRegistry::builtin());
    info!(
        provider = invoker.provider_name(),
        flows = flows.len(),
        "Flow registry ready"
    );

    let state = GatewayState::new(Arc::new(policy), limiter, identity, flows, invoker);
    state.mark_live();
    selection.report_readiness(&state);

    let router = build_router(state);

    let bind = args.bind.unwrap_or(config.server.bind);
    let port = args.port.unwrap_or(config.server.port);
    let addr = SocketAddr::new(bind, port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind gateway on {}", addr))?;
    info!("Eventra gateway listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited unexpectedly")?;
    info!("Gateway stopped");
    Ok(())
}

fn build_identity_provider(args: &ServeArgs) -> Arc<dyn IdentityProvider> {
    let tokens = collect_auth_tokens(&args.auth_token, env::var(AUTH_TOKENS_ENV).ok());
    if tokens.is_empty() {
        warn!("No auth tokens configured; any non-empty session token is accepted");
        return Arc::new(SessionIdentityProvider::accept_any());
    }
    info!(tokens = tokens.len(), "Session token allowlist enabled");
    Arc::new(SessionIdentityProvider::new(StaticTokenVerifier::new(tokens)))
}

fn collect_auth_tokens(cli: &[String], env_value: Option<String>) -> Vec<String> {
    let mut tokens: Vec<String> = cli
        .iter()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .collect();
    if let Some(raw) = env_value {
        tokens.extend(
            raw.split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
        );
    }
    tokens.sort();
    tokens.dedup();
    tokens
}

/// Why the gateway runs without a generation provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DisabledReason {
    Offline,
    DisabledInConfig,
    MissingApiKey,
}

impl DisabledReason {
    fn as_str(self) -> &'static str {
        match self {
            DisabledReason::Offline => "gateway started with --offline",
            DisabledReason::DisabledInConfig => "provider disabled in configuration",
            DisabledReason::MissingApiKey => "no provider API key configured",
        }
    }

    /// Only an accidental outage keeps the gateway out of rotation.
    fn blocks_readiness(self) -> bool {
        matches!(self, DisabledReason::MissingApiKey)
    }
}

struct ProviderSelection {
    provider: Arc<dyn GenerationProvider>,
    disabled: Option<DisabledReason>,
}

impl ProviderSelection {
    fn report_readiness(&self, state: &GatewayState) {
        match self.disabled {
            Some(reason) if reason.blocks_readiness() => {
                warn!(reason = reason.as_str(), "Gateway not ready; every flow will degrade");
                state.mark_unready(reason.as_str());
            }
            _ => state.mark_ready(),
        }
    }
}

fn build_generation_provider(args: &ServeArgs, config: &Config) -> Result<ProviderSelection> {
    let reason = if args.offline {
        Some(DisabledReason::Offline)
    } else if config.provider.kind == ProviderKind::Disabled {
        Some(DisabledReason::DisabledInConfig)
    } else if !config.provider.has_api_key() {
        Some(DisabledReason::MissingApiKey)
    } else {
        None
    };

    if let Some(reason) = reason {
        warn!(
            reason = reason.as_str(),
            "Generation provider disabled; flows will return fallbacks"
        );
        return Ok(ProviderSelection {
            provider: Arc::new(DisabledProvider::new(reason.as_str())),
            disabled: Some(reason),
        });
    }

    let provider = OpenAiProvider::new(config.provider.openai_config())
        .context("failed to build generation provider")?;
    info!(
        model = %config.provider.model,
        api_base = %config.provider.api_base,
        "Generation provider configured"
    );
    Ok(ProviderSelection {
        provider: Arc::new(provider),
        disabled: None,
    })
}

fn spawn_rate_limit_cleanup(limiter: Arc<RateLimiter>, gc: &RateLimitGcConfig) {
    let ttl = gc.ttl();
    if ttl.is_zero() {
        info!("Rate limiter window GC disabled (ttl=0)");
        return;
    }
    let gc_interval = gc.interval();
    info!(
        ttl = %humantime::format_duration(ttl),
        interval = %humantime::format_duration(gc_interval),
        "Rate limiter GC enabled"
    );
    tokio::spawn(async move {
        let mut ticker = interval(gc_interval);
        loop {
            ticker.tick().await;
            let removed = limiter.prune_idle(ttl);
            if removed > 0 {
                debug!(removed, remaining = limiter.len(), "Pruned idle rate limit windows");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
