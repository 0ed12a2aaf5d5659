use std::collections::{HashMap, HashSet};

use eventra_core_types::{Identity, PlanTier, Role};
use tracing::debug;

const TOKEN_COOKIE: &str = "auth-token";
const USER_ID_COOKIE: &str = "user-id";
const ROLE_COOKIE: &str = "user-role";
const PLAN_COOKIE: &str = "user-plan";

/// Transport-agnostic view of the request metadata identity is read from.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from raw header pairs. `Cookie` headers are split into cookies.
    pub fn from_headers<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut ctx = Self::default();
        for (name, value) in pairs {
            ctx.insert_header(name.as_ref(), value.as_ref());
        }
        ctx
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies
            .insert(name.trim().to_string(), value.trim().to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Token from an `Authorization: Bearer` header.
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("authorization")
            .and_then(|raw| raw.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    fn insert_header(&mut self, name: &str, value: &str) {
        let name = name.trim().to_ascii_lowercase();
        if name == "cookie" {
            for pair in value.split(';') {
                if let Some((key, val)) = pair.split_once('=') {
                    let key = key.trim();
                    if !key.is_empty() {
                        self.cookies
                            .insert(key.to_string(), val.trim().trim_matches('"').to_string());
                    }
                }
            }
            return;
        }
        self.headers.insert(name, value.trim().to_string());
    }

    /// Cookie first, then the `x-` prefixed header. Blank values count as missing.
    fn lookup(&self, cookie: &str) -> Option<&str> {
        self.cookie(cookie)
            .filter(|value| !value.is_empty())
            .or_else(|| {
                self.header(&format!("x-{cookie}"))
                    .filter(|value| !value.is_empty())
            })
    }
}

/// Resolves the caller's identity from request metadata.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, ctx: &RequestContext) -> Option<Identity>;
}

/// Session tokens are issued and signed elsewhere; this only answers accept or reject.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str, user_id: &str) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAnyToken;

impl TokenVerifier for AcceptAnyToken {
    fn verify(&self, _token: &str, _user_id: &str) -> bool {
        true
    }
}

/// Allow-list of tokens fixed at startup.
#[derive(Clone, Debug, Default)]
pub struct StaticTokenVerifier {
    tokens: HashSet<String>,
}

impl StaticTokenVerifier {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens = tokens
            .into_iter()
            .map(Into::into)
            .map(|token: String| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .collect();
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str, _user_id: &str) -> bool {
        self.tokens.contains(token)
    }
}

/// Reads the session cookies set by the web app, with `x-` headers as fallback.
pub struct SessionIdentityProvider<V = AcceptAnyToken> {
    verifier: V,
}

impl SessionIdentityProvider<AcceptAnyToken> {
    pub fn accept_any() -> Self {
        Self {
            verifier: AcceptAnyToken,
        }
    }
}

impl<V: TokenVerifier> SessionIdentityProvider<V> {
    pub fn new(verifier: V) -> Self {
        Self { verifier }
    }
}

impl<V: TokenVerifier> IdentityProvider for SessionIdentityProvider<V> {
    fn resolve(&self, ctx: &RequestContext) -> Option<Identity> {
        let token = ctx.lookup(TOKEN_COOKIE).or_else(|| ctx.bearer_token())?;
        let user_id = ctx.lookup(USER_ID_COOKIE)?;
        if !self.verifier.verify(token, user_id) {
            debug!(user_id, "session token rejected");
            return None;
        }

        let role = match ctx.lookup(ROLE_COOKIE) {
            Some(raw) => match raw.parse::<Role>() {
                Ok(role) => role,
                Err(err) => {
                    debug!(user_id, error = %err, "unparseable session role");
                    return None;
                }
            },
            None => Role::default(),
        };
        let plan = match ctx.lookup(PLAN_COOKIE) {
            Some(raw) => match raw.parse::<PlanTier>() {
                Ok(plan) => plan,
                Err(err) => {
                    debug!(user_id, error = %err, "unparseable session plan");
                    return None;
                }
            },
            None => PlanTier::default(),
        };

        Some(Identity::new(user_id, role, plan))
    }
}
