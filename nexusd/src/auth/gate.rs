//! Session gate decision logic.
//!
//! [`SessionGate::evaluate`] asks the identity service who the caller is, classifies the request
//! path and picks an [`AccessDecision`]. Classification and the decision table are pure; the
//! identity call is the only fallible step, and when it fails (or exceeds the configured timeout)
//! the gate fails open with [`AccessDecision::Allow`]. Cookie mutations the provider recorded
//! before failing are kept, so a session rotated by a refresh is never lost.

use std::{sync::Arc, time::Duration};
use tracing::{debug, error, instrument};

use crate::{
    auth::cookies::SessionCookies,
    config::GateConfig,
    identity::{IdentityError, IdentityProvider, IdentityUser},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    /// Exactly `/`
    PublicRoot,
    /// Pages reserved for signed-out users
    AuthPage,
    ProtectedPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    RedirectToLogin,
    RedirectToDashboard,
}

impl AccessDecision {
    /// Redirect target for this decision, `None` for [`AccessDecision::Allow`]
    pub fn redirect_target<'a>(&self, policy: &'a GatePolicy) -> Option<&'a str> {
        match self {
            AccessDecision::Allow => None,
            AccessDecision::RedirectToLogin => Some(&policy.login_path),
            AccessDecision::RedirectToDashboard => Some(&policy.dashboard_path),
        }
    }
}

/// What the gate learned about the caller
#[derive(Debug, Clone, PartialEq)]
pub enum IdentityState {
    Authenticated(IdentityUser),
    Anonymous,
    /// The identity service could not be consulted
    Unavailable,
}

/// Static path policy built from [`GateConfig`].
#[derive(Debug, Clone)]
pub struct GatePolicy {
    auth_page_prefixes: Vec<String>,
    bypass_prefixes: Vec<String>,
    login_path: String,
    dashboard_path: String,
}

impl From<&GateConfig> for GatePolicy {
    fn from(config: &GateConfig) -> Self {
        Self {
            auth_page_prefixes: config.auth_page_prefixes.clone(),
            bypass_prefixes: config.bypass_prefixes.clone(),
            login_path: config.login_path.clone(),
            dashboard_path: config.dashboard_path.clone(),
        }
    }
}

impl GatePolicy {
    /// Paths that never reach the gate (health checks, static assets)
    pub fn bypasses(&self, path: &str) -> bool {
        self.bypass_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Prefix match is plain string comparison, so `/login` also covers `/login-help`.
    pub fn classify(&self, path: &str) -> PathClass {
        if path == "/" {
            PathClass::PublicRoot
        } else if self.auth_page_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str())) {
            PathClass::AuthPage
        } else {
            PathClass::ProtectedPage
        }
    }

    pub fn decide(&self, authenticated: bool, class: PathClass) -> AccessDecision {
        match (authenticated, class) {
            (true, PathClass::AuthPage) => AccessDecision::RedirectToDashboard,
            (false, PathClass::ProtectedPage) => AccessDecision::RedirectToLogin,
            (_, PathClass::PublicRoot) | (true, PathClass::ProtectedPage) | (false, PathClass::AuthPage) => AccessDecision::Allow,
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn dashboard_path(&self) -> &str {
        &self.dashboard_path
    }
}

/// Result of evaluating one request
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub decision: AccessDecision,
    pub identity: IdentityState,
    /// Request cookies plus any rotation made by the identity service
    pub cookies: SessionCookies,
}

impl GateOutcome {
    pub fn user(&self) -> Option<&IdentityUser> {
        match &self.identity {
            IdentityState::Authenticated(user) => Some(user),
            IdentityState::Anonymous | IdentityState::Unavailable => None,
        }
    }
}

/// Slack over the provider's own deadline, so the provider reports its timeout before the gate
/// cancels it
const DEADLINE_GRACE: Duration = Duration::from_millis(250);

pub struct SessionGate {
    identity: Arc<dyn IdentityProvider>,
    policy: GatePolicy,
    timeout: Duration,
}

impl SessionGate {
    pub fn new(identity: Arc<dyn IdentityProvider>, policy: GatePolicy, timeout: Duration) -> Self {
        Self { identity, policy, timeout }
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    #[instrument(skip(self, cookies))]
    pub async fn evaluate(&self, path: &str, mut cookies: SessionCookies) -> GateOutcome {
        let lookup = match tokio::time::timeout(self.timeout + DEADLINE_GRACE, self.identity.current_user(&mut cookies)).await {
            Ok(result) => result,
            Err(_) => Err(IdentityError::Timeout(self.timeout)),
        };

        let user = match lookup {
            Ok(user) => user,
            Err(e) => {
                error!(path = %path, error = %e, mutations = cookies.mutations().len(), "Identity lookup failed, failing open");
                return GateOutcome {
                    decision: AccessDecision::Allow,
                    identity: IdentityState::Unavailable,
                    cookies,
                };
            }
        };

        let class = self.policy.classify(path);
        let decision = self.policy.decide(user.is_some(), class);
        debug!(?class, ?decision, authenticated = user.is_some(), "Gate decision");

        GateOutcome {
            decision,
            identity: user.map_or(IdentityState::Anonymous, IdentityState::Authenticated),
            cookies,
        }
    }
}
