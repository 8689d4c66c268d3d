//! Test helpers: configuration, a scripted identity provider and a test server factory.

use async_trait::async_trait;
use axum_extra::extract::cookie::Cookie;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, Once,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use uuid::Uuid;

use crate::{
    Application,
    auth::cookies::SessionCookies,
    config::Config,
    identity::{IdentityError, IdentityProvider, IdentityUser, SignUpOutcome},
};

/// Session cookie name used by [`MockIdentityProvider`], matching the default configuration
pub const MOCK_SESSION_COOKIE: &str = "nexus-auth-token";

static CRYPTO_PROVIDER: Once = Once::new();

/// reqwest is built without a bundled rustls provider; tests that build a client need one
pub fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.identity.url = Some("http://127.0.0.1:9999".parse().expect("valid test URL"));
    config.identity.anon_key = Some("test-anon-key".to_string());
    config.identity.request_timeout = Duration::from_secs(1);
    config
}

pub fn test_user() -> IdentityUser {
    IdentityUser {
        id: Uuid::from_u128(0x6f1c2a34_1111_4c5e_9d7e_0123456789ab),
        email: Some("ada@example.com".to_string()),
        role: Some("authenticated".to_string()),
    }
}

/// Full application (gate included) around `provider`
pub fn create_test_app(provider: MockIdentityProvider) -> axum_test::TestServer {
    Application::with_identity(create_test_config(), Arc::new(provider))
        .expect("Failed to create test application")
        .into_test_server()
}

#[derive(Default)]
struct MockState {
    /// Session token to user
    sessions: HashMap<String, IdentityUser>,
    /// Email to (password, user)
    accounts: HashMap<String, (String, IdentityUser)>,
}

/// In-memory identity service.
///
/// Sessions are plain tokens stored in the [`MOCK_SESSION_COOKIE`] cookie. Unknown tokens are
/// treated as expired and cleared, like the real service does.
#[derive(Default)]
pub struct MockIdentityProvider {
    state: Mutex<MockState>,
    rotation: Option<Cookie<'static>>,
    failing: bool,
    failing_after_rotation: bool,
    failing_sign_out: bool,
    requires_confirmation: bool,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(self, token: &str, user: IdentityUser) -> Self {
        self.lock().sessions.insert(token.to_string(), user);
        self
    }

    pub fn with_account(self, email: &str, password: &str, user: IdentityUser) -> Self {
        self.lock().accounts.insert(email.to_string(), (password.to_string(), user));
        self
    }

    /// Cookie written on every successful lookup, as a session refresh would
    pub fn with_rotation(mut self, cookie: Cookie<'static>) -> Self {
        self.rotation = Some(cookie);
        self
    }

    /// Every call fails as if the service were down
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// User lookups record the rotation cookie, then fail
    pub fn failing_after_rotation(mut self) -> Self {
        self.failing_after_rotation = true;
        self
    }

    pub fn failing_sign_out(mut self) -> Self {
        self.failing_sign_out = true;
        self
    }

    /// Sign-up succeeds without issuing a session
    pub fn requiring_confirmation(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    /// Delay applied to every user lookup
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of calls made to the provider, shared with the returned handle
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock identity state poisoned")
    }

    fn record_call(&self, operation: &str) -> Result<(), IdentityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(IdentityError::Rejected {
                operation: operation.to_string(),
                status: 503,
                message: "mock identity service unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn start_session(&self, cookies: &mut SessionCookies, user: &IdentityUser) {
        let token = Uuid::new_v4().to_string();
        self.lock().sessions.insert(token.clone(), user.clone());
        let cookie = Cookie::parse(format!("{MOCK_SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax"))
            .expect("valid mock session cookie");
        cookies.set(cookie);
    }

    fn clear_session(cookies: &mut SessionCookies) {
        let removal = Cookie::parse(format!("{MOCK_SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"))
            .expect("valid mock removal cookie");
        cookies.remove(removal);
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn current_user(&self, cookies: &mut SessionCookies) -> Result<Option<IdentityUser>, IdentityError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_after_rotation {
            if let Some(rotation) = &self.rotation {
                cookies.set(rotation.clone());
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            return Err(IdentityError::Rejected {
                operation: "get user".to_string(),
                status: 503,
                message: "mock lookup failed after refresh".to_string(),
            });
        }
        self.record_call("get user")?;

        let Some(token) = cookies.get(MOCK_SESSION_COOKIE).map(|c| c.value().to_string()) else {
            return Ok(None);
        };

        let user = self.lock().sessions.get(&token).cloned();
        match user {
            Some(user) => {
                if let Some(rotation) = &self.rotation {
                    cookies.set(rotation.clone());
                }
                Ok(Some(user))
            }
            None => {
                Self::clear_session(cookies);
                Ok(None)
            }
        }
    }

    async fn sign_in_with_password(&self, cookies: &mut SessionCookies, email: &str, password: &str) -> Result<IdentityUser, IdentityError> {
        self.record_call("sign in")?;

        let user = match self.lock().accounts.get(email) {
            Some((expected, user)) if expected == password => user.clone(),
            _ => return Err(IdentityError::InvalidCredentials),
        };
        self.start_session(cookies, &user);
        Ok(user)
    }

    async fn sign_up(&self, cookies: &mut SessionCookies, email: &str, password: &str) -> Result<SignUpOutcome, IdentityError> {
        self.record_call("sign up")?;

        let user = {
            let mut state = self.lock();
            if state.accounts.contains_key(email) {
                return Err(IdentityError::AlreadyRegistered);
            }
            let user = IdentityUser {
                id: Uuid::new_v4(),
                email: Some(email.to_string()),
                role: Some("authenticated".to_string()),
            };
            state.accounts.insert(email.to_string(), (password.to_string(), user.clone()));
            user
        };

        if self.requires_confirmation {
            return Ok(SignUpOutcome {
                user,
                session_established: false,
            });
        }
        self.start_session(cookies, &user);
        Ok(SignUpOutcome {
            user,
            session_established: true,
        })
    }

    async fn sign_out(&self, cookies: &mut SessionCookies) -> Result<(), IdentityError> {
        let token = cookies.get(MOCK_SESSION_COOKIE).map(|c| c.value().to_string());
        Self::clear_session(cookies);
        self.record_call("sign out")?;

        if self.failing_sign_out {
            return Err(IdentityError::Rejected {
                operation: "sign out".to_string(),
                status: 500,
                message: "mock sign-out failure".to_string(),
            });
        }
        if let Some(token) = token {
            self.lock().sessions.remove(&token);
        }
        Ok(())
    }
}
