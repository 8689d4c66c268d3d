//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `NEXUSD_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `NEXUSD_` override YAML values
//! 3. **IDENTITY_URL / IDENTITY_ANON_KEY** - Special case: override `identity.url` and
//!    `identity.anon_key` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `NEXUSD_IDENTITY__REQUEST_TIMEOUT=2s` sets the `identity.request_timeout` field.
//!
//! ## Required values
//!
//! The identity service base URL and its public (anon) key have no defaults. If either is
//! missing, [`Config::load`] fails and the server refuses to start.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use nexusd::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Identity service (required)
//! IDENTITY_URL="https://abcd.identity.example.com"
//! IDENTITY_ANON_KEY="eyJhbGciOi..."
//!
//! # Override server port
//! NEXUSD_PORT=8080
//!
//! # Override nested values
//! NEXUSD_IDENTITY__SESSION_COOKIE__SECURE=false
//! NEXUSD_GATE__LOGIN_PATH=/sign-in
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::{
    auth::gate::{GatePolicy, PathClass},
    errors::Error,
};

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "NEXUSD_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields except the identity service credentials have defaults defined in the `Default`
/// implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// External identity service connection settings
    pub identity: IdentityConfig,
    /// Path access policy enforced by the session gate
    pub gate: GateConfig,
    /// Login and registration form rules
    pub forms: FormsConfig,
    /// Export traces over OTLP (configured via standard OTEL_* environment variables)
    pub enable_otel_export: bool,
}

/// Identity service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    /// Base URL of the identity service (e.g., "https://abcd.identity.example.com")
    pub url: Option<Url>,
    /// Public API key sent with every identity service request
    #[serde(skip_serializing)]
    pub anon_key: Option<String>,
    /// Upper bound on a single identity service call. The session gate fails open on expiry.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Refresh the access token when it expires within this window
    #[serde(with = "humantime_serde")]
    pub refresh_margin: Duration,
    /// Attributes of the cookie carrying the identity session
    pub session_cookie: SessionCookieConfig,
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionCookieConfig {
    /// Cookie name for the session token
    pub name: String,
    /// Set Secure flag on cookies (HTTPS only)
    pub secure: bool,
    /// SameSite cookie attribute ("strict", "lax", or "none")
    pub same_site: String,
    /// Lifetime of the cookie in the browser
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

/// Path classification and redirect targets for the session gate.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    /// Prefixes of pages reserved for signed-out users (login, registration)
    pub auth_page_prefixes: Vec<String>,
    /// Prefixes that skip the gate entirely (health checks, static assets)
    pub bypass_prefixes: Vec<String>,
    /// Where signed-out users are sent when they request a protected page
    pub login_path: String,
    /// Where signed-in users are sent when they request an auth page
    pub dashboard_path: String,
}

/// Form validation rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormsConfig {
    pub password: PasswordConfig,
}

/// Password validation rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    /// Minimum password length
    pub min_length: usize,
    /// Maximum password length
    pub max_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            identity: IdentityConfig::default(),
            gate: GateConfig::default(),
            forms: FormsConfig::default(),
            enable_otel_export: false,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            request_timeout: Duration::from_secs(5),
            refresh_margin: Duration::from_secs(60),
            session_cookie: SessionCookieConfig::default(),
        }
    }
}

impl Default for SessionCookieConfig {
    fn default() -> Self {
        Self {
            name: "nexus-auth-token".to_string(),
            secure: true,
            same_site: "lax".to_string(),
            max_age: Duration::from_secs(400 * 24 * 60 * 60), // 400 days
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            auth_page_prefixes: vec!["/login".to_string(), "/register".to_string()],
            bypass_prefixes: vec!["/healthz".to_string(), "/static/".to_string(), "/favicon.ico".to_string()],
            login_path: "/login".to_string(),
            dashboard_path: "/dashboard".to_string(),
        }
    }
}

impl Default for FormsConfig {
    fn default() -> Self {
        Self {
            password: PasswordConfig::default(),
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 64,
        }
    }
}

impl IdentityConfig {
    /// Base URL of the identity service. Only `None` before validation.
    pub fn url(&self) -> Result<&Url, Error> {
        self.url.as_ref().ok_or_else(|| Error::Configuration {
            message: "identity.url is not configured".to_string(),
        })
    }

    /// Public API key of the identity service. Only `None` before validation.
    pub fn anon_key(&self) -> Result<&str, Error> {
        self.anon_key.as_deref().ok_or_else(|| Error::Configuration {
            message: "identity.anon_key is not configured".to_string(),
        })
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, Error> {
        let config: Self = Self::figment(args).extract().map_err(|e| Error::Configuration { message: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.identity.url.is_none() {
            return Err(Error::Configuration {
                message: "Missing identity service URL. Set IDENTITY_URL or identity.url in the config file.".to_string(),
            });
        }

        match self.identity.anon_key.as_deref() {
            None => {
                return Err(Error::Configuration {
                    message: "Missing identity service key. Set IDENTITY_ANON_KEY or identity.anon_key in the config file.".to_string(),
                });
            }
            Some(key) if key.trim().is_empty() => {
                return Err(Error::Configuration {
                    message: "identity.anon_key must not be empty".to_string(),
                });
            }
            Some(_) => {}
        }

        if self.identity.request_timeout.is_zero() {
            return Err(Error::Configuration {
                message: "identity.request_timeout must be greater than zero".to_string(),
            });
        }

        let cookie = &self.identity.session_cookie;
        if cookie.name.is_empty() {
            return Err(Error::Configuration {
                message: "identity.session_cookie.name must not be empty".to_string(),
            });
        }
        match cookie.same_site.to_ascii_lowercase().as_str() {
            "strict" | "lax" => {}
            "none" if cookie.secure => {}
            "none" => {
                return Err(Error::Configuration {
                    message: "identity.session_cookie.same_site=none requires secure=true".to_string(),
                });
            }
            other => {
                return Err(Error::Configuration {
                    message: format!("identity.session_cookie.same_site must be strict, lax or none (got '{other}')"),
                });
            }
        }

        let password = &self.forms.password;
        if password.min_length < 1 {
            return Err(Error::Configuration {
                message: "forms.password.min_length must be at least 1".to_string(),
            });
        }
        if password.min_length > password.max_length {
            return Err(Error::Configuration {
                message: format!(
                    "forms.password.min_length ({}) cannot be greater than max_length ({})",
                    password.min_length, password.max_length
                ),
            });
        }

        for (field, target) in [("gate.login_path", &self.gate.login_path), ("gate.dashboard_path", &self.gate.dashboard_path)] {
            if !target.starts_with('/') {
                return Err(Error::Configuration {
                    message: format!("{field} must be an absolute path (got '{target}')"),
                });
            }
        }
        if self.gate.auth_page_prefixes.iter().any(|p| p.is_empty() || p == "/") {
            return Err(Error::Configuration {
                message: "gate.auth_page_prefixes must not contain an empty or root prefix".to_string(),
            });
        }
        if self.gate.bypass_prefixes.iter().any(|p| p.is_empty() || p == "/") {
            return Err(Error::Configuration {
                message: "gate.bypass_prefixes must not contain an empty or root prefix".to_string(),
            });
        }

        // Either mistake sends redirected callers straight back to the gate in a loop
        let policy = GatePolicy::from(&self.gate);
        if policy.classify(&self.gate.login_path) != PathClass::AuthPage {
            return Err(Error::Configuration {
                message: format!(
                    "gate.login_path '{}' must fall under one of gate.auth_page_prefixes",
                    self.gate.login_path
                ),
            });
        }
        if policy.classify(&self.gate.dashboard_path) != PathClass::ProtectedPage {
            return Err(Error::Configuration {
                message: format!(
                    "gate.dashboard_path '{}' must be a protected page, not the root or an auth page",
                    self.gate.dashboard_path
                ),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            // NEXUSD_CONFIG names the file itself and is consumed by clap
            .merge(Env::prefixed("NEXUSD_").ignore(&["CONFIG"]).split("__"))
            .merge(Env::raw().only(&["IDENTITY_URL"]).map(|_| "identity.url".into()))
            .merge(Env::raw().only(&["IDENTITY_ANON_KEY"]).map(|_| "identity.anon_key".into()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
