//! External identity service integration.
//!
//! Authentication is owned by a GoTrue-style identity service. This crate never stores users or
//! verifies passwords itself: it forwards credentials, relays the session the service issues, and
//! asks the service who the current user is on every gated request.
//!
//! The service is reached through the [`IdentityProvider`] trait so the session gate and the
//! form handlers can be exercised against an in-memory provider in tests. The production
//! implementation is [`HttpIdentityClient`], built once at startup and shared through
//! [`crate::AppState`].
//!
//! Every operation receives the request's [`SessionCookies`] with read/write access. Providers
//! record session rotations (refresh, sign-in, sign-out) as cookie mutations, and callers are
//! responsible for relaying those mutations onto whatever response they return.
//!
//! # Modules
//!
//! - [`client`]: HTTP implementation of [`IdentityProvider`]
//! - [`session`]: Encoding of the identity session into a cookie

pub mod client;
pub mod session;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error as ThisError;
use uuid::Uuid;

use crate::auth::cookies::SessionCookies;

pub use client::HttpIdentityClient;

/// A user as reported by the identity service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl IdentityUser {
    /// Short name shown in the page header: the local part of the email address.
    pub fn display_name(&self) -> &str {
        self.email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .filter(|name| !name.is_empty())
            .unwrap_or("User")
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUpOutcome {
    pub user: IdentityUser,
    /// False when the service requires email confirmation before issuing a session
    pub session_established: bool,
}

#[derive(ThisError, Debug)]
pub enum IdentityError {
    /// Network-level failure talking to the identity service
    #[error("identity service request failed during {operation}: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    /// The identity service did not answer in time
    #[error("identity service did not answer within {0:?}")]
    Timeout(Duration),

    /// The identity service answered with a body we could not interpret
    #[error("identity service returned an unexpected response to {operation}: {message}")]
    MalformedResponse { operation: String, message: String },

    /// The identity service refused the request for a reason other than bad credentials
    #[error("identity service rejected {operation} with status {status}: {message}")]
    Rejected { operation: String, status: u16, message: String },

    /// Email/password pair not accepted
    #[error("invalid login credentials")]
    InvalidCredentials,

    /// Registration attempted for an existing account
    #[error("an account with this email is already registered")]
    AlreadyRegistered,

    /// A session cookie could not be constructed from the configured attributes
    #[error("invalid session cookie: {message}")]
    InvalidCookie { message: String },
}

/// Operations the application needs from the identity service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the signed-in user from the session cookie.
    ///
    /// Returns `Ok(None)` for anonymous callers and for sessions the service no longer
    /// recognises. May rotate the session cookie as a side effect of refreshing it.
    async fn current_user(&self, cookies: &mut SessionCookies) -> Result<Option<IdentityUser>, IdentityError>;

    /// Exchange an email and password for a session, stored in `cookies`.
    async fn sign_in_with_password(&self, cookies: &mut SessionCookies, email: &str, password: &str) -> Result<IdentityUser, IdentityError>;

    /// Create an account. Stores a session in `cookies` when the service issues one.
    async fn sign_up(&self, cookies: &mut SessionCookies, email: &str, password: &str) -> Result<SignUpOutcome, IdentityError>;

    /// End the session. The session cookie is cleared even when the service call fails.
    async fn sign_out(&self, cookies: &mut SessionCookies) -> Result<(), IdentityError>;
}
