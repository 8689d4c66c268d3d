//! Session gating.
//!
//! Every request passes through [`middleware::session_gate_middleware`] before routing. The gate
//! asks the identity service for the current user, classifies the path and either lets the
//! request through or redirects it:
//!
//! | Signed in | Path                               | Result                  |
//! |-----------|------------------------------------|-------------------------|
//! | yes       | `/login`, `/register` (and below)  | redirect to `/dashboard` |
//! | no        | anything but `/` and auth pages    | redirect to `/login`    |
//! | any       | `/`                                | allowed                 |
//!
//! Session refreshes performed by the identity service while answering are relayed as
//! `Set-Cookie` headers on the response, redirect or not. If the identity service cannot be
//! reached the gate logs the failure and lets the request through unchanged.
//!
//! # Modules
//!
//! - [`cookies`]: Request/response cookie carrier shared with the identity provider
//! - [`current_user`]: Extractor for the user resolved by the gate
//! - [`gate`]: Path classification and the access decision table
//! - [`middleware`]: The axum middleware applying gate decisions
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use nexusd::auth::current_user::CurrentUser;
//!
//! async fn profile(CurrentUser(user): CurrentUser) -> String {
//!     format!("Hello, {}!", user.display_name())
//! }
//! ```

pub mod cookies;
pub mod current_user;
pub mod gate;
pub mod middleware;
