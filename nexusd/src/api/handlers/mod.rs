//! HTTP handlers for the dashboard pages and form actions.
//!
//! Every route sits behind the session gate, so handlers can rely on it for access control:
//! anything other than `/` and the auth pages is only reached by signed-in users (or by anyone,
//! while the identity service is unreachable). Handlers that call the identity service relay its
//! cookie mutations onto their own response.
//!
//! # Handler Modules
//!
//! - [`auth`]: Login, registration and logout forms
//! - [`dashboard`]: Dashboard page and its JSON data
//! - [`pages`]: Root redirect, health check and the not-found page

pub mod auth;
pub mod dashboard;
pub mod pages;
