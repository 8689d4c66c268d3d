//! Request and response shapes for the page handlers.

pub mod auth;
pub mod dashboard;
