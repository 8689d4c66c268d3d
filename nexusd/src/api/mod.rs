//! HTTP layer: page handlers and the data they exchange.
//!
//! - **[`handlers`]**: Axum route handlers for pages and form actions
//! - **[`models`]**: Form inputs and dashboard data structures
//!
//! # Routes
//!
//! - `GET /`: redirect to the dashboard
//! - `GET /login`, `POST /login`: sign-in form and action
//! - `GET /register`, `POST /register`: registration form and action
//! - `POST /logout`: end the session
//! - `GET /dashboard`: KPI cards and charts
//! - `GET /api/dashboard`: the dashboard data as JSON
//! - `GET /healthz`: liveness check, outside the session gate

pub mod handlers;
pub mod models;
