use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{debug, trace};

use crate::{
    AppState,
    auth::{
        cookies::SessionCookies,
        current_user::CurrentUser,
        gate::{AccessDecision, IdentityState},
    },
};

/// Session gate applied around the whole router, ahead of path matching.
///
/// Every response leaving this middleware carries the cookie mutations the identity service made
/// while resolving the caller, whichever decision was taken, including when the identity service
/// failed partway and the gate fails open. A request nothing was recorded for is forwarded
/// exactly as it arrived.
pub async fn session_gate_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();

    if state.gate.policy().bypasses(&path) {
        trace!(path = %path, "Bypassing session gate");
        return next.run(request).await;
    }

    let cookies = SessionCookies::from_headers(request.headers());
    let outcome = state.gate.evaluate(&path, cookies).await;

    if let Some(target) = outcome.decision.redirect_target(state.gate.policy()) {
        let location = match request.uri().query() {
            Some(query) => format!("{target}?{query}"),
            None => target.to_string(),
        };
        debug!(path = %path, location = %location, "Redirecting");
        let mut response = Redirect::to(&location).into_response();
        outcome.cookies.apply_to_response(&mut response);
        return response;
    }

    debug_assert_eq!(outcome.decision, AccessDecision::Allow);
    outcome.cookies.forward_to_request(request.headers_mut());
    if let IdentityState::Authenticated(user) = outcome.identity {
        request.extensions_mut().insert(CurrentUser(user));
    }

    let mut response = next.run(request).await;
    outcome.cookies.apply_to_response(&mut response);
    response
}
