use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use minijinja::context;

use crate::{AppState, errors::Error};

/// `/` has no content of its own
pub async fn home(State(state): State<AppState>) -> Redirect {
    Redirect::to(state.gate.policy().dashboard_path())
}

pub async fn healthz() -> &'static str {
    "OK"
}

pub async fn not_found(State(state): State<AppState>) -> Result<Response, Error> {
    let html = state.views.render(
        "not_found.html",
        context! { home_path => state.gate.policy().dashboard_path() },
    )?;
    Ok((StatusCode::NOT_FOUND, html).into_response())
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{MOCK_SESSION_COOKIE, MockIdentityProvider, create_test_app, test_user};
    use axum::http::{StatusCode, header};

    #[tokio::test]
    async fn test_home_redirects_to_dashboard() {
        let server = create_test_app(MockIdentityProvider::new().with_session("valid-token", test_user()));

        let response = server
            .get("/")
            .add_header(header::COOKIE, format!("{MOCK_SESSION_COOKIE}=valid-token"))
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/dashboard");
    }

    #[tokio::test]
    async fn test_unknown_page_for_signed_in_user() {
        let server = create_test_app(MockIdentityProvider::new().with_session("valid-token", test_user()));

        let response = server
            .get("/dashboard/does-not-exist")
            .add_header(header::COOKIE, format!("{MOCK_SESSION_COOKIE}=valid-token"))
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
        assert!(response.text().contains("404"));
    }

    #[tokio::test]
    async fn test_healthz() {
        let server = create_test_app(MockIdentityProvider::new().failing());

        let response = server.get("/healthz").await;

        response.assert_status_ok();
        response.assert_text("OK");
    }
}
