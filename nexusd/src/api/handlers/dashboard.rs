use axum::{Json, extract::State, response::Html};
use minijinja::context;

use crate::{
    AppState,
    api::models::dashboard::{DashboardResponse, DashboardSummary, UserBadge},
    auth::current_user::CurrentUser,
    errors::Error,
};

/// Dashboard page. The user is absent only while the gate is failing open.
#[tracing::instrument(skip_all)]
pub async fn dashboard_page(State(state): State<AppState>, user: Option<CurrentUser>) -> Result<Html<String>, Error> {
    let summary = DashboardSummary::sample();
    let badge = UserBadge::new(user.as_ref().map(|CurrentUser(u)| u));

    state.views.render(
        "dashboard.html",
        context! {
            user => badge,
            peaks => summary.peaks(),
            summary => summary,
            logout_path => "/logout",
        },
    )
}

/// Dashboard data as JSON. Unlike the page, it answers 401 while the gate is failing open.
#[tracing::instrument(skip_all)]
pub async fn summary(CurrentUser(user): CurrentUser) -> Json<DashboardResponse> {
    Json(DashboardResponse {
        user: UserBadge::new(Some(&user)),
        summary: DashboardSummary::sample(),
    })
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{MOCK_SESSION_COOKIE, MockIdentityProvider, create_test_app, test_user};
    use axum::http::header;

    #[tokio::test]
    async fn test_dashboard_renders_kpis_and_user() {
        let server = create_test_app(MockIdentityProvider::new().with_session("valid-token", test_user()));

        let response = server
            .get("/dashboard")
            .add_header(header::COOKIE, format!("{MOCK_SESSION_COOKIE}=valid-token"))
            .await;

        response.assert_status_ok();
        let body = response.text();
        for expected in ["Total Revenue", "$45,231.89", "Active Users", "2,350", "Sales", "12,234", "Active Now", "573"] {
            assert!(body.contains(expected), "missing {expected}");
        }
        assert!(body.contains(">A</span>"));
        assert!(body.contains("ada@example.com"));
        assert!(body.contains("Jul"));
    }

    #[test_log::test(tokio::test)]
    async fn test_dashboard_without_user_while_failing_open() {
        let server = create_test_app(MockIdentityProvider::new().failing());

        let response = server.get("/dashboard").await;

        response.assert_status_ok();
        assert!(response.text().contains(">User</span>"));
    }

    #[tokio::test]
    async fn test_summary_json() {
        let server = create_test_app(MockIdentityProvider::new().with_session("valid-token", test_user()));

        let response = server
            .get("/api/dashboard")
            .add_header(header::COOKIE, format!("{MOCK_SESSION_COOKIE}=valid-token"))
            .await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["user"]["name"], "ada");
        assert_eq!(body["kpis"][0]["title"], "Total Revenue");
        assert_eq!(body["kpis"][1]["change"], 180.1);
        assert_eq!(body["revenue"][2]["users"], 9800);
        assert_eq!(body["overview"][6]["profit"], 3190);
    }

    #[tokio::test]
    async fn test_summary_requires_session() {
        let server = create_test_app(MockIdentityProvider::new());

        let response = server.get("/api/dashboard").await;

        response.assert_status(axum::http::StatusCode::SEE_OTHER);
    }

    #[test_log::test(tokio::test)]
    async fn test_summary_while_failing_open_is_unauthorized() {
        let server = create_test_app(MockIdentityProvider::new().failing());

        let response = server
            .get("/api/dashboard")
            .add_header(header::COOKIE, format!("{MOCK_SESSION_COOKIE}=valid-token"))
            .await;

        response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
        response.assert_text("Authentication required");
    }
}
