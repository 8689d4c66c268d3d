use axum::{
    Form,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use minijinja::context;
use tracing::{error, info, warn};

use crate::{
    AppState,
    api::models::auth::{FormState, LoginForm, RegisterForm},
    auth::cookies::SessionCookies,
    errors::Error,
    identity::IdentityError,
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const ALREADY_REGISTERED: &str = "An account with this email already exists";
const LOGIN_FAILED: &str = "An unexpected error occurred. Please try again.";
const REGISTRATION_FAILED: &str = "Failed to create account. Please try again.";

fn render_form(state: &AppState, template: &'static str, status: StatusCode, form: &FormState) -> Result<Response, Error> {
    let html = state.views.render(
        template,
        context! {
            login_path => state.gate.policy().login_path(),
            register_path => "/register",
            email => &form.email,
            errors => &form.errors,
            error => &form.error,
        },
    )?;
    Ok((status, html).into_response())
}

/// Redirect carrying whatever session cookies the identity service issued
fn redirect_with_cookies(location: &str, cookies: &SessionCookies) -> Response {
    let mut response = Redirect::to(location).into_response();
    cookies.apply_to_response(&mut response);
    response
}

fn with_cookies(mut response: Response, cookies: &SessionCookies) -> Response {
    cookies.apply_to_response(&mut response);
    response
}

#[tracing::instrument(skip_all)]
pub async fn login_page(State(state): State<AppState>) -> Result<Response, Error> {
    render_form(&state, "login.html", StatusCode::OK, &FormState::default())
}

#[tracing::instrument(skip_all)]
pub async fn register_page(State(state): State<AppState>) -> Result<Response, Error> {
    render_form(&state, "register.html", StatusCode::OK, &FormState::default())
}

/// Sign in with email and password
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, headers: HeaderMap, Form(form): Form<LoginForm>) -> Result<Response, Error> {
    if let Err(errors) = form.validate(&state.config.forms.password) {
        let form_state = FormState {
            email: form.email().to_string(),
            errors,
            error: None,
        };
        return render_form(&state, "login.html", StatusCode::UNPROCESSABLE_ENTITY, &form_state);
    }

    let mut cookies = SessionCookies::from_headers(&headers);
    let (status, message) = match state.identity.sign_in_with_password(&mut cookies, form.email(), &form.password).await {
        Ok(user) => {
            info!(user_id = %user.id, "User signed in");
            return Ok(redirect_with_cookies(state.gate.policy().dashboard_path(), &cookies));
        }
        Err(IdentityError::InvalidCredentials) => {
            info!("Sign-in rejected");
            (StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS)
        }
        Err(e) => {
            error!(error = %e, "Sign-in failed");
            (StatusCode::SERVICE_UNAVAILABLE, LOGIN_FAILED)
        }
    };

    let form_state = FormState {
        email: form.email().to_string(),
        error: Some(message.to_string()),
        ..Default::default()
    };
    Ok(with_cookies(render_form(&state, "login.html", status, &form_state)?, &cookies))
}

/// Create an account
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, headers: HeaderMap, Form(form): Form<RegisterForm>) -> Result<Response, Error> {
    if let Err(errors) = form.validate(&state.config.forms.password) {
        let form_state = FormState {
            email: form.email().to_string(),
            errors,
            error: None,
        };
        return render_form(&state, "register.html", StatusCode::UNPROCESSABLE_ENTITY, &form_state);
    }

    let mut cookies = SessionCookies::from_headers(&headers);
    let (status, message) = match state.identity.sign_up(&mut cookies, form.email(), &form.password).await {
        Ok(outcome) => {
            if outcome.session_established {
                info!(user_id = %outcome.user.id, "User registered");
            } else {
                info!(user_id = %outcome.user.id, "User registered, awaiting email confirmation");
            }
            return Ok(redirect_with_cookies(state.gate.policy().dashboard_path(), &cookies));
        }
        Err(IdentityError::AlreadyRegistered) => {
            info!("Registration rejected for existing account");
            (StatusCode::CONFLICT, ALREADY_REGISTERED)
        }
        Err(e) => {
            error!(error = %e, "Registration failed");
            (StatusCode::SERVICE_UNAVAILABLE, REGISTRATION_FAILED)
        }
    };

    let form_state = FormState {
        email: form.email().to_string(),
        error: Some(message.to_string()),
        ..Default::default()
    };
    Ok(with_cookies(render_form(&state, "register.html", status, &form_state)?, &cookies))
}

/// End the session. Always lands on the login page.
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let mut cookies = SessionCookies::from_headers(&headers);
    if let Err(e) = state.identity.sign_out(&mut cookies).await {
        warn!(error = %e, "Sign-out failed, clearing local session anyway");
    }
    redirect_with_cookies(state.gate.policy().login_path(), &cookies)
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{MOCK_SESSION_COOKIE, MockIdentityProvider, create_test_app, test_user};
    use axum::http::{StatusCode, header};
    use std::sync::atomic::Ordering;

    fn set_cookies(response: &axum_test::TestResponse) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_login_success_redirects_with_session() {
        let provider = MockIdentityProvider::new().with_account("ada@example.com", "correct-horse", test_user());
        let server = create_test_app(provider);

        let response = server
            .post("/login")
            .form(&[("email", "ada@example.com"), ("password", "correct-horse")])
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/dashboard");
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].starts_with(&format!("{MOCK_SESSION_COOKIE}=")));

        // The issued session opens the dashboard
        let session = cookies[0].split(';').next().unwrap().to_string();
        let response = server.get("/dashboard").add_header(header::COOKIE, session).await;
        response.assert_status_ok();
        assert!(response.text().contains("ada@example.com"));
    }

    #[tokio::test]
    async fn test_login_validation_errors_rerender_form() {
        let provider = MockIdentityProvider::new();
        let calls = provider.call_counter();
        let server = create_test_app(provider);

        let response = server.post("/login").form(&[("email", "not-an-email"), ("password", "short")]).await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let body = response.text();
        assert!(body.contains("Please enter a valid email address"));
        assert!(body.contains("Password must be at least 8 characters"));
        assert!(body.contains("value=\"not-an-email\""));
        assert!(response.headers().get(header::LOCATION).is_none());
        // Only the gate consulted the identity service
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_login_invalid_credentials() {
        let provider = MockIdentityProvider::new().with_account("ada@example.com", "correct-horse", test_user());
        let server = create_test_app(provider);

        let response = server
            .post("/login")
            .form(&[("email", "ada@example.com"), ("password", "wrong-password")])
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        assert!(response.text().contains("Invalid email or password"));
        assert!(set_cookies(&response).is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_login_identity_outage() {
        let provider = MockIdentityProvider::new().failing();
        let server = create_test_app(provider);

        let response = server
            .post("/login")
            .form(&[("email", "ada@example.com"), ("password", "correct-horse")])
            .await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.text().contains("An unexpected error occurred. Please try again."));
    }

    #[tokio::test]
    async fn test_signed_in_user_posting_login_is_redirected() {
        let provider = MockIdentityProvider::new().with_session("valid-token", test_user());
        let server = create_test_app(provider);

        let response = server
            .post("/login")
            .add_header(header::COOKIE, format!("{MOCK_SESSION_COOKIE}=valid-token"))
            .form(&[("email", "ada@example.com"), ("password", "correct-horse")])
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/dashboard");
    }

    #[tokio::test]
    async fn test_register_success() {
        let server = create_test_app(MockIdentityProvider::new());

        let response = server
            .post("/register")
            .form(&[
                ("email", "grace@example.com"),
                ("password", "correct-horse"),
                ("confirm_password", "correct-horse"),
            ])
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/dashboard");
        assert_eq!(set_cookies(&response).len(), 1);
    }

    #[tokio::test]
    async fn test_register_pending_confirmation_sets_no_session() {
        let server = create_test_app(MockIdentityProvider::new().requiring_confirmation());

        let response = server
            .post("/register")
            .form(&[
                ("email", "grace@example.com"),
                ("password", "correct-horse"),
                ("confirm_password", "correct-horse"),
            ])
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert!(set_cookies(&response).is_empty());
    }

    #[tokio::test]
    async fn test_register_existing_account() {
        let provider = MockIdentityProvider::new().with_account("ada@example.com", "correct-horse", test_user());
        let server = create_test_app(provider);

        let response = server
            .post("/register")
            .form(&[
                ("email", "ada@example.com"),
                ("password", "another-horse"),
                ("confirm_password", "another-horse"),
            ])
            .await;

        response.assert_status(StatusCode::CONFLICT);
        assert!(response.text().contains("An account with this email already exists"));
    }

    #[tokio::test]
    async fn test_register_password_mismatch() {
        let server = create_test_app(MockIdentityProvider::new());

        let response = server
            .post("/register")
            .form(&[
                ("email", "grace@example.com"),
                ("password", "correct-horse"),
                ("confirm_password", "correct-horse!"),
            ])
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert!(response.text().contains("Passwords do not match"));
    }

    #[test_log::test(tokio::test)]
    async fn test_register_identity_outage() {
        let server = create_test_app(MockIdentityProvider::new().failing());

        let response = server
            .post("/register")
            .form(&[
                ("email", "grace@example.com"),
                ("password", "correct-horse"),
                ("confirm_password", "correct-horse"),
            ])
            .await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.text().contains("Failed to create account. Please try again."));
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let provider = MockIdentityProvider::new().with_session("valid-token", test_user());
        let server = create_test_app(provider);

        let response = server
            .post("/logout")
            .add_header(header::COOKIE, format!("{MOCK_SESSION_COOKIE}=valid-token"))
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/login");
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].contains("Max-Age=0"));

        // The revoked session no longer opens the dashboard
        let response = server
            .get("/dashboard")
            .add_header(header::COOKIE, format!("{MOCK_SESSION_COOKIE}=valid-token"))
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
    }

    #[test_log::test(tokio::test)]
    async fn test_logout_redirects_even_when_sign_out_fails() {
        let provider = MockIdentityProvider::new()
            .with_session("valid-token", test_user())
            .failing_sign_out();
        let server = create_test_app(provider);

        let response = server
            .post("/logout")
            .add_header(header::COOKIE, format!("{MOCK_SESSION_COOKIE}=valid-token"))
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/login");
        assert!(set_cookies(&response)[0].contains("Max-Age=0"));
    }
}
