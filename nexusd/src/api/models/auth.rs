use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::PasswordConfig;

/// Field name to message, rendered next to the offending input
pub type FieldErrors = BTreeMap<&'static str, String>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, alias = "confirmPassword")]
    pub confirm_password: String,
}

/// Values echoed back into a re-rendered form. Passwords are never echoed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FormState {
    pub email: String,
    pub errors: FieldErrors,
    /// Form-level message, e.g. rejected credentials
    pub error: Option<String>,
}

fn validate_email(email: &str) -> Option<String> {
    let email = email.trim();
    if email.is_empty() {
        return Some("Email is required".to_string());
    }
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    (!valid).then(|| "Please enter a valid email address".to_string())
}

fn validate_password(password: &str, rules: &PasswordConfig) -> Option<String> {
    let length = password.chars().count();
    if length == 0 {
        Some("Password is required".to_string())
    } else if length < rules.min_length {
        Some(format!("Password must be at least {} characters", rules.min_length))
    } else if length > rules.max_length {
        Some(format!("Password must be no more than {} characters", rules.max_length))
    } else {
        None
    }
}

impl LoginForm {
    pub fn email(&self) -> &str {
        self.email.trim()
    }

    pub fn validate(&self, rules: &PasswordConfig) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if let Some(message) = validate_email(&self.email) {
            errors.insert("email", message);
        }
        if let Some(message) = validate_password(&self.password, rules) {
            errors.insert("password", message);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl RegisterForm {
    pub fn email(&self) -> &str {
        self.email.trim()
    }

    pub fn validate(&self, rules: &PasswordConfig) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if let Some(message) = validate_email(&self.email) {
            errors.insert("email", message);
        }
        if let Some(message) = validate_password(&self.password, rules) {
            errors.insert("password", message);
        }
        if self.password != self.confirm_password {
            errors.insert("confirm_password", "Passwords do not match".to_string());
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}
