//! Server-rendered pages.
//!
//! Templates live in `nexusd/templates/` and are compiled into the binary, so the server has no
//! runtime file dependencies.

use axum::response::Html;
use minijinja::Environment;
use serde::Serialize;

use crate::errors::Error;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("register.html", include_str!("../templates/register.html")),
    ("dashboard.html", include_str!("../templates/dashboard.html")),
    ("not_found.html", include_str!("../templates/not_found.html")),
];

#[derive(Debug)]
pub struct Views {
    env: Environment<'static>,
}

impl Views {
    pub fn new() -> Result<Self, Error> {
        let mut env = Environment::new();
        for &(name, source) in TEMPLATES {
            env.add_template(name, source).map_err(|e| Error::Template { template: name, source: e })?;
        }
        Ok(Self { env })
    }

    pub fn render<C: Serialize>(&self, template: &'static str, context: C) -> Result<Html<String>, Error> {
        self.env
            .get_template(template)
            .and_then(|t| t.render(context))
            .map(Html)
            .map_err(|source| Error::Template { template, source })
    }
}
