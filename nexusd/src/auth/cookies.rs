//! Request/response cookie carrier.
//!
//! [`SessionCookies`] is the jar the session gate and the identity provider share for the
//! duration of one request. It holds the cookies the browser sent plus every `Set-Cookie`
//! mutation made while handling the request, in order. Mutations are relayed verbatim (name,
//! value and every attribute) onto whatever response ends up being returned, redirect or not.

use axum::{
    http::{HeaderMap, HeaderValue, header},
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::{trace, warn};

#[derive(Debug, Clone, Default)]
pub struct SessionCookies {
    jar: CookieJar,
    mutations: Vec<Cookie<'static>>,
}

impl SessionCookies {
    /// Read every cookie from the request's `Cookie` headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            jar: CookieJar::from_headers(headers),
            mutations: Vec::new(),
        }
    }

    /// Current value of a cookie, reflecting mutations made so far.
    pub fn get(&self, name: &str) -> Option<&Cookie<'static>> {
        self.jar.get(name)
    }

    /// Set a cookie. A later mutation of the same cookie replaces an earlier one.
    pub fn set(&mut self, cookie: Cookie<'static>) {
        self.jar = std::mem::take(&mut self.jar).add(cookie.clone());
        self.record(cookie);
    }

    /// Remove a cookie. `removal` is the expired cookie sent to the browser and must carry the
    /// same name and path as the cookie it removes.
    pub fn remove(&mut self, removal: Cookie<'static>) {
        self.jar = std::mem::take(&mut self.jar).remove(Cookie::from(removal.name().to_owned()));
        self.record(removal);
    }

    fn record(&mut self, cookie: Cookie<'static>) {
        self.mutations.retain(|existing| existing.name() != cookie.name());
        self.mutations.push(cookie);
    }

    /// Pending `Set-Cookie` mutations, in the order they were made.
    pub fn mutations(&self) -> &[Cookie<'static>] {
        &self.mutations
    }

    pub fn has_mutations(&self) -> bool {
        !self.mutations.is_empty()
    }

    /// Append every mutation to `headers` as its own `Set-Cookie` header. A cookie the response
    /// already sets for the same name and path is left to the response, which was produced later.
    pub fn apply_to_headers(&self, headers: &mut HeaderMap) {
        let already_set: Vec<(String, Option<String>)> = headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| Cookie::parse(value).ok())
            .map(|cookie| (cookie.name().to_owned(), cookie.path().map(str::to_owned)))
            .collect();

        for cookie in &self.mutations {
            if already_set
                .iter()
                .any(|(name, path)| name == cookie.name() && path.as_deref() == cookie.path())
            {
                trace!(name = cookie.name(), "Response already sets cookie");
                continue;
            }
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(e) => warn!(name = cookie.name(), error = %e, "Dropping cookie that is not a valid header value"),
            }
        }
    }

    pub fn apply_to_response(&self, response: &mut Response) {
        self.apply_to_headers(response.headers_mut());
    }

    /// Rewrite the request's `Cookie` header so handlers downstream see rotated values. Cookies
    /// nobody mutated are forwarded as the raw pairs the browser sent; mutated ones carry the
    /// value exactly as it goes out in `Set-Cookie`, and removed ones are dropped. Leaves the
    /// header untouched when nothing changed.
    pub fn forward_to_request(&self, headers: &mut HeaderMap) {
        if self.mutations.is_empty() {
            return;
        }

        let mut pairs: Vec<String> = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .filter(|pair| {
                let name = pair.split_once('=').map_or(*pair, |(name, _)| name).trim();
                !self.mutations.iter().any(|cookie| cookie.name() == name)
            })
            .map(str::to_owned)
            .collect();

        pairs.extend(
            self.mutations
                .iter()
                .filter(|cookie| self.jar.get(cookie.name()).is_some())
                .map(|cookie| format!("{}={}", cookie.name(), cookie.value())),
        );

        headers.remove(header::COOKIE);
        if pairs.is_empty() {
            return;
        }
        match HeaderValue::from_str(&pairs.join("; ")) {
            Ok(value) => {
                trace!("Forwarding rotated cookies to handler");
                headers.insert(header::COOKIE, value);
            }
            Err(e) => warn!(error = %e, "Could not rebuild Cookie header"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    fn set_cookie_values(headers: &HeaderMap) -> Vec<String> {
        headers
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_reads_request_cookies() {
        let cookies = SessionCookies::from_headers(&request_headers("session=abc; theme=dark"));

        assert_eq!(cookies.get("session").map(|c| c.value()), Some("abc"));
        assert_eq!(cookies.get("theme").map(|c| c.value()), Some("dark"));
        assert!(cookies.get("missing").is_none());
        assert!(!cookies.has_mutations());
    }

    #[test]
    fn test_set_replaces_value_and_records_mutation() {
        let mut cookies = SessionCookies::from_headers(&request_headers("session=old"));

        cookies.set(Cookie::parse("session=new; Path=/; HttpOnly; Max-Age=60").unwrap());

        assert_eq!(cookies.get("session").map(|c| c.value()), Some("new"));
        assert_eq!(cookies.mutations().len(), 1);
    }

    #[test]
    fn test_later_mutation_of_same_cookie_wins() {
        let mut cookies = SessionCookies::default();

        cookies.set(Cookie::parse("session=first; Path=/").unwrap());
        cookies.set(Cookie::parse("other=x; Path=/").unwrap());
        cookies.remove(Cookie::parse("session=; Path=/; Max-Age=0").unwrap());

        let names: Vec<_> = cookies.mutations().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["other", "session"]);
        assert!(cookies.get("session").is_none());
    }

    #[test]
    fn test_mutations_are_applied_verbatim() {
        let mut cookies = SessionCookies::default();
        cookies.set(Cookie::parse("session=abc; Path=/; HttpOnly; SameSite=Lax; Secure; Max-Age=3600").unwrap());
        cookies.remove(Cookie::parse("legacy=; Path=/; Max-Age=0").unwrap());

        let mut headers = HeaderMap::new();
        headers.insert(header::SET_COOKIE, HeaderValue::from_static("existing=1"));
        cookies.apply_to_headers(&mut headers);

        let values = set_cookie_values(&headers);
        assert_eq!(values.len(), 3);
        assert_eq!(values[0], "existing=1");
        assert!(values[1].starts_with("session=abc"));
        for attribute in ["Path=/", "HttpOnly", "SameSite=Lax", "Secure", "Max-Age=3600"] {
            assert!(values[1].contains(attribute), "missing {attribute} in {}", values[1]);
        }
        assert!(values[2].starts_with("legacy="));
        assert!(values[2].contains("Max-Age=0"));
    }

    #[test]
    fn test_response_cookie_takes_precedence() {
        let mut cookies = SessionCookies::default();
        cookies.set(Cookie::parse("session=rotated; Path=/").unwrap());
        cookies.set(Cookie::parse("theme=dark; Path=/").unwrap());

        let mut headers = HeaderMap::new();
        headers.insert(header::SET_COOKIE, HeaderValue::from_static("session=; Path=/; Max-Age=0"));
        cookies.apply_to_headers(&mut headers);

        let values = set_cookie_values(&headers);
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], "session=; Path=/; Max-Age=0");
        assert!(values[1].starts_with("theme=dark"));
    }

    #[test]
    fn test_forward_to_request_rewrites_cookie_header() {
        let mut cookies = SessionCookies::from_headers(&request_headers("session=old; theme=dark"));
        cookies.set(Cookie::parse("session=new; Path=/; HttpOnly").unwrap());

        let mut headers = request_headers("session=old; theme=dark");
        cookies.forward_to_request(&mut headers);

        let forwarded = SessionCookies::from_headers(&headers);
        assert_eq!(forwarded.get("session").map(|c| c.value()), Some("new"));
        assert_eq!(forwarded.get("theme").map(|c| c.value()), Some("dark"));
        // Attributes belong to Set-Cookie only
        assert!(!headers.get(header::COOKIE).unwrap().to_str().unwrap().contains("HttpOnly"));
    }

    #[test]
    fn test_same_name_on_another_path_does_not_suppress_mutation() {
        let mut cookies = SessionCookies::default();
        cookies.set(Cookie::parse("session=rotated; Path=/").unwrap());

        let mut headers = HeaderMap::new();
        headers.insert(header::SET_COOKIE, HeaderValue::from_static("session=; Path=/admin; Max-Age=0"));
        cookies.apply_to_headers(&mut headers);

        let values = set_cookie_values(&headers);
        assert_eq!(values.len(), 2);
        assert!(values[1].starts_with("session=rotated"));
    }

    #[test]
    fn test_forward_keeps_foreign_cookies_encoded() {
        let raw = "theme=dark%3B%20admin%3Dtrue; session=old";
        let mut cookies = SessionCookies::from_headers(&request_headers(raw));
        cookies.set(Cookie::parse("session=new; Path=/").unwrap());

        let mut headers = request_headers(raw);
        cookies.forward_to_request(&mut headers);

        assert_eq!(headers.get(header::COOKIE).unwrap(), "theme=dark%3B%20admin%3Dtrue; session=new");
        let forwarded = SessionCookies::from_headers(&headers);
        assert!(forwarded.get("admin").is_none());
        assert_eq!(forwarded.get("theme").map(|c| c.value()), Some("dark; admin=true"));
        assert_eq!(forwarded.get("session").map(|c| c.value()), Some("new"));
    }

    #[test]
    fn test_forward_to_request_drops_removed_cookie() {
        let mut cookies = SessionCookies::from_headers(&request_headers("session=old"));
        cookies.remove(Cookie::parse("session=; Path=/; Max-Age=0").unwrap());

        let mut headers = request_headers("session=old");
        cookies.forward_to_request(&mut headers);

        assert!(headers.get(header::COOKIE).is_none());
    }

    #[test]
    fn test_forward_without_mutations_is_noop() {
        let cookies = SessionCookies::from_headers(&request_headers("session=abc"));
        let mut headers = request_headers("session=abc");

        cookies.forward_to_request(&mut headers);

        assert_eq!(headers.get(header::COOKIE).unwrap(), "session=abc");
    }
}
