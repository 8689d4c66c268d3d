use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use std::convert::Infallible;

use crate::{errors::Error, identity::IdentityUser};

/// The signed-in user, resolved by the session gate and stored in the request extensions.
///
/// Use `Option<CurrentUser>` in handlers that also serve anonymous callers (or that must keep
/// working while the identity service is unreachable and the gate fails open).
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser(pub IdentityUser);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(Error::Unauthenticated { message: None })
    }
}

impl<S> OptionalFromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<CurrentUser>().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_user;
    use axum::http::Request;

    #[tokio::test]
    async fn test_extracts_user_from_extensions() {
        let mut request = Request::builder().uri("/dashboard").body(()).unwrap();
        request.extensions_mut().insert(CurrentUser(test_user()));
        let (mut parts, _) = request.into_parts();

        let user = <CurrentUser as FromRequestParts<()>>::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(user.0, test_user());
    }

    #[tokio::test]
    async fn test_missing_user() {
        let (mut parts, _) = Request::builder().uri("/dashboard").body(()).unwrap().into_parts();

        let err = <CurrentUser as FromRequestParts<()>>::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated { .. }));

        let optional = <CurrentUser as OptionalFromRequestParts<()>>::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(optional.is_none());
    }
}
