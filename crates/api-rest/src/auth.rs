use crate::error::ApiError;
use crate::AppState;
use api_shared::auth::{
    required_header, validate_api_key, ACTOR_ID_HEADER, ACTOR_NAME_HEADER,
    ACTOR_PRIVILEGE_HEADER, API_KEY_HEADER,
};
use api_shared::AuthError;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use nwd_core::{Actor, PersonId, Privilege};

/// Rejects requests without the configured `x-api-key`.
pub(crate) async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    validate_api_key(provided, &state.api_key)?;
    Ok(next.run(request).await)
}

/// The acting person, resolved upstream and carried in the actor headers.
pub struct ActingPerson(pub Actor);

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, AuthError> {
    let value = headers
        .get(name)
        .map(|v| {
            v.to_str().map_err(|_| AuthError::InvalidHeader {
                header: name,
                message: "not valid ASCII".into(),
            })
        })
        .transpose()?;
    required_header(value, name)
}

fn invalid(header: &'static str) -> impl Fn(nwd_core::CoreError) -> AuthError {
    move |e| AuthError::InvalidHeader {
        header,
        message: e.to_string(),
    }
}

pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, AuthError> {
    let person = PersonId::parse(header(headers, ACTOR_ID_HEADER)?)
        .map_err(invalid(ACTOR_ID_HEADER))?;
    let privilege: Privilege = header(headers, ACTOR_PRIVILEGE_HEADER)?
        .parse()
        .map_err(invalid(ACTOR_PRIVILEGE_HEADER))?;
    Actor::new(person, header(headers, ACTOR_NAME_HEADER)?, privilege)
        .map_err(invalid(ACTOR_NAME_HEADER))
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ActingPerson {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(actor_from_headers(&parts.headers)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(id: &str, name: &str, privilege: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(ACTOR_ID_HEADER, HeaderValue::from_str(id).unwrap());
        h.insert(ACTOR_NAME_HEADER, HeaderValue::from_str(name).unwrap());
        h.insert(ACTOR_PRIVILEGE_HEADER, HeaderValue::from_str(privilege).unwrap());
        h
    }

    #[test]
    fn resolves_actor() {
        let actor = actor_from_headers(&headers(
            "550e8400e29b41d4a716446655440000",
            "Anke",
            "location_admin",
        ))
        .unwrap();
        assert_eq!(actor.privilege, Privilege::LocationAdmin);
        assert_eq!(actor.name.as_str(), "Anke");
    }

    #[test]
    fn rejects_unknown_privilege() {
        let err = actor_from_headers(&headers(
            "550e8400e29b41d4a716446655440000",
            "Anke",
            "admiral",
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidHeader { header: ACTOR_PRIVILEGE_HEADER, .. }
        ));
    }

    #[test]
    fn missing_header_is_named() {
        let err = actor_from_headers(&HeaderMap::new()).unwrap_err();
        assert_eq!(err, AuthError::MissingHeader(ACTOR_ID_HEADER));
    }
}
