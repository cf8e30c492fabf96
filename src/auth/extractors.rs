use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tracing::warn;
use uuid::Uuid;

use crate::auth::tokens::SessionKeys;

/// Name of the cookie the browser client carries the session token in.
pub const SESSION_COOKIE: &str = "sid";

/// Resolved caller identity, handed to handlers as an explicit parameter.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
}

/// Strict gate: rejects the request when no valid session credential is
/// presented, pointing the caller back at the login entry point.
pub struct AuthUser(pub Identity);

/// Optional gate: same extraction, but failures become `None` and the
/// request always continues. For routes that render differently for
/// anonymous callers.
pub struct MaybeUser(pub Option<Identity>);

/// Rejection that tells the caller to authenticate first.
pub struct LoginRedirect;

impl IntoResponse for LoginRedirect {
    fn into_response(self) -> Response {
        Redirect::temporary("/login").into_response()
    }
}

fn cookie_value<'a>(header_value: &'a str, name: &str) -> Option<&'a str> {
    header_value
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

/// Pulls the bearer credential off the transport: the session cookie first,
/// falling back to an `Authorization: Bearer` header for non-browser callers.
fn credential(parts: &Parts) -> Option<String> {
    if let Some(cookies) = parts
        .headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = cookie_value(cookies, SESSION_COOKIE) {
            return Some(token.to_string());
        }
    }
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

fn resolve<S>(parts: &Parts, state: &S) -> Option<Identity>
where
    SessionKeys: FromRef<S>,
{
    let token = credential(parts)?;
    let keys = SessionKeys::from_ref(state);
    match keys.verify(&token) {
        Ok(claims) => Some(Identity {
            id: claims.sub,
            email: claims.email,
        }),
        Err(e) => {
            warn!(error = %e, "session token rejected");
            None
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = LoginRedirect;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        resolve(parts, state).map(AuthUser).ok_or(LoginRedirect)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(resolve(parts, state)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use axum::http::Request;

    fn parts_with_headers(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/me");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        parts
    }

    fn signed_token(state: &AppState, email: &str) -> (Uuid, String) {
        let id = Uuid::new_v4();
        let keys = SessionKeys::from_ref(state);
        (id, keys.sign(id, email).expect("sign"))
    }

    #[test]
    fn cookie_value_picks_the_right_pair() {
        let header_value = "theme=dark; sid=abc.def.ghi; lang=en";
        assert_eq!(cookie_value(header_value, "sid"), Some("abc.def.ghi"));
        assert_eq!(cookie_value(header_value, "uid"), None);
    }

    #[tokio::test]
    async fn strict_gate_rejects_without_credential() {
        let state = AppState::fake();
        let mut parts = parts_with_headers(&[]);
        let res = AuthUser::from_request_parts(&mut parts, &state).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn strict_gate_accepts_session_cookie() {
        let state = AppState::fake();
        let (id, token) = signed_token(&state, "a@x.com");
        let mut parts = parts_with_headers(&[("cookie", &format!("sid={token}"))]);
        let AuthUser(identity) = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .ok()
            .expect("valid cookie passes");
        assert_eq!(identity.id, id);
        assert_eq!(identity.email, "a@x.com");
    }

    #[tokio::test]
    async fn strict_gate_accepts_bearer_fallback() {
        let state = AppState::fake();
        let (id, token) = signed_token(&state, "a@x.com");
        let mut parts = parts_with_headers(&[("authorization", &format!("Bearer {token}"))]);
        let AuthUser(identity) = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .ok()
            .expect("bearer header passes");
        assert_eq!(identity.id, id);
    }

    #[tokio::test]
    async fn strict_gate_rejects_tampered_token() {
        let state = AppState::fake();
        let (_, token) = signed_token(&state, "a@x.com");
        let last = token.chars().last().unwrap();
        let flipped = if last == 'A' { 'B' } else { 'A' };
        let forged = format!("{}{}", &token[..token.len() - 1], flipped);
        let mut parts = parts_with_headers(&[("cookie", &format!("sid={forged}"))]);
        assert!(AuthUser::from_request_parts(&mut parts, &state)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn optional_gate_passes_anonymous_through() {
        let state = AppState::fake();
        let mut parts = parts_with_headers(&[]);
        let MaybeUser(identity) = MaybeUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert!(identity.is_none());
    }

    #[tokio::test]
    async fn optional_gate_resolves_valid_credential() {
        let state = AppState::fake();
        let (id, token) = signed_token(&state, "a@x.com");
        let mut parts = parts_with_headers(&[("cookie", &format!("sid={token}"))]);
        let MaybeUser(identity) = MaybeUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(identity.expect("resolved").id, id);
    }

    #[tokio::test]
    async fn optional_gate_swallows_bad_credential() {
        let state = AppState::fake();
        let mut parts = parts_with_headers(&[("cookie", "sid=junk")]);
        let MaybeUser(identity) = MaybeUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert!(identity.is_none());
    }
}
