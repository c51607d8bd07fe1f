pub mod ask;
pub mod auth;
pub mod dashboard;
pub mod health;
pub mod site;
pub mod slack;

use crate::session::{session_cookie, set_cookie};
use axum::Router;
use axum::response::{IntoResponse, Redirect, Response};

pub fn router() -> Router {
    Router::new()
        .merge(site::router())
        .merge(health::router())
        .merge(auth::router())
        .merge(dashboard::router())
        .merge(slack::router())
        .merge(ask::router())
}

pub(crate) const LOGIN_PATH: &str = "/auth/rememberizer";

pub(crate) fn login_redirect() -> Response {
    Redirect::to(LOGIN_PATH).into_response()
}

pub(crate) fn error_redirect(message: &str) -> Response {
    let encoded: String = url::form_urlencoded::byte_serialize(message.as_bytes()).collect();
    Redirect::to(&format!("/error?message={encoded}")).into_response()
}

/// Attaches the session cookie when the session was created by this request.
pub(crate) fn with_session_cookie(mut resp: Response, session_id: &str, created: bool) -> Response {
    if created {
        set_cookie(resp.headers_mut(), session_cookie(session_id));
    }
    resp
}
