//! Minimal page shells. The real client UI is out of scope; these exist so
//! the session middleware has page requests to run on and so redirects have
//! somewhere to land.

use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Extension;

use crate::middleware::CurrentUser;

pub async fn index_page(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Response {
    match user {
        None => Redirect::to("/login").into_response(),
        Some(user) => Html(format!(
            "<!doctype html><html><head><title>Anteroom</title></head>\
             <body><p>Signed in as {}</p></body></html>",
            user.email
        ))
        .into_response(),
    }
}

pub async fn login_page() -> Html<&'static str> {
    Html(
        "<!doctype html><html><head><title>Sign in — Anteroom</title></head>\
         <body><p>Enter the access code to continue.</p></body></html>",
    )
}

pub async fn auth_error_page() -> Html<&'static str> {
    Html(
        "<!doctype html><html><head><title>Sign-in failed — Anteroom</title></head>\
         <body><p>Sign-in failed. Start again from the login page.</p></body></html>",
    )
}
