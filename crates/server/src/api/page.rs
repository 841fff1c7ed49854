//! HTML page and redirect helpers shared by the stage handlers.

use askama::Template;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};

/// Simple report page: a title and one line per outcome.
#[derive(Template)]
#[template(path = "page.html")]
pub struct PageTemplate<'a> {
    pub title: &'a str,
    pub lines: &'a [String],
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate<'a> {
    code: u16,
    reason: &'a str,
    message: &'a str,
}

pub fn page(title: &str, lines: &[String]) -> Response {
    match (PageTemplate { title, lines }).render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(error = ?e, "Failed to render page");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
        }
    }
}

pub fn error_page(status: StatusCode, message: &str) -> Response {
    let template = ErrorTemplate {
        code: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("Error"),
        message,
    };
    match template.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!(error = ?e, "Failed to render error page");
            (status, message.to_string()).into_response()
        }
    }
}

/// `302 Found` to `location`.
pub fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}
