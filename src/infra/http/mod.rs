mod admin;
mod auth;
mod follows;
mod middleware;
mod posts;
mod public;

pub use admin::{AdminState, build_admin_router};
pub use auth::{CurrentUser, MaybeUser};
pub use public::{HttpState, build_router};

use crate::application::error::ErrorReport;
use crate::application::repos::RepoError;
use axum::http::{HeaderValue, StatusCode, header::LOCATION};
use axum::response::{IntoResponse, Response};

fn db_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// `302 Found` to a local path.
pub(crate) fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(LOCATION, value)]).into_response(),
        Err(_) => (StatusCode::FOUND, [(LOCATION, HeaderValue::from_static("/"))]).into_response(),
    }
}
