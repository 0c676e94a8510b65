use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{
        accounts::AccountError, feed::FeedError, follows::FollowError, groups::GroupError,
        posts::PostError, repos::RepoError,
    },
    infra::error::InfraError,
};

/// Diagnostic attached to failed responses and emitted by the response logger.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

fn internal(source: &'static str, error: &dyn StdError) -> HttpError {
    HttpError::from_error(
        source,
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error",
        error,
    )
}

fn repo_unavailable(source: &'static str, error: &RepoError) -> HttpError {
    match error {
        RepoError::Timeout => HttpError::from_error(
            source,
            StatusCode::SERVICE_UNAVAILABLE,
            "Service temporarily unavailable",
            error,
        ),
        other => internal(source, other),
    }
}

// Missing-entity variants are rendered as the not-found page by the handlers;
// the conversions below cover whatever reaches them unhandled.
impl From<FeedError> for HttpError {
    fn from(error: FeedError) -> Self {
        const SOURCE: &str = "application::error::feed_error_to_http_error";
        match error {
            FeedError::Repo(err) => repo_unavailable(SOURCE, &err),
            other => HttpError::from_error(
                SOURCE,
                StatusCode::NOT_FOUND,
                "Resource not found",
                &other,
            ),
        }
    }
}

impl From<PostError> for HttpError {
    fn from(error: PostError) -> Self {
        const SOURCE: &str = "application::error::post_error_to_http_error";
        match error {
            PostError::NotFound => HttpError::from_error(
                SOURCE,
                StatusCode::NOT_FOUND,
                "Resource not found",
                &error,
            ),
            PostError::NotAuthor => HttpError::from_error(
                SOURCE,
                StatusCode::FORBIDDEN,
                "You cannot edit this post",
                &error,
            ),
            PostError::Invalid(_) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Request could not be processed",
                &error,
            ),
            PostError::Media(ref err) => internal(SOURCE, err),
            PostError::Repo(ref err) => repo_unavailable(SOURCE, err),
        }
    }
}

impl From<FollowError> for HttpError {
    fn from(error: FollowError) -> Self {
        const SOURCE: &str = "application::error::follow_error_to_http_error";
        match error {
            FollowError::UnknownAuthor => HttpError::from_error(
                SOURCE,
                StatusCode::NOT_FOUND,
                "Resource not found",
                &error,
            ),
            FollowError::Repo(ref err) => repo_unavailable(SOURCE, err),
        }
    }
}

impl From<AccountError> for HttpError {
    fn from(error: AccountError) -> Self {
        const SOURCE: &str = "application::error::account_error_to_http_error";
        match error {
            AccountError::Invalid(_) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Request could not be processed",
                &error,
            ),
            AccountError::UnknownUser => HttpError::from_error(
                SOURCE,
                StatusCode::NOT_FOUND,
                "Resource not found",
                &error,
            ),
            AccountError::PasswordHash(_) => internal(SOURCE, &error),
            AccountError::Repo(ref err) => repo_unavailable(SOURCE, err),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Group(#[from] GroupError),
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
