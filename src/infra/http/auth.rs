//! Session extractors and the account pages under `/auth/`.

use axum::{
    Form,
    extract::{FromRequestParts, Query, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;

use crate::application::accounts::{AccountError, LoginForm, PasswordChangeForm, SignupForm};
use crate::application::error::HttpError;
use crate::domain::entities::UserRecord;
use crate::presentation::views::{
    LayoutChrome, LayoutContext, LoggedOutTemplate, LoginTemplate, LoginView,
    PasswordChangeDoneTemplate, PasswordChangeTemplate, PasswordChangeView, SignupTemplate,
    SignupView, render_template_response,
};

use super::{HttpState, found};

pub(super) const LOGIN_PATH: &str = "/auth/login/";
const PASSWORD_CHANGE_DONE_PATH: &str = "/auth/password_change/done/";

/// The signed-in user, if the session cookie resolves to one.
pub struct MaybeUser(pub Option<UserRecord>);

impl FromRequestParts<HttpState> for MaybeUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HttpState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(cookie) = jar.get(&state.session_cookie) else {
            return Ok(Self(None));
        };

        state
            .accounts
            .resolve_session(cookie.value())
            .await
            .map(Self)
            .map_err(|err| HttpError::from(err).into_response())
    }
}

/// A signed-in user; anonymous requests are redirected to the login page.
pub struct CurrentUser(pub UserRecord);

impl FromRequestParts<HttpState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HttpState,
    ) -> Result<Self, Self::Rejection> {
        let MaybeUser(user) = MaybeUser::from_request_parts(parts, state).await?;
        match user {
            Some(user) => Ok(Self(user)),
            None => {
                let original = parts
                    .uri
                    .path_and_query()
                    .map(|value| value.as_str())
                    .unwrap_or_else(|| parts.uri.path());
                Err(login_redirect(original))
            }
        }
    }
}

/// `302` to the login page carrying the original path in `next`.
///
/// Slashes stay literal; everything else reserved is percent-encoded.
pub(super) fn login_redirect(original: &str) -> Response {
    let next: String = url::form_urlencoded::byte_serialize(original.as_bytes()).collect();
    let next = next.replace("%2F", "/");
    found(&format!("{LOGIN_PATH}?next={next}"))
}

/// Only same-site absolute paths are followed after login.
fn safe_next(next: Option<&str>) -> Option<&str> {
    next.map(str::trim).filter(|next| {
        next.starts_with('/') && !next.starts_with("//") && !next.contains('\\')
    })
}

fn session_cookie(state: &HttpState, token: String) -> Cookie<'static> {
    let max_age = time::Duration::try_from(state.accounts.session_ttl())
        .unwrap_or(time::Duration::days(14));
    Cookie::build((state.session_cookie.clone(), token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

fn removal_cookie(state: &HttpState) -> Cookie<'static> {
    Cookie::build((state.session_cookie.clone(), "")).path("/").build()
}

pub(super) async fn signup_page(MaybeUser(viewer): MaybeUser) -> Response {
    let chrome = LayoutChrome::new(viewer.as_ref(), "/auth/signup/");
    let view = LayoutContext::new(chrome, "Sign up", SignupView::default());
    render_template_response(SignupTemplate { view }, StatusCode::OK)
}

pub(super) async fn signup_submit(
    State(state): State<HttpState>,
    MaybeUser(viewer): MaybeUser,
    Form(form): Form<SignupForm>,
) -> Response {
    match state.accounts.signup(&form).await {
        Ok(_) => found("/"),
        Err(AccountError::Invalid(errors)) => {
            let chrome = LayoutChrome::new(viewer.as_ref(), "/auth/signup/");
            let content = SignupView {
                first_name: form.first_name,
                last_name: form.last_name,
                username: form.username,
                email: form.email,
                errors,
            };
            let view = LayoutContext::new(chrome, "Sign up", content);
            render_template_response(SignupTemplate { view }, StatusCode::OK)
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct NextQuery {
    next: Option<String>,
}

pub(super) async fn login_page(
    MaybeUser(viewer): MaybeUser,
    Query(query): Query<NextQuery>,
) -> Response {
    let chrome = LayoutChrome::new(viewer.as_ref(), LOGIN_PATH);
    let content = LoginView {
        next: query.next.unwrap_or_default(),
        ..LoginView::default()
    };
    let view = LayoutContext::new(chrome, "Log in", content);
    render_template_response(LoginTemplate { view }, StatusCode::OK)
}

pub(super) async fn login_submit(
    State(state): State<HttpState>,
    jar: CookieJar,
    Query(query): Query<NextQuery>,
    Form(form): Form<LoginForm>,
) -> Response {
    let next = form.next.clone().or(query.next);

    match state.accounts.login(&form.username, &form.password).await {
        Ok((_, session)) => {
            let jar = jar.add(session_cookie(&state, session.token));
            let target = safe_next(next.as_deref()).unwrap_or("/");
            (jar, found(target)).into_response()
        }
        Err(AccountError::Invalid(errors)) => {
            let chrome = LayoutChrome::new(None, LOGIN_PATH);
            let content = LoginView {
                username: form.username,
                next: next.unwrap_or_default(),
                errors,
            };
            let view = LayoutContext::new(chrome, "Log in", content);
            render_template_response(LoginTemplate { view }, StatusCode::OK)
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

pub(super) async fn logout(State(state): State<HttpState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(&state.session_cookie)
        && let Err(err) = state.accounts.logout(cookie.value()).await
    {
        return HttpError::from(err).into_response();
    }

    let jar = jar.remove(removal_cookie(&state));
    let chrome = LayoutChrome::new(None, "/auth/logout/");
    let view = LayoutContext::new(chrome, "Logged out", ());
    (
        jar,
        render_template_response(LoggedOutTemplate { view }, StatusCode::OK),
    )
        .into_response()
}

pub(super) async fn password_change_page(CurrentUser(user): CurrentUser) -> Response {
    let chrome = LayoutChrome::new(Some(&user), "/auth/password_change/");
    let view = LayoutContext::new(chrome, "Change password", PasswordChangeView::default());
    render_template_response(PasswordChangeTemplate { view }, StatusCode::OK)
}

pub(super) async fn password_change_submit(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<PasswordChangeForm>,
) -> Response {
    match state.accounts.change_password(&user, &form).await {
        Ok(()) => found(PASSWORD_CHANGE_DONE_PATH),
        Err(AccountError::Invalid(errors)) => {
            let chrome = LayoutChrome::new(Some(&user), "/auth/password_change/");
            let view = LayoutContext::new(
                chrome,
                "Change password",
                PasswordChangeView { errors },
            );
            render_template_response(PasswordChangeTemplate { view }, StatusCode::OK)
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

pub(super) async fn password_change_done(CurrentUser(user): CurrentUser) -> Response {
    let chrome = LayoutChrome::new(Some(&user), PASSWORD_CHANGE_DONE_PATH);
    let view = LayoutContext::new(chrome, "Password changed", ());
    render_template_response(PasswordChangeDoneTemplate { view }, StatusCode::OK)
}
