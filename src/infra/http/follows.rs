use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::application::error::HttpError;
use crate::application::follows::FollowError;
use crate::presentation::views::{
    FollowFeedTemplate, FollowFeedView, LayoutChrome, LayoutContext, profile_href,
    render_feed_fragment, render_not_found_response, render_template_response,
};

use super::{HttpState, auth::CurrentUser, found, public::PageQuery};

const FOLLOW_PATH: &str = "/follow/";

/// Posts from every author the current user follows.
pub(super) async fn follow_index(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PageQuery>,
) -> Response {
    let page = match state.feed.followed(user.id, query.page.as_deref()).await {
        Ok(page) => page,
        Err(err) => return HttpError::from(err).into_response(),
    };
    let feed_html = match render_feed_fragment(FOLLOW_PATH, &page, true) {
        Ok(html) => html,
        Err(err) => return err.into_response(),
    };

    let chrome = LayoutChrome::new(Some(&user), FOLLOW_PATH);
    let view = LayoutContext::new(chrome, "Subscriptions", FollowFeedView { feed_html });
    render_template_response(FollowFeedTemplate { view }, StatusCode::OK)
}

pub(super) async fn profile_follow(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path(username): Path<String>,
) -> Response {
    match state.follows.follow(&user, &username).await {
        Ok(_) => found(&profile_href(&username)),
        Err(FollowError::UnknownAuthor) => {
            render_not_found_response(LayoutChrome::new(Some(&user), ""))
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

pub(super) async fn profile_unfollow(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path(username): Path<String>,
) -> Response {
    match state.follows.unfollow(&user, &username).await {
        Ok(_) => found(&profile_href(&username)),
        Err(FollowError::UnknownAuthor) => {
            render_not_found_response(LayoutChrome::new(Some(&user), ""))
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}
