use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::error;

use crate::{
    application::{
        accounts::AccountService,
        error::{ErrorReport, HttpError},
        feed::{FeedError, FeedService},
        follows::FollowService,
        posts::PostService,
    },
    cache::FeedCache,
    infra::media::MediaStorage,
    presentation::views::{
        CommentView, GroupPageView, GroupTemplate, IndexTemplate, IndexView, LayoutChrome,
        LayoutContext, PostCardView, PostDetailTemplate, PostDetailView, ProfileTemplate,
        ProfileView, group_href, post_href, profile_href, render_feed_fragment,
        render_not_found_response, render_template_response,
    },
};

use super::{
    auth, follows,
    auth::MaybeUser,
    middleware::{log_responses, set_request_context},
    posts,
};

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub follows: Arc<FollowService>,
    pub accounts: Arc<AccountService>,
    pub feed_cache: FeedCache,
    pub media: Arc<MediaStorage>,
    pub session_cookie: String,
    pub max_request_bytes: usize,
}

pub fn build_router(state: HttpState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_request_bytes);

    let posts_routes = Router::new()
        .route(
            "/create/",
            get(posts::create_page)
                .post(posts::create_submit)
                .layer(upload_limit.clone()),
        )
        .route("/posts/{id}/", get(post_detail))
        .route(
            "/posts/{id}/edit/",
            get(posts::edit_page)
                .post(posts::edit_submit)
                .layer(upload_limit),
        )
        .route("/posts/{id}/comment/", post(posts::add_comment));

    let follow_routes = Router::new()
        .route("/follow/", get(follows::follow_index))
        .route(
            "/profile/{username}/follow/",
            get(follows::profile_follow).post(follows::profile_follow),
        )
        .route(
            "/profile/{username}/unfollow/",
            get(follows::profile_unfollow).post(follows::profile_unfollow),
        );

    let auth_routes = Router::new()
        .route(
            "/auth/signup/",
            get(auth::signup_page).post(auth::signup_submit),
        )
        .route("/auth/login/", get(auth::login_page).post(auth::login_submit))
        .route("/auth/logout/", get(auth::logout).post(auth::logout))
        .route(
            "/auth/password_change/",
            get(auth::password_change_page).post(auth::password_change_submit),
        )
        .route(
            "/auth/password_change/done/",
            get(auth::password_change_done),
        );

    Router::new()
        .route("/", get(index))
        .route("/group/{slug}/", get(group_posts))
        .route("/profile/{username}/", get(profile))
        .route("/media/{*path}", get(serve_media))
        .merge(posts_routes)
        .merge(follow_routes)
        .merge(auth_routes)
        .fallback(fallback)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct PageQuery {
    pub(super) page: Option<String>,
}

async fn index(
    State(state): State<HttpState>,
    MaybeUser(viewer): MaybeUser,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = LayoutChrome::new(viewer.as_ref(), "/");
    let requested = query.page.as_deref();

    let feed = state.feed.clone();
    let feed_html = state
        .feed_cache
        .get_or_render(&FeedCache::index_key(requested), || async move {
            let page = feed.index(requested).await.map_err(HttpError::from)?;
            render_feed_fragment("/", &page, true)
        })
        .await;

    match feed_html {
        Ok(feed_html) => {
            let view = LayoutContext::new(chrome, "Latest posts", IndexView { feed_html });
            render_template_response(IndexTemplate { view }, StatusCode::OK)
        }
        Err(err) => err.into_response(),
    }
}

async fn group_posts(
    State(state): State<HttpState>,
    MaybeUser(viewer): MaybeUser,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let href = group_href(&slug);
    let chrome = LayoutChrome::new(viewer.as_ref(), &href);

    let feed = match state.feed.group(&slug, query.page.as_deref()).await {
        Ok(feed) => feed,
        Err(err) => return feed_error_to_response(err, chrome),
    };
    let feed_html = match render_feed_fragment(&href, &feed.page, false) {
        Ok(html) => html,
        Err(err) => return err.into_response(),
    };

    let content = GroupPageView {
        title: feed.group.title.clone(),
        description: feed.group.description,
        feed_html,
    };
    let view = LayoutContext::new(chrome, feed.group.title, content);
    render_template_response(GroupTemplate { view }, StatusCode::OK)
}

async fn profile(
    State(state): State<HttpState>,
    MaybeUser(viewer): MaybeUser,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let href = profile_href(&username);
    let chrome = LayoutChrome::new(viewer.as_ref(), &href);

    let feed = match state
        .feed
        .profile(&username, viewer.as_ref(), query.page.as_deref())
        .await
    {
        Ok(feed) => feed,
        Err(err) => return feed_error_to_response(err, chrome),
    };
    let feed_html = match render_feed_fragment(&href, &feed.page, true) {
        Ok(html) => html,
        Err(err) => return err.into_response(),
    };

    let display_name = feed.author.display_name();
    let content = ProfileView {
        username: feed.author.username.clone(),
        display_name: display_name.clone(),
        posts_count: feed.posts_count,
        following: feed.following,
        can_follow: viewer.is_some() && !feed.same_user,
        follow_href: format!("{href}follow/"),
        unfollow_href: format!("{href}unfollow/"),
        feed_html,
    };
    let view = LayoutContext::new(chrome, format!("Profile of {display_name}"), content);
    render_template_response(ProfileTemplate { view }, StatusCode::OK)
}

async fn post_detail(
    State(state): State<HttpState>,
    MaybeUser(viewer): MaybeUser,
    Path(raw_id): Path<String>,
) -> Response {
    let chrome = LayoutChrome::new(viewer.as_ref(), "");
    // Non-numeric ids are simply missing posts.
    let Ok(id) = raw_id.parse::<i64>() else {
        return render_not_found_response(chrome);
    };

    let detail = match state.feed.post_detail(id).await {
        Ok(detail) => detail,
        Err(err) => return feed_error_to_response(err, chrome),
    };

    let is_author = viewer
        .as_ref()
        .is_some_and(|viewer| viewer.id == detail.post.author_id);
    let title: String = detail.post.text.chars().take(30).collect();
    let content = PostDetailView {
        post: PostCardView::from(&detail.post),
        author_posts_count: detail.author_posts_count,
        comments: detail.comments.iter().map(CommentView::from).collect(),
        edit_href: is_author.then(|| format!("{}edit/", post_href(id))),
        comment_action: format!("{}comment/", post_href(id)),
        can_comment: viewer.is_some(),
    };
    let view = LayoutContext::new(chrome, title, content);
    render_template_response(PostDetailTemplate { view }, StatusCode::OK)
}

async fn serve_media(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    match state.media.read(&path).await {
        Ok(bytes) => build_media_response(&path, bytes),
        Err(err) if err.is_not_found() => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "File not found",
            "The requested media file is not available",
        )
        .into_response(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored media"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read media file",
                err.to_string(),
            )
            .into_response()
        }
    }
}

fn build_media_response(path: &str, bytes: Bytes) -> Response {
    let mut response = Response::new(Body::from(bytes));
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

async fn fallback(MaybeUser(viewer): MaybeUser, request: Request) -> Response {
    let chrome = LayoutChrome::new(viewer.as_ref(), request.uri().path());
    render_not_found_response(chrome)
}

/// Missing groups, authors, and posts render the not-found page.
pub(super) fn feed_error_to_response(err: FeedError, chrome: LayoutChrome) -> Response {
    match err {
        FeedError::UnknownGroup(_) | FeedError::UnknownAuthor(_) | FeedError::UnknownPost(_) => {
            let mut response = render_not_found_response(chrome);
            ErrorReport::from_error(
                "infra::http::feed_error_to_response",
                StatusCode::NOT_FOUND,
                &err,
            )
            .attach(&mut response);
            response
        }
        err => HttpError::from(err).into_response(),
    }
}
