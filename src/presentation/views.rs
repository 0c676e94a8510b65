use std::sync::Arc;

use crate::application::error::{ErrorReport, HttpError};
use crate::application::pagination::{Page, PageWindow};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};
use crate::domain::validation::FieldErrors;
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

const SITE_TITLE: &str = "Penfeed";
const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[day padding:none] [month repr:long] [year]");
/// Page links shown on each side of the current page.
const PAGINATOR_RADIUS: u64 = 3;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let view = LayoutContext::new(chrome, "Page not found", ErrorPageView::not_found());
    let mut response = render_template_response(NotFoundTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

#[derive(Clone)]
pub struct NavigationLinkView {
    pub label: String,
    pub href: String,
    pub active: bool,
}

#[derive(Clone)]
pub struct ViewerView {
    pub username: String,
    pub display_name: String,
}

/// Per-request page frame. Never cached: it reflects the signed-in user.
#[derive(Clone)]
pub struct LayoutChrome {
    pub site_title: String,
    pub viewer: Option<ViewerView>,
    pub navigation: Vec<NavigationLinkView>,
}

impl LayoutChrome {
    pub fn new(viewer: Option<&UserRecord>, current_path: &str) -> Self {
        let link = |label: &str, href: &str| NavigationLinkView {
            label: label.to_string(),
            href: href.to_string(),
            active: current_path == href,
        };

        let mut navigation = vec![link("Home", "/")];
        match viewer {
            Some(user) => {
                navigation.push(link("New post", "/create/"));
                navigation.push(link("Following", "/follow/"));
                navigation.push(link("My profile", &profile_href(&user.username)));
                navigation.push(link("Change password", "/auth/password_change/"));
                navigation.push(link("Log out", "/auth/logout/"));
            }
            None => {
                navigation.push(link("Log in", "/auth/login/"));
                navigation.push(link("Sign up", "/auth/signup/"));
            }
        }

        Self {
            site_title: SITE_TITLE.to_string(),
            viewer: viewer.map(|user| ViewerView {
                username: user.username.clone(),
                display_name: user.display_name(),
            }),
            navigation,
        }
    }
}

pub struct LayoutContext<T> {
    pub site_title: String,
    pub viewer: Option<ViewerView>,
    pub navigation: Vec<NavigationLinkView>,
    pub title: String,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, title: impl Into<String>, content: T) -> Self {
        Self {
            site_title: chrome.site_title,
            viewer: chrome.viewer,
            navigation: chrome.navigation,
            title: title.into(),
            content,
        }
    }
}

pub fn profile_href(username: &str) -> String {
    format!("/profile/{}/", path_segment(username))
}

pub fn post_href(id: i64) -> String {
    format!("/posts/{id}/")
}

pub fn group_href(slug: &str) -> String {
    format!("/group/{}/", path_segment(slug))
}

/// Percent-encode one path segment so hrefs and `Location` stay ASCII.
fn path_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

pub fn format_date(value: OffsetDateTime) -> String {
    value
        .format(DATE_FORMAT)
        .unwrap_or_else(|_| value.date().to_string())
}

#[derive(Clone)]
pub struct GroupLinkView {
    pub title: String,
    pub href: String,
}

#[derive(Clone)]
pub struct PostCardView {
    pub id: i64,
    pub text: String,
    pub created_label: String,
    pub author_username: String,
    pub author_name: String,
    pub profile_href: String,
    pub detail_href: String,
    pub image_url: Option<String>,
    pub group: Option<GroupLinkView>,
}

impl From<&PostRecord> for PostCardView {
    fn from(post: &PostRecord) -> Self {
        Self {
            id: post.id,
            text: post.text.clone(),
            created_label: format_date(post.created_at),
            author_username: post.author_username.clone(),
            author_name: post.author_name.clone(),
            profile_href: profile_href(&post.author_username),
            detail_href: post_href(post.id),
            image_url: post.image.as_deref().map(media_url),
            group: post.group.as_ref().map(|group| GroupLinkView {
                title: group.title.clone(),
                href: group_href(&group.slug),
            }),
        }
    }
}

pub fn media_url(stored_path: &str) -> String {
    format!("/media/{stored_path}")
}

#[derive(Clone)]
pub struct PageLinkView {
    pub number: u64,
    pub href: String,
    pub current: bool,
}

#[derive(Clone)]
pub struct PaginatorView {
    pub visible: bool,
    pub number: u64,
    pub num_pages: u64,
    pub previous_href: Option<String>,
    pub next_href: Option<String>,
    pub first_href: Option<String>,
    pub last_href: Option<String>,
    pub pages: Vec<PageLinkView>,
}

impl PaginatorView {
    pub fn new(base_path: &str, window: &PageWindow) -> Self {
        let href = |number: u64| format!("{base_path}?page={number}");

        let first = window.number.saturating_sub(PAGINATOR_RADIUS).max(1);
        let last = (window.number + PAGINATOR_RADIUS).min(window.num_pages);
        let pages = (first..=last)
            .map(|number| PageLinkView {
                number,
                href: href(number),
                current: number == window.number,
            })
            .collect();

        Self {
            visible: window.has_other_pages(),
            number: window.number,
            num_pages: window.num_pages,
            previous_href: window
                .has_previous()
                .then(|| href(window.previous_number())),
            next_href: window.has_next().then(|| href(window.next_number())),
            first_href: (first > 1).then(|| href(1)),
            last_href: (last < window.num_pages).then(|| href(window.num_pages)),
            pages,
        }
    }
}

/// Post list with its paginator; rendered on its own so the home feed can cache it.
#[derive(Template)]
#[template(path = "includes/feed.html")]
pub struct FeedFragmentTemplate {
    pub posts: Vec<PostCardView>,
    pub paginator: PaginatorView,
    pub show_group_links: bool,
}

impl FeedFragmentTemplate {
    pub fn new(base_path: &str, page: &Page<PostRecord>, show_group_links: bool) -> Self {
        Self {
            posts: page.items.iter().map(PostCardView::from).collect(),
            paginator: PaginatorView::new(base_path, &page.window),
            show_group_links,
        }
    }
}

/// Render a feed fragment to a string for embedding into a page.
pub fn render_feed_fragment(
    base_path: &str,
    page: &Page<PostRecord>,
    show_group_links: bool,
) -> Result<String, HttpError> {
    FeedFragmentTemplate::new(base_path, page, show_group_links)
        .render()
        .map_err(|err| {
            TemplateRenderError::new(
                "presentation::views::render_feed_fragment",
                "Template rendering failed",
                err,
            )
            .into()
        })
}

pub struct IndexView {
    pub feed_html: Arc<str>,
}

#[derive(Template)]
#[template(path = "posts/index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<IndexView>,
}

pub struct GroupPageView {
    pub title: String,
    pub description: String,
    pub feed_html: String,
}

#[derive(Template)]
#[template(path = "posts/group_list.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<GroupPageView>,
}

pub struct ProfileView {
    pub username: String,
    pub display_name: String,
    pub posts_count: u64,
    pub following: bool,
    /// Follow buttons are shown to signed-in visitors of someone else's profile.
    pub can_follow: bool,
    pub follow_href: String,
    pub unfollow_href: String,
    pub feed_html: String,
}

#[derive(Template)]
#[template(path = "posts/profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileView>,
}

pub struct FollowFeedView {
    pub feed_html: String,
}

#[derive(Template)]
#[template(path = "posts/follow.html")]
pub struct FollowFeedTemplate {
    pub view: LayoutContext<FollowFeedView>,
}

pub struct CommentView {
    pub author_username: String,
    pub profile_href: String,
    pub text: String,
    pub created_label: String,
}

impl From<&CommentRecord> for CommentView {
    fn from(comment: &CommentRecord) -> Self {
        Self {
            author_username: comment.author_username.clone(),
            profile_href: profile_href(&comment.author_username),
            text: comment.text.clone(),
            created_label: format_date(comment.created_at),
        }
    }
}

pub struct PostDetailView {
    pub post: PostCardView,
    pub author_posts_count: u64,
    pub comments: Vec<CommentView>,
    pub edit_href: Option<String>,
    pub comment_action: String,
    pub can_comment: bool,
}

#[derive(Template)]
#[template(path = "posts/post_detail.html")]
pub struct PostDetailTemplate {
    pub view: LayoutContext<PostDetailView>,
}

#[derive(Clone)]
pub struct GroupOptionView {
    pub id: i64,
    pub title: String,
    pub selected: bool,
}

pub struct PostFormView {
    pub is_edit: bool,
    pub action: String,
    pub text: String,
    pub groups: Vec<GroupOptionView>,
    pub current_image_url: Option<String>,
    pub errors: FieldErrors,
}

impl PostFormView {
    /// `selected_group` is the raw select value, so a rejected choice stays selected.
    pub fn new(
        action: String,
        is_edit: bool,
        text: &str,
        selected_group: Option<&str>,
        groups: &[GroupRecord],
    ) -> Self {
        let selected = selected_group
            .map(str::trim)
            .and_then(|value| value.parse::<i64>().ok());
        Self {
            is_edit,
            action,
            text: text.to_string(),
            groups: groups
                .iter()
                .map(|group| GroupOptionView {
                    id: group.id,
                    title: group.title.clone(),
                    selected: Some(group.id) == selected,
                })
                .collect(),
            current_image_url: None,
            errors: FieldErrors::new(),
        }
    }

    pub fn with_current_image(mut self, stored_path: Option<&str>) -> Self {
        self.current_image_url = stored_path.map(media_url);
        self
    }

    pub fn with_errors(mut self, errors: FieldErrors) -> Self {
        self.errors = errors;
        self
    }
}

#[derive(Template)]
#[template(path = "posts/create_post.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormView>,
}

#[derive(Default)]
pub struct SignupView {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub errors: FieldErrors,
}

#[derive(Template)]
#[template(path = "users/signup.html")]
pub struct SignupTemplate {
    pub view: LayoutContext<SignupView>,
}

#[derive(Default)]
pub struct LoginView {
    pub username: String,
    pub next: String,
    pub errors: FieldErrors,
}

#[derive(Template)]
#[template(path = "users/login.html")]
pub struct LoginTemplate {
    pub view: LayoutContext<LoginView>,
}

#[derive(Template)]
#[template(path = "users/logged_out.html")]
pub struct LoggedOutTemplate {
    pub view: LayoutContext<()>,
}

#[derive(Default)]
pub struct PasswordChangeView {
    pub errors: FieldErrors,
}

#[derive(Template)]
#[template(path = "users/password_change_form.html")]
pub struct PasswordChangeTemplate {
    pub view: LayoutContext<PasswordChangeView>,
}

#[derive(Template)]
#[template(path = "users/password_change_done.html")]
pub struct PasswordChangeDoneTemplate {
    pub view: LayoutContext<()>,
}

pub struct ErrorPageView {
    pub message: String,
    pub home_href: String,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            message: "The page you requested does not exist.".to_string(),
            home_href: "/".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "core/404.html")]
pub struct NotFoundTemplate {
    pub view: LayoutContext<ErrorPageView>,
}
