//! Post authoring handlers: create, edit, and comment.

use axum::{
    Form,
    extract::{FromRequest, Path, Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use axum_extra::extract::Multipart;
use serde::Deserialize;
use tracing::debug;

use crate::application::error::HttpError;
use crate::application::posts::{ImageUpload, PostError, PostSubmission};
use crate::domain::entities::UserRecord;
use crate::domain::validation::FieldErrors;
use crate::presentation::views::{
    LayoutChrome, LayoutContext, PostFormTemplate, PostFormView, post_href, profile_href,
    render_not_found_response, render_template_response,
};

use super::{HttpState, auth::CurrentUser, found};

const CREATE_PATH: &str = "/create/";

/// The post form, from either a multipart upload or a plain urlencoded body.
pub(super) struct PostForm(pub(super) PostSubmission);

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UrlencodedPostForm {
    text: Option<String>,
    group: Option<String>,
    #[serde(rename = "image-clear")]
    image_clear: Option<String>,
}

impl FromRequest<HttpState> for PostForm {
    type Rejection = Response;

    async fn from_request(req: Request, state: &HttpState) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if !is_multipart {
            let Form(raw) = Form::<UrlencodedPostForm>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            return Ok(Self(PostSubmission {
                text: raw.text,
                group: raw.group,
                image: None,
                clear_image: raw.image_clear.is_some(),
            }));
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        let mut submission = PostSubmission::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(IntoResponse::into_response)?
        {
            match field.name() {
                Some("text") => {
                    submission.text = Some(field.text().await.map_err(IntoResponse::into_response)?);
                }
                Some("group") => {
                    submission.group =
                        Some(field.text().await.map_err(IntoResponse::into_response)?);
                }
                Some("image-clear") => submission.clear_image = true,
                Some("image") => {
                    let filename = field
                        .file_name()
                        .map(str::to_string)
                        .filter(|name| !name.trim().is_empty());
                    let data = field.bytes().await.map_err(IntoResponse::into_response)?;
                    // Browsers send an unnamed empty part when no file was picked.
                    if let Some(filename) = filename {
                        submission.image = Some(ImageUpload { filename, data });
                    }
                }
                _ => {}
            }
        }

        Ok(Self(submission))
    }
}

fn parse_post_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok()
}

async fn render_form(
    state: &HttpState,
    user: &UserRecord,
    form: PostFormParts<'_>,
    status: StatusCode,
) -> Response {
    let groups = match state.posts.list_groups().await {
        Ok(groups) => groups,
        Err(err) => return HttpError::from(err).into_response(),
    };

    let title = if form.is_edit { "Edit post" } else { "New post" };
    let view = PostFormView::new(
        form.action.to_string(),
        form.is_edit,
        form.text,
        form.group,
        &groups,
    )
    .with_current_image(form.current_image)
    .with_errors(form.errors);

    let chrome = LayoutChrome::new(Some(user), form.action);
    let view = LayoutContext::new(chrome, title, view);
    render_template_response(PostFormTemplate { view }, status)
}

struct PostFormParts<'a> {
    action: &'a str,
    is_edit: bool,
    text: &'a str,
    group: Option<&'a str>,
    current_image: Option<&'a str>,
    errors: FieldErrors,
}

pub(super) async fn create_page(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
) -> Response {
    let form = PostFormParts {
        action: CREATE_PATH,
        is_edit: false,
        text: "",
        group: None,
        current_image: None,
        errors: FieldErrors::new(),
    };
    render_form(&state, &user, form, StatusCode::OK).await
}

pub(super) async fn create_submit(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    PostForm(submission): PostForm,
) -> Response {
    match state.posts.create_post(&user, &submission).await {
        Ok(_) => found(&profile_href(&user.username)),
        Err(PostError::Invalid(errors)) => {
            debug!(target = "penfeed::http::posts", %errors, "post form rejected");
            let form = PostFormParts {
                action: CREATE_PATH,
                is_edit: false,
                text: submission.text.as_deref().unwrap_or_default(),
                group: submission.group.as_deref(),
                current_image: None,
                errors,
            };
            render_form(&state, &user, form, StatusCode::OK).await
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

pub(super) async fn edit_page(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path(raw_id): Path<String>,
) -> Response {
    let Some(id) = parse_post_id(&raw_id) else {
        return render_not_found_response(LayoutChrome::new(Some(&user), ""));
    };

    match state.posts.load_for_edit(id, &user).await {
        Ok(post) => {
            let action = format!("{}edit/", post_href(id));
            let group = post.group.as_ref().map(|group| group.id.to_string());
            let form = PostFormParts {
                action: &action,
                is_edit: true,
                text: &post.text,
                group: group.as_deref(),
                current_image: post.image.as_deref(),
                errors: FieldErrors::new(),
            };
            render_form(&state, &user, form, StatusCode::OK).await
        }
        Err(err) => edit_error_to_response(err, id, &user),
    }
}

pub(super) async fn edit_submit(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path(raw_id): Path<String>,
    PostForm(submission): PostForm,
) -> Response {
    let Some(id) = parse_post_id(&raw_id) else {
        return render_not_found_response(LayoutChrome::new(Some(&user), ""));
    };

    match state.posts.edit_post(id, &user, &submission).await {
        Ok(post) => found(&post_href(post.id)),
        Err(PostError::Invalid(errors)) => {
            let current = match state.posts.load_for_edit(id, &user).await {
                Ok(post) => post,
                Err(err) => return edit_error_to_response(err, id, &user),
            };
            let action = format!("{}edit/", post_href(id));
            let form = PostFormParts {
                action: &action,
                is_edit: true,
                text: submission.text.as_deref().unwrap_or_default(),
                group: submission.group.as_deref(),
                current_image: current.image.as_deref(),
                errors,
            };
            render_form(&state, &user, form, StatusCode::OK).await
        }
        Err(err) => edit_error_to_response(err, id, &user),
    }
}

/// Someone else's post sends the editor back to its detail page.
fn edit_error_to_response(err: PostError, id: i64, user: &UserRecord) -> Response {
    match err {
        PostError::NotFound => render_not_found_response(LayoutChrome::new(Some(user), "")),
        PostError::NotAuthor => {
            debug!(
                target = "penfeed::http::posts",
                post_id = id,
                user = %user.username,
                "edit refused for non-author"
            );
            found(&post_href(id))
        }
        other => HttpError::from(other).into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct CommentForm {
    text: Option<String>,
}

pub(super) async fn add_comment(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path(raw_id): Path<String>,
    Form(form): Form<CommentForm>,
) -> Response {
    let Some(id) = parse_post_id(&raw_id) else {
        return render_not_found_response(LayoutChrome::new(Some(&user), ""));
    };

    match state.posts.add_comment(id, &user, form.text.as_deref()).await {
        Ok(_) | Err(PostError::Invalid(_)) => found(&post_href(id)),
        Err(PostError::NotFound) => render_not_found_response(LayoutChrome::new(Some(&user), "")),
        Err(err) => HttpError::from(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_ids_must_be_integers() {
        assert_eq!(parse_post_id("42"), Some(42));
        assert_eq!(parse_post_id("abc"), None);
        assert_eq!(parse_post_id(""), None);
    }
}
