//! Write side of posts: creating, editing, and commenting.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreatePostParams, GroupsRepo, PostsRepo, RepoError,
    UpdatePostParams,
};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};
use crate::domain::validation::{FieldErrors, INVALID_CHOICE, INVALID_IMAGE, required_text};
use crate::infra::media::{MediaError, MediaStorage};

const EMPTY_FILE: &str = "The submitted file is empty.";
const CLEAR_AND_UPLOAD: &str =
    "Please either submit a file or check the clear checkbox, not both.";

#[derive(Debug, Error)]
pub enum PostError {
    #[error("post not found")]
    NotFound,
    #[error("only the author may edit this post")]
    NotAuthor,
    #[error("invalid post form: {0}")]
    Invalid(FieldErrors),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub data: Bytes,
}

/// Raw values of the post form as submitted by the browser.
#[derive(Debug, Clone, Default)]
pub struct PostSubmission {
    pub text: Option<String>,
    /// Group id as text; empty means "no group".
    pub group: Option<String>,
    pub image: Option<ImageUpload>,
    /// Drop the current image on edit.
    pub clear_image: bool,
}

struct CleanPost {
    text: String,
    group_id: Option<i64>,
    image: Option<ImageUpload>,
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
    media: Arc<MediaStorage>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
        media: Arc<MediaStorage>,
    ) -> Self {
        Self {
            posts,
            groups,
            comments,
            media,
        }
    }

    /// Groups offered by the post form's select box.
    pub async fn list_groups(&self) -> Result<Vec<GroupRecord>, PostError> {
        Ok(self.groups.list_groups().await?)
    }

    pub async fn create_post(
        &self,
        author: &UserRecord,
        submission: &PostSubmission,
    ) -> Result<PostRecord, PostError> {
        let clean = self.clean(submission, false).await?;
        let stored = match clean.image {
            Some(upload) => Some(self.store_image(upload).await?),
            None => None,
        };

        let created = self
            .posts
            .create_post(CreatePostParams {
                author_id: author.id,
                text: clean.text,
                group_id: clean.group_id,
                image: stored.clone(),
            })
            .await;
        let post = match created {
            Ok(post) => post,
            Err(err) => {
                self.discard_image(stored.as_deref()).await;
                return Err(err.into());
            }
        };

        info!(
            target = "penfeed::posts",
            post_id = post.id,
            author = %author.username,
            "post created"
        );
        Ok(post)
    }

    /// Fetch a post for its edit form, refusing anyone but the author.
    pub async fn load_for_edit(
        &self,
        post_id: i64,
        editor: &UserRecord,
    ) -> Result<PostRecord, PostError> {
        let post = self
            .posts
            .find_post(post_id)
            .await?
            .ok_or(PostError::NotFound)?;
        if post.author_id != editor.id {
            return Err(PostError::NotAuthor);
        }
        Ok(post)
    }

    /// Apply an edit. The current image survives unless replaced or cleared.
    pub async fn edit_post(
        &self,
        post_id: i64,
        editor: &UserRecord,
        submission: &PostSubmission,
    ) -> Result<PostRecord, PostError> {
        let current = self.load_for_edit(post_id, editor).await?;
        let clean = self.clean(submission, true).await?;

        let stored = match clean.image {
            Some(upload) => Some(self.store_image(upload).await?),
            None => None,
        };
        let image = match &stored {
            Some(path) => Some(path.clone()),
            None if submission.clear_image => None,
            None => current.image,
        };

        let updated = self
            .posts
            .update_post(UpdatePostParams {
                id: current.id,
                text: clean.text,
                group_id: clean.group_id,
                image,
            })
            .await;
        let post = match updated {
            Ok(post) => post,
            Err(err) => {
                self.discard_image(stored.as_deref()).await;
                return Err(err.into());
            }
        };

        info!(target = "penfeed::posts", post_id = post.id, "post updated");
        Ok(post)
    }

    /// Attach a comment to an existing post.
    pub async fn add_comment(
        &self,
        post_id: i64,
        author: &UserRecord,
        text: Option<&str>,
    ) -> Result<CommentRecord, PostError> {
        if self.posts.find_post(post_id).await?.is_none() {
            return Err(PostError::NotFound);
        }

        let text = required_text(text).map_err(|message| {
            let mut errors = FieldErrors::new();
            errors.add("text", message);
            PostError::Invalid(errors)
        })?;

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id,
                author_id: author.id,
                text,
            })
            .await?;
        Ok(comment)
    }

    async fn clean(
        &self,
        submission: &PostSubmission,
        editing: bool,
    ) -> Result<CleanPost, PostError> {
        let mut errors = FieldErrors::new();

        let text = match required_text(submission.text.as_deref()) {
            Ok(text) => Some(text),
            Err(message) => {
                errors.add("text", message);
                None
            }
        };

        let group_id = match self.clean_group(submission.group.as_deref()).await? {
            Ok(group_id) => group_id,
            Err(message) => {
                errors.add("group", message);
                None
            }
        };

        let image = match &submission.image {
            Some(upload) if upload.data.is_empty() => {
                errors.add("image", EMPTY_FILE);
                None
            }
            Some(upload) if imagesize::blob_size(&upload.data).is_err() => {
                errors.add("image", INVALID_IMAGE);
                None
            }
            Some(upload) => Some(upload.clone()),
            None => None,
        };
        if editing && submission.clear_image && submission.image.is_some() {
            errors.add("image", CLEAR_AND_UPLOAD);
        }

        errors.into_result().map_err(PostError::Invalid)?;
        Ok(CleanPost {
            text: text.unwrap_or_default(),
            group_id,
            image,
        })
    }

    /// Resolve the group select value; the inner error is the field message.
    async fn clean_group(
        &self,
        raw: Option<&str>,
    ) -> Result<Result<Option<i64>, &'static str>, RepoError> {
        let raw = raw.map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Ok(Ok(None));
        }

        let Ok(id) = raw.parse::<i64>() else {
            return Ok(Err(INVALID_CHOICE));
        };
        Ok(self
            .groups
            .find_group_by_id(id)
            .await?
            .map(|group| Some(group.id))
            .ok_or(INVALID_CHOICE))
    }

    async fn store_image(&self, upload: ImageUpload) -> Result<String, PostError> {
        let stored = self
            .media
            .store_post_image(&upload.filename, upload.data)
            .await
            .inspect_err(|err| {
                warn!(
                    target = "penfeed::posts",
                    filename = %upload.filename,
                    error = %err,
                    "failed to store post image"
                );
            })?;
        Ok(stored.stored_path)
    }

    /// Remove a freshly stored image whose post row was never written.
    async fn discard_image(&self, stored_path: Option<&str>) {
        let Some(path) = stored_path else {
            return;
        };
        if let Err(err) = self.media.remove(path).await {
            warn!(
                target = "penfeed::posts",
                path,
                error = %err,
                "failed to remove orphaned post image"
            );
        }
    }
}
