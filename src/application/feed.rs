use std::{num::NonZeroU32, sync::Arc};

use thiserror::Error;

use crate::application::pagination::{Page, PageWindow};
use crate::application::repos::{
    CommentsRepo, FollowsRepo, GroupsRepo, PostListScope, PostsRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("group `{0}` does not exist")]
    UnknownGroup(String),
    #[error("user `{0}` does not exist")]
    UnknownAuthor(String),
    #[error("post {0} does not exist")]
    UnknownPost(i64),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub struct GroupFeed {
    pub group: GroupRecord,
    pub page: Page<PostRecord>,
}

pub struct ProfileFeed {
    pub author: UserRecord,
    pub page: Page<PostRecord>,
    pub posts_count: u64,
    /// The viewer already follows this author.
    pub following: bool,
    /// The viewer is looking at their own profile.
    pub same_user: bool,
}

pub struct PostDetail {
    pub post: PostRecord,
    pub author_posts_count: u64,
    pub comments: Vec<CommentRecord>,
}

/// Read side of the site: every paginated post listing and the post detail view.
#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    users: Arc<dyn UsersRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
    follows: Arc<dyn FollowsRepo>,
    page_size: NonZeroU32,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        users: Arc<dyn UsersRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
        follows: Arc<dyn FollowsRepo>,
        page_size: NonZeroU32,
    ) -> Self {
        Self {
            posts,
            users,
            groups,
            comments,
            follows,
            page_size,
        }
    }

    pub async fn index(&self, requested_page: Option<&str>) -> Result<Page<PostRecord>, FeedError> {
        Ok(self.paginate(PostListScope::All, requested_page).await?)
    }

    pub async fn group(
        &self,
        slug: &str,
        requested_page: Option<&str>,
    ) -> Result<GroupFeed, FeedError> {
        let group = self
            .groups
            .find_group_by_slug(slug)
            .await?
            .ok_or_else(|| FeedError::UnknownGroup(slug.to_string()))?;

        let page = self
            .paginate(PostListScope::Group(group.id), requested_page)
            .await?;

        Ok(GroupFeed { group, page })
    }

    pub async fn profile(
        &self,
        username: &str,
        viewer: Option<&UserRecord>,
        requested_page: Option<&str>,
    ) -> Result<ProfileFeed, FeedError> {
        let author = self
            .users
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| FeedError::UnknownAuthor(username.to_string()))?;

        let page = self
            .paginate(PostListScope::Author(author.id), requested_page)
            .await?;

        let same_user = viewer.is_some_and(|viewer| viewer.id == author.id);
        let following = match viewer {
            Some(viewer) if !same_user => self.follows.is_following(viewer.id, author.id).await?,
            _ => false,
        };

        Ok(ProfileFeed {
            posts_count: page.window.total,
            author,
            page,
            following,
            same_user,
        })
    }

    pub async fn post_detail(&self, id: i64) -> Result<PostDetail, FeedError> {
        let post = self
            .posts
            .find_post(id)
            .await?
            .ok_or(FeedError::UnknownPost(id))?;

        let author_posts_count = self
            .posts
            .count_posts(PostListScope::Author(post.author_id))
            .await?;
        let comments = self.comments.list_comments(post.id).await?;

        Ok(PostDetail {
            post,
            author_posts_count,
            comments,
        })
    }

    /// Posts by every author `viewer_id` follows, newest first.
    pub async fn followed(
        &self,
        viewer_id: i64,
        requested_page: Option<&str>,
    ) -> Result<Page<PostRecord>, FeedError> {
        Ok(self
            .paginate(PostListScope::FollowedBy(viewer_id), requested_page)
            .await?)
    }

    async fn paginate(
        &self,
        scope: PostListScope,
        requested_page: Option<&str>,
    ) -> Result<Page<PostRecord>, RepoError> {
        let total = self.posts.count_posts(scope).await?;
        let window = PageWindow::resolve(total, self.page_size, requested_page);
        let items = self
            .posts
            .list_posts(scope, window.offset(), window.limit())
            .await?;

        Ok(Page { items, window })
    }
}
