use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("author not found")]
    UnknownAuthor,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Created,
    AlreadyFollowing,
    /// Following yourself is ignored without an error.
    SelfFollow,
}

#[derive(Clone)]
pub struct FollowService {
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
}

impl FollowService {
    pub fn new(users: Arc<dyn UsersRepo>, follows: Arc<dyn FollowsRepo>) -> Self {
        Self { users, follows }
    }

    pub async fn follow(
        &self,
        user: &UserRecord,
        author_username: &str,
    ) -> Result<FollowOutcome, FollowError> {
        let author = self.resolve_author(author_username).await?;
        if author.id == user.id {
            return Ok(FollowOutcome::SelfFollow);
        }

        let created = self.follows.follow(user.id, author.id).await?;
        debug!(
            target = "penfeed::follows",
            user = %user.username,
            author = %author.username,
            created,
            "follow requested"
        );

        Ok(if created {
            FollowOutcome::Created
        } else {
            FollowOutcome::AlreadyFollowing
        })
    }

    /// Remove the subscription; returns whether one existed.
    pub async fn unfollow(
        &self,
        user: &UserRecord,
        author_username: &str,
    ) -> Result<bool, FollowError> {
        let author = self.resolve_author(author_username).await?;
        let removed = self.follows.unfollow(user.id, author.id).await?;
        debug!(
            target = "penfeed::follows",
            user = %user.username,
            author = %author.username,
            removed,
            "unfollow requested"
        );
        Ok(removed)
    }

    async fn resolve_author(&self, username: &str) -> Result<UserRecord, FollowError> {
        self.users
            .find_user_by_username(username)
            .await?
            .ok_or(FollowError::UnknownAuthor)
    }
}
