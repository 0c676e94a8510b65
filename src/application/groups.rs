use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{CreateGroupParams, GroupsRepo, RepoError};
use crate::domain::entities::GroupRecord;
use crate::domain::slug::{SlugAsyncError, SlugError, generate_unique_slug_async, validate_slug};

#[derive(Debug, Error)]
pub enum GroupError {
    #[error("group title must not be empty")]
    EmptyTitle,
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error("a group with slug `{slug}` already exists")]
    Duplicate { slug: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<SlugAsyncError<RepoError>> for GroupError {
    fn from(err: SlugAsyncError<RepoError>) -> Self {
        match err {
            SlugAsyncError::Slug(err) => Self::Slug(err),
            SlugAsyncError::Predicate(err) => Self::Repo(err),
        }
    }
}

/// Group management for operators; the site itself only reads groups.
#[derive(Clone)]
pub struct GroupService {
    groups: Arc<dyn GroupsRepo>,
}

impl GroupService {
    pub fn new(groups: Arc<dyn GroupsRepo>) -> Self {
        Self { groups }
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupRecord>, GroupError> {
        Ok(self.groups.list_groups().await?)
    }

    /// Create a group. Without an explicit slug one is derived from the title.
    pub async fn create_group(
        &self,
        title: &str,
        slug: Option<&str>,
        description: &str,
    ) -> Result<GroupRecord, GroupError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(GroupError::EmptyTitle);
        }

        let slug = match slug.map(str::trim).filter(|slug| !slug.is_empty()) {
            Some(explicit) => {
                validate_slug(explicit)?;
                if self.groups.find_group_by_slug(explicit).await?.is_some() {
                    return Err(GroupError::Duplicate {
                        slug: explicit.to_string(),
                    });
                }
                explicit.to_string()
            }
            None => {
                let groups = self.groups.clone();
                generate_unique_slug_async(title, move |candidate| {
                    let groups = groups.clone();
                    let candidate = candidate.to_string();
                    async move {
                        groups
                            .find_group_by_slug(&candidate)
                            .await
                            .map(|found| found.is_none())
                    }
                })
                .await?
            }
        };

        let group = self
            .groups
            .create_group(CreateGroupParams {
                title: title.to_string(),
                slug: slug.clone(),
                description: description.trim().to_string(),
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => GroupError::Duplicate { slug },
                other => GroupError::Repo(other),
            })?;

        info!(target = "penfeed::groups", slug = %group.slug, "group created");
        Ok(group)
    }
}
