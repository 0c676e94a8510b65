use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;

use crate::application::repos::{
    CreatePostParams, PostListScope, PostsRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::{PostGroupRef, PostRecord};

use super::{PostgresRepositories, map_sqlx_error};

/// Columns of a post joined with its author and group; the post relation is aliased `p`.
const POST_SELECT: &str = "SELECT p.id, p.text, p.created_at, p.image, p.author_id, \
     u.username AS author_username, u.first_name AS author_first_name, \
     u.last_name AS author_last_name, \
     g.id AS group_id, g.slug AS group_slug, g.title AS group_title ";

const POST_JOINS: &str = " INNER JOIN users u ON u.id = p.author_id \
     LEFT JOIN groups g ON g.id = p.group_id ";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    text: String,
    created_at: OffsetDateTime,
    image: Option<String>,
    author_id: i64,
    author_username: String,
    author_first_name: String,
    author_last_name: String,
    group_id: Option<i64>,
    group_slug: Option<String>,
    group_title: Option<String>,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        let full_name = format!(
            "{} {}",
            row.author_first_name.trim(),
            row.author_last_name.trim()
        );
        let author_name = match full_name.trim() {
            "" => row.author_username.clone(),
            name => name.to_string(),
        };

        let group = match (row.group_id, row.group_slug, row.group_title) {
            (Some(id), Some(slug), Some(title)) => Some(PostGroupRef { id, slug, title }),
            _ => None,
        };

        Self {
            id: row.id,
            text: row.text,
            created_at: row.created_at,
            image: row.image,
            author_id: row.author_id,
            author_username: row.author_username,
            author_name,
            group,
        }
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn list_posts(
        &self,
        scope: PostListScope,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let offset = i64::try_from(offset).map_err(|_| RepoError::InvalidInput {
            message: "page offset out of range".to_string(),
        })?;

        let mut qb = QueryBuilder::new(POST_SELECT);
        qb.push(" FROM posts p ");
        qb.push(POST_JOINS);
        qb.push(" WHERE 1=1 ");
        Self::apply_scope_conditions(&mut qb, scope);
        qb.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ");
        qb.push_bind(i64::from(limit));
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn count_posts(&self, scope: PostListScope) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts p WHERE 1=1 ");
        Self::apply_scope_conditions(&mut qb, scope);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let sql = format!("{POST_SELECT} FROM posts p {POST_JOINS} WHERE p.id = $1");
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }

    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let sql = format!(
            "WITH p AS ( \
                 INSERT INTO posts (text, author_id, group_id, image) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING id, text, created_at, image, author_id, group_id \
             ) {POST_SELECT} FROM p {POST_JOINS}"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(params.text)
            .bind(params.author_id)
            .bind(params.group_id)
            .bind(params.image)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let sql = format!(
            "WITH p AS ( \
                 UPDATE posts SET text = $2, group_id = $3, image = $4 \
                 WHERE id = $1 \
                 RETURNING id, text, created_at, image, author_id, group_id \
             ) {POST_SELECT} FROM p {POST_JOINS}"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(params.id)
            .bind(params.text)
            .bind(params.group_id)
            .bind(params.image)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(PostRecord::from).ok_or(RepoError::NotFound)
    }
}
