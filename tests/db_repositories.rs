use std::collections::HashSet;

use sqlx::PgPool;
use time::{Duration, OffsetDateTime};

use penfeed::application::repos::{
    CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams, CreateSessionParams,
    CreateUserParams, FollowsRepo, GroupsRepo, HealthRepo, PostListScope, PostsRepo, RepoError,
    SessionsRepo, UpdatePostParams, UsersRepo,
};
use penfeed::domain::entities::UserRecord;
use penfeed::infra::db::PostgresRepositories;

async fn user(repos: &PostgresRepositories, username: &str) -> UserRecord {
    repos
        .create_user(CreateUserParams {
            username: username.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: format!("{username}@example.com"),
            password_hash: "$pbkdf2-sha256$placeholder".to_string(),
        })
        .await
        .expect("create user")
}

#[sqlx::test(migrations = "./migrations")]
async fn schema_has_feed_indexes(pool: PgPool) {
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT indexname FROM pg_indexes WHERE schemaname = 'public' AND tablename = 'posts'",
    )
    .fetch_all(&pool)
    .await
    .expect("fetch post indexes");

    let indexes: HashSet<String> = rows.into_iter().collect();
    for expected in [
        "posts_created_at_idx",
        "posts_author_id_idx",
        "posts_group_id_idx",
    ] {
        assert!(indexes.contains(expected), "missing {expected}");
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn duplicate_usernames_report_the_constraint(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    user(&repos, "ada").await;

    let err = repos
        .create_user(CreateUserParams {
            username: "ada".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            password_hash: String::new(),
        })
        .await
        .expect_err("duplicate username");
    match err {
        RepoError::Duplicate { constraint } => assert_eq!(constraint, "users_username_key"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn sessions_expire(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let ada = user(&repos, "ada").await;
    let now = OffsetDateTime::now_utc();

    repos
        .create_session(CreateSessionParams {
            token_hash: "live".to_string(),
            user_id: ada.id,
            expires_at: now + Duration::hours(1),
        })
        .await
        .expect("live session");
    repos
        .create_session(CreateSessionParams {
            token_hash: "stale".to_string(),
            user_id: ada.id,
            expires_at: now - Duration::hours(1),
        })
        .await
        .expect("stale session");

    let found = repos
        .find_session_user("live", now)
        .await
        .expect("lookup live");
    assert_eq!(found.map(|user| user.username), Some("ada".to_string()));
    assert!(
        repos
            .find_session_user("stale", now)
            .await
            .expect("lookup stale")
            .is_none()
    );

    assert_eq!(repos.delete_expired_sessions(now).await.expect("purge"), 1);
    repos.delete_session("live").await.expect("logout");
    assert!(
        repos
            .find_session_user("live", now)
            .await
            .expect("lookup after logout")
            .is_none()
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn post_listings_are_scoped_and_newest_first(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let ada = user(&repos, "ada").await;
    let bob = user(&repos, "bob").await;
    let reader = user(&repos, "reader").await;
    let cats = repos
        .create_group(CreateGroupParams {
            title: "Cats".to_string(),
            slug: "cats".to_string(),
            description: String::new(),
        })
        .await
        .expect("create group");

    let first = repos
        .create_post(CreatePostParams {
            author_id: ada.id,
            text: "first".to_string(),
            group_id: Some(cats.id),
            image: None,
        })
        .await
        .expect("first post");
    let second = repos
        .create_post(CreatePostParams {
            author_id: bob.id,
            text: "second".to_string(),
            group_id: None,
            image: Some("posts/pic.gif".to_string()),
        })
        .await
        .expect("second post");

    assert_eq!(first.group.as_ref().map(|g| g.slug.as_str()), Some("cats"));
    assert_eq!(second.author_username, "bob");

    let all = repos
        .list_posts(PostListScope::All, 0, 10)
        .await
        .expect("list all");
    let ids: Vec<i64> = all.iter().map(|post| post.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    assert_eq!(
        repos
            .count_posts(PostListScope::Group(cats.id))
            .await
            .expect("count group"),
        1
    );
    assert_eq!(
        repos
            .count_posts(PostListScope::Author(bob.id))
            .await
            .expect("count author"),
        1
    );

    let page_two = repos
        .list_posts(PostListScope::All, 1, 1)
        .await
        .expect("offset listing");
    assert_eq!(page_two.len(), 1);
    assert_eq!(page_two[0].id, first.id);

    assert!(repos.follow(reader.id, ada.id).await.expect("follow"));
    assert!(!repos.follow(reader.id, ada.id).await.expect("follow again"));
    assert!(repos.is_following(reader.id, ada.id).await.expect("is following"));
    let followed = repos
        .list_posts(PostListScope::FollowedBy(reader.id), 0, 10)
        .await
        .expect("followed listing");
    assert_eq!(followed.len(), 1);
    assert_eq!(followed[0].id, first.id);

    assert!(repos.unfollow(reader.id, ada.id).await.expect("unfollow"));
    assert!(!repos.unfollow(reader.id, ada.id).await.expect("unfollow again"));
}

#[sqlx::test(migrations = "./migrations")]
async fn updates_keep_the_author_and_comments_list_oldest_first(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let ada = user(&repos, "ada").await;
    let bob = user(&repos, "bob").await;

    let post = repos
        .create_post(CreatePostParams {
            author_id: ada.id,
            text: "draft".to_string(),
            group_id: None,
            image: Some("posts/old.gif".to_string()),
        })
        .await
        .expect("create post");

    let updated = repos
        .update_post(UpdatePostParams {
            id: post.id,
            text: "final".to_string(),
            group_id: None,
            image: None,
        })
        .await
        .expect("update post");
    assert_eq!(updated.text, "final");
    assert_eq!(updated.author_id, ada.id);
    assert_eq!(updated.image, None);
    assert_eq!(updated.created_at, post.created_at);

    for text in ["one", "two"] {
        repos
            .create_comment(CreateCommentParams {
                post_id: post.id,
                author_id: bob.id,
                text: text.to_string(),
            })
            .await
            .expect("create comment");
    }
    let comments = repos.list_comments(post.id).await.expect("list comments");
    let texts: Vec<&str> = comments.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["one", "two"]);
    assert_eq!(comments[0].author_username, "bob");

    repos.health_check().await.expect("health check");
}
