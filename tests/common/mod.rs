#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use http_body_util::BodyExt;
use tempfile::TempDir;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tower::ServiceExt;

use penfeed::application::accounts::{AccountService, SignupForm};
use penfeed::application::feed::FeedService;
use penfeed::application::follows::FollowService;
use penfeed::application::posts::PostService;
use penfeed::application::repos::{
    CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams, CreateSessionParams,
    CreateUserParams, FollowsRepo, GroupsRepo, HealthRepo, PostListScope, PostsRepo, RepoError,
    SessionsRepo, UpdatePostParams, UsersRepo,
};
use penfeed::cache::FeedCache;
use penfeed::domain::entities::{
    CommentRecord, GroupRecord, PostGroupRef, PostRecord, SessionRecord, UserRecord,
};
use penfeed::infra::http::{AdminState, HttpState, build_admin_router, build_router};
use penfeed::infra::media::MediaStorage;

pub const PASSWORD: &str = "correct-horse-42";
pub const SESSION_COOKIE: &str = "penfeed_session";

/// A 1x1 GIF.
pub const TINY_GIF: &[u8] = b"GIF89a\x01\x00\x01\x00\x80\x00\x00\x00\x00\x00\xff\xff\xff\x21\xf9\x04\x01\x00\x00\x00\x00\x2c\x00\x00\x00\x00\x01\x00\x01\x00\x00\x02\x02\x44\x01\x00\x3b";

#[derive(Clone)]
struct StoredPost {
    id: i64,
    text: String,
    created_at: OffsetDateTime,
    image: Option<String>,
    author_id: i64,
    group_id: Option<i64>,
}

#[derive(Default)]
struct StoreState {
    next_id: i64,
    users: Vec<UserRecord>,
    sessions: HashMap<String, SessionRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<StoredPost>,
    comments: Vec<CommentRecord>,
    follows: HashSet<(i64, i64)>,
}

impl StoreState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn hydrate(&self, post: &StoredPost) -> Result<PostRecord, RepoError> {
        let author = self
            .users
            .iter()
            .find(|user| user.id == post.author_id)
            .ok_or_else(|| RepoError::Integrity {
                message: format!("missing author {}", post.author_id),
            })?;
        let group = post.group_id.and_then(|id| {
            self.groups.iter().find(|group| group.id == id).map(|group| PostGroupRef {
                id: group.id,
                slug: group.slug.clone(),
                title: group.title.clone(),
            })
        });

        Ok(PostRecord {
            id: post.id,
            text: post.text.clone(),
            created_at: post.created_at,
            image: post.image.clone(),
            author_id: author.id,
            author_username: author.username.clone(),
            author_name: author.display_name(),
            group,
        })
    }

    fn scoped(&self, scope: PostListScope) -> Vec<&StoredPost> {
        let mut posts: Vec<&StoredPost> = self
            .posts
            .iter()
            .filter(|post| match scope {
                PostListScope::All => true,
                PostListScope::Group(id) => post.group_id == Some(id),
                PostListScope::Author(id) => post.author_id == id,
                PostListScope::FollowedBy(user_id) => {
                    self.follows.contains(&(user_id, post.author_id))
                }
            })
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        posts
    }
}

/// Every repository seam backed by one mutex-guarded map set.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    /// A user without a usable password; enough for authoring fixtures.
    pub async fn insert_user(&self, username: &str) -> UserRecord {
        self.create_user(CreateUserParams {
            username: username.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: format!("{username}@example.com"),
            password_hash: String::new(),
        })
        .await
        .expect("insert user")
    }

    pub async fn insert_group(&self, title: &str, slug: &str) -> GroupRecord {
        self.create_group(CreateGroupParams {
            title: title.to_string(),
            slug: slug.to_string(),
            description: format!("About {title}"),
        })
        .await
        .expect("insert group")
    }

    pub async fn insert_post(&self, author: &UserRecord, text: &str, group_id: Option<i64>) -> PostRecord {
        self.create_post(CreatePostParams {
            author_id: author.id,
            text: text.to_string(),
            group_id,
            image: None,
        })
        .await
        .expect("insert post")
    }

    pub async fn post_count(&self) -> usize {
        self.state.lock().await.posts.len()
    }

    pub async fn comments_of(&self, post_id: i64) -> Vec<CommentRecord> {
        self.list_comments(post_id).await.expect("list comments")
    }

    pub async fn follow_count(&self) -> usize {
        self.state.lock().await.follows.len()
    }

    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }
}

#[async_trait]
impl UsersRepo for InMemoryStore {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut state = self.state.lock().await;
        if state.users.iter().any(|user| user.username == params.username) {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }
        let user = UserRecord {
            id: state.next_id(),
            username: params.username,
            first_name: params.first_name,
            last_name: params.last_name,
            email: params.email,
            password_hash: params.password_hash,
            is_staff: false,
            date_joined: OffsetDateTime::now_utc(),
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|user| user.id == id).cloned())
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .iter_mut()
            .find(|user| user.id == id)
            .ok_or(RepoError::NotFound)?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn set_staff(&self, id: i64, is_staff: bool) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .iter_mut()
            .find(|user| user.id == id)
            .ok_or(RepoError::NotFound)?;
        user.is_staff = is_staff;
        Ok(())
    }
}

#[async_trait]
impl SessionsRepo for InMemoryStore {
    async fn create_session(&self, params: CreateSessionParams) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        state.sessions.insert(
            params.token_hash.clone(),
            SessionRecord {
                token_hash: params.token_hash,
                user_id: params.user_id,
                created_at: OffsetDateTime::now_utc(),
                expires_at: params.expires_at,
            },
        );
        Ok(())
    }

    async fn find_session_user(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<UserRecord>, RepoError> {
        let state = self.state.lock().await;
        let Some(session) = state
            .sessions
            .get(token_hash)
            .filter(|session| session.expires_at > now)
        else {
            return Ok(None);
        };
        Ok(state
            .users
            .iter()
            .find(|user| user.id == session.user_id)
            .cloned())
    }

    async fn delete_session(&self, token_hash: &str) -> Result<(), RepoError> {
        self.state.lock().await.sessions.remove(token_hash);
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let mut state = self.state.lock().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, session| session.expires_at > now);
        Ok((before - state.sessions.len()) as u64)
    }
}

#[async_trait]
impl GroupsRepo for InMemoryStore {
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let state = self.state.lock().await;
        let mut groups = state.groups.clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(groups)
    }

    async fn find_group_by_id(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state.groups.iter().find(|group| group.id == id).cloned())
    }

    async fn find_group_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state.groups.iter().find(|group| group.slug == slug).cloned())
    }

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut state = self.state.lock().await;
        if state.groups.iter().any(|group| group.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "groups_slug_key".to_string(),
            });
        }
        let group = GroupRecord {
            id: state.next_id(),
            title: params.title,
            slug: params.slug,
            description: params.description,
        };
        state.groups.push(group.clone());
        Ok(group)
    }
}

#[async_trait]
impl PostsRepo for InMemoryStore {
    async fn list_posts(
        &self,
        scope: PostListScope,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let state = self.state.lock().await;
        state
            .scoped(scope)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|post| state.hydrate(post))
            .collect()
    }

    async fn count_posts(&self, scope: PostListScope) -> Result<u64, RepoError> {
        let state = self.state.lock().await;
        Ok(state.scoped(scope).len() as u64)
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let state = self.state.lock().await;
        state
            .posts
            .iter()
            .find(|post| post.id == id)
            .map(|post| state.hydrate(post))
            .transpose()
    }

    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.state.lock().await;
        let post = StoredPost {
            id: state.next_id(),
            text: params.text,
            created_at: OffsetDateTime::now_utc(),
            image: params.image,
            author_id: params.author_id,
            group_id: params.group_id,
        };
        let record = state.hydrate(&post)?;
        state.posts.push(post);
        Ok(record)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.state.lock().await;
        let post = state
            .posts
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        post.text = params.text;
        post.group_id = params.group_id;
        post.image = params.image;
        let post = post.clone();
        state.hydrate(&post)
    }
}

#[async_trait]
impl CommentsRepo for InMemoryStore {
    async fn list_comments(&self, post_id: i64) -> Result<Vec<CommentRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut state = self.state.lock().await;
        let author_username = state
            .users
            .iter()
            .find(|user| user.id == params.author_id)
            .map(|user| user.username.clone())
            .ok_or(RepoError::NotFound)?;
        let comment = CommentRecord {
            id: state.next_id(),
            post_id: params.post_id,
            author_id: params.author_id,
            author_username,
            text: params.text,
            created_at: OffsetDateTime::now_utc(),
        };
        state.comments.push(comment.clone());
        Ok(comment)
    }
}

#[async_trait]
impl FollowsRepo for InMemoryStore {
    async fn follow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        Ok(self.state.lock().await.follows.insert((user_id, author_id)))
    }

    async fn unfollow(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        Ok(self.state.lock().await.follows.remove(&(user_id, author_id)))
    }

    async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, RepoError> {
        Ok(self
            .state
            .lock()
            .await
            .follows
            .contains(&(user_id, author_id)))
    }
}

#[async_trait]
impl HealthRepo for InMemoryStore {
    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub admin: Router,
    pub store: Arc<InMemoryStore>,
    pub accounts: Arc<AccountService>,
    pub feed_cache: FeedCache,
    pub media: Arc<MediaStorage>,
    _media_dir: TempDir,
}

pub fn build_app() -> TestApp {
    build_app_with_ttl(Duration::from_secs(20))
}

pub fn build_app_with_ttl(cache_ttl: Duration) -> TestApp {
    let store = Arc::new(InMemoryStore::default());
    let media_dir = tempfile::tempdir().expect("media tempdir");
    let media = Arc::new(MediaStorage::new(media_dir.path().to_path_buf()).expect("media storage"));

    let feed = Arc::new(FeedService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        NonZeroU32::new(10).expect("page size"),
    ));
    let posts = Arc::new(PostService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        media.clone(),
    ));
    let follows = Arc::new(FollowService::new(store.clone(), store.clone()));
    let accounts = Arc::new(AccountService::new(
        store.clone(),
        store.clone(),
        NonZeroU32::new(1_000).expect("rounds"),
        Duration::from_secs(3600),
    ));
    let feed_cache = FeedCache::new(cache_ttl);

    let router = build_router(HttpState {
        feed,
        posts,
        follows,
        accounts: accounts.clone(),
        feed_cache: feed_cache.clone(),
        media: media.clone(),
        session_cookie: SESSION_COOKIE.to_string(),
        max_request_bytes: 1024 * 1024,
    });
    let admin = build_admin_router(AdminState {
        feed_cache: feed_cache.clone(),
        health: store.clone(),
    });

    TestApp {
        router,
        admin,
        store,
        accounts,
        feed_cache,
        media,
        _media_dir: media_dir,
    }
}

impl TestApp {
    pub async fn signup(&self, username: &str) -> UserRecord {
        self.accounts
            .signup(&SignupForm {
                first_name: String::new(),
                last_name: String::new(),
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password1: PASSWORD.to_string(),
                password2: PASSWORD.to_string(),
            })
            .await
            .expect("signup")
    }

    /// `Cookie` header value of a fresh session for `username`.
    pub async fn login(&self, username: &str) -> String {
        let (_, session) = self
            .accounts
            .login(username, PASSWORD)
            .await
            .expect("login");
        format!("{SESSION_COOKIE}={}", session.token)
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    pub async fn send_admin(&self, request: Request<Body>) -> Response<Body> {
        self.admin
            .clone()
            .oneshot(request)
            .await
            .expect("admin response")
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).expect("request"))
            .await
    }

    pub async fn post_form(&self, uri: &str, cookie: Option<&str>, body: &str) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).expect("request"))
            .await
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes()
        .to_vec()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).expect("utf-8 body")
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("location header")
}

/// A `multipart/form-data` body built from text fields and an optional file part.
pub struct MultipartBody {
    boundary: &'static str,
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self {
            boundary: "penfeed-test-boundary",
            body: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n",
                self.boundary
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn into_request(mut self, uri: &str, cookie: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", self.boundary),
            )
            .header(header::COOKIE, cookie)
            .body(Body::from(self.body))
            .expect("multipart request")
    }
}
