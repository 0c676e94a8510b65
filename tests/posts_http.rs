mod common;

use axum::http::{StatusCode, header};

use common::{MultipartBody, TINY_GIF, body_bytes, body_text, build_app, location};
use penfeed::domain::validation::{INVALID_CHOICE, INVALID_IMAGE, REQUIRED};

fn article_count(html: &str) -> usize {
    html.matches("<article>").count()
}

#[tokio::test]
async fn anonymous_create_redirects_to_login() {
    let app = build_app();

    let response = app.get("/create/", None).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/auth/login/?next=/create/");
}

#[tokio::test]
async fn creating_a_post_redirects_to_the_author_profile() {
    let app = build_app();
    app.signup("alice").await;
    let cookie = app.login("alice").await;
    let group = app.store.insert_group("Cats", "cats").await;

    let body = format!("text=Hello+from+alice&group={}", group.id);
    let response = app.post_form("/create/", Some(&cookie), &body).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/profile/alice/");
    assert_eq!(app.store.post_count().await, 1);

    let html = body_text(app.get("/group/cats/", None).await).await;
    assert!(html.contains("Hello from alice"));

    let html = body_text(app.get("/profile/alice/", None).await).await;
    assert!(html.contains("Hello from alice"));
    assert!(html.contains("Posts: 1"));
}

#[tokio::test]
async fn invalid_post_form_is_rendered_again_with_errors() {
    let app = build_app();
    app.signup("alice").await;
    let cookie = app.login("alice").await;

    let response = app
        .post_form("/create/", Some(&cookie), "text=+++&group=999")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains(REQUIRED));
    assert!(html.contains(INVALID_CHOICE));
    assert_eq!(app.store.post_count().await, 0);
}

#[tokio::test]
async fn uploaded_images_are_stored_and_served() {
    let app = build_app();
    app.signup("alice").await;
    let cookie = app.login("alice").await;

    let group = app.store.insert_group("Новости", "news").await;

    let request = MultipartBody::new()
        .text("text", "Новый пост")
        .text("group", &group.id.to_string())
        .file("image", "Small Pixel.GIF", "image/gif", TINY_GIF)
        .into_request("/create/", &cookie);
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/profile/alice/");

    let html = body_text(app.get("/group/news/", None).await).await;
    assert!(html.contains("Новый пост"));
    assert!(html.contains("/media/posts/small-pixel.gif"));

    let response = app.get("/media/posts/small-pixel.gif", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
        Some("image/gif")
    );
    assert_eq!(body_bytes(response).await, TINY_GIF);
}

#[tokio::test]
async fn non_image_uploads_are_rejected() {
    let app = build_app();
    app.signup("alice").await;
    let cookie = app.login("alice").await;

    let request = MultipartBody::new()
        .text("text", "Not a picture")
        .file("image", "notes.txt", "text/plain", b"plain text, no pixels here")
        .into_request("/create/", &cookie);
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains(INVALID_IMAGE));
    assert_eq!(app.store.post_count().await, 0);
}

#[tokio::test]
async fn only_the_author_can_edit() {
    let app = build_app();
    let alice = app.signup("alice").await;
    app.signup("bob").await;
    let post = app.store.insert_post(&alice, "Original text", None).await;
    let edit_path = format!("/posts/{}/edit/", post.id);
    let detail_path = format!("/posts/{}/", post.id);

    let bob = app.login("bob").await;
    let response = app.get(&edit_path, Some(&bob)).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), detail_path);

    let response = app
        .post_form(&edit_path, Some(&bob), "text=Hijacked")
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), detail_path);

    let alice_cookie = app.login("alice").await;
    let response = app.get(&edit_path, Some(&alice_cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Original text"));

    let response = app
        .post_form(&edit_path, Some(&alice_cookie), "text=Edited+text")
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), detail_path);

    let html = body_text(app.get(&detail_path, None).await).await;
    assert!(html.contains("Edited text"));
    assert!(!html.contains("Hijacked"));
}

#[tokio::test]
async fn editing_keeps_the_image_unless_cleared() {
    let app = build_app();
    app.signup("alice").await;
    let cookie = app.login("alice").await;

    let request = MultipartBody::new()
        .text("text", "With picture")
        .file("image", "pixel.gif", "image/gif", TINY_GIF)
        .into_request("/create/", &cookie);
    assert_eq!(app.send(request).await.status(), StatusCode::FOUND);

    let html = body_text(app.get("/", None).await).await;
    let post_id = html
        .split("href=\"/posts/")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .and_then(|id| id.parse::<i64>().ok())
        .expect("post id in feed");
    let edit_path = format!("/posts/{post_id}/edit/");
    let detail_path = format!("/posts/{post_id}/");

    let request = MultipartBody::new()
        .text("text", "Still with picture")
        .into_request(&edit_path, &cookie);
    assert_eq!(app.send(request).await.status(), StatusCode::FOUND);
    let html = body_text(app.get(&detail_path, None).await).await;
    assert!(html.contains("/media/posts/pixel.gif"));

    let request = MultipartBody::new()
        .text("text", "Picture removed")
        .text("image-clear", "on")
        .into_request(&edit_path, &cookie);
    assert_eq!(app.send(request).await.status(), StatusCode::FOUND);
    let html = body_text(app.get(&detail_path, None).await).await;
    assert!(html.contains("Picture removed"));
    assert!(!html.contains("/media/posts/pixel.gif"));
}

#[tokio::test]
async fn missing_and_malformed_post_ids_are_not_found() {
    let app = build_app();

    let response = app.get("/posts/999/", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("Page not found"));

    let response = app.get("/posts/abc/", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get("/group/nowhere/", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get("/profile/ghost/", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get("/no/such/page/", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn comments_require_login_and_an_existing_post() {
    let app = build_app();
    let alice = app.signup("alice").await;
    app.signup("bob").await;
    let post = app.store.insert_post(&alice, "Discuss", None).await;
    let comment_path = format!("/posts/{}/comment/", post.id);
    let detail_path = format!("/posts/{}/", post.id);

    let response = app.post_form(&comment_path, None, "text=hi").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(location(&response).starts_with("/auth/login/?next="));
    assert!(app.store.comments_of(post.id).await.is_empty());

    let bob = app.login("bob").await;
    let response = app
        .post_form(&comment_path, Some(&bob), "text=Nice+post")
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), detail_path);

    // Blank comments are dropped without an error page.
    let response = app.post_form(&comment_path, Some(&bob), "text=").await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let comments = app.store.comments_of(post.id).await;
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].author_username, "bob");

    let html = body_text(app.get(&detail_path, None).await).await;
    assert!(html.contains("Nice post"));

    let response = app
        .post_form("/posts/999/comment/", Some(&bob), "text=lost")
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn feeds_paginate_ten_per_page_and_clamp() {
    let app = build_app();
    let alice = app.store.insert_user("alice").await;
    for n in 0..13 {
        app.store
            .insert_post(&alice, &format!("post number {n}"), None)
            .await;
    }

    let html = body_text(app.get("/profile/alice/", None).await).await;
    assert_eq!(article_count(&html), 10);
    assert!(html.contains("post number 12"));

    let html = body_text(app.get("/profile/alice/?page=2", None).await).await;
    assert_eq!(article_count(&html), 3);
    assert!(html.contains("post number 0"));

    let response = app.get("/profile/alice/?page=99", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(article_count(&body_text(response).await), 3);

    let response = app.get("/profile/alice/?page=abc", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(article_count(&body_text(response).await), 10);
}

#[tokio::test]
async fn group_pages_only_list_their_posts() {
    let app = build_app();
    let alice = app.store.insert_user("alice").await;
    let cats = app.store.insert_group("Cats", "cats").await;
    let dogs = app.store.insert_group("Dogs", "dogs").await;
    app.store.insert_post(&alice, "meow", Some(cats.id)).await;
    app.store.insert_post(&alice, "woof", Some(dogs.id)).await;
    app.store.insert_post(&alice, "no group", None).await;

    let html = body_text(app.get("/group/cats/", None).await).await;
    assert!(html.contains("meow"));
    assert!(!html.contains("woof"));
    assert!(!html.contains("no group"));
    assert!(html.contains("About Cats"));
}
