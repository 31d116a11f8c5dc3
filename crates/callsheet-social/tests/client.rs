//! Integration tests for `XClient` using wiremock HTTP mocks.

use callsheet_social::{SocialSource, XClient};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> XClient {
    XClient::with_base_url("test-token", 5, base_url)
        .expect("client construction should not fail")
        .with_rate_limit_fallback(900)
}

fn timeline_body() -> serde_json::Value {
    serde_json::json!({
        "data": [
            {
                "id": "987",
                "text": "$BTC to 120k by Friday",
                "author_id": "123",
                "created_at": "2024-01-01T00:00:00.000Z",
                "attachments": {"media_keys": ["3_1", "7_2"]}
            },
            {
                "id": "986",
                "text": "gm",
                "author_id": "123",
                "created_at": "2023-12-31T09:00:00.000Z"
            }
        ],
        "includes": {
            "users": [{"id": "123", "username": "alice", "name": "Alice"}],
            "media": [
                {"media_key": "3_1", "type": "photo", "url": "https://pbs.example/chart.png"},
                {"media_key": "7_2", "type": "video",
                 "preview_image_url": "https://pbs.example/clip.jpg"}
            ]
        },
        "meta": {"result_count": 2}
    })
}

#[tokio::test]
async fn fetch_recent_posts_resolves_authors_media_and_headers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/123/tweets"))
        .and(header("authorization", "Bearer test-token"))
        .and(query_param("exclude", "replies,retweets"))
        .and(query_param("max_results", "5"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-rate-limit-remaining", "14")
                .insert_header("x-rate-limit-reset", "1704067260")
                .set_body_json(timeline_body()),
        )
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let result = client.fetch_recent_posts("123", 5).await;

    assert_eq!(result.posts.len(), 2);
    let first = &result.posts[0];
    assert_eq!(first.id, "987");
    assert_eq!(first.author_handle.as_deref(), Some("alice"));
    assert_eq!(
        first.media_urls,
        vec![
            "https://pbs.example/chart.png".to_string(),
            "https://pbs.example/clip.jpg".to_string()
        ]
    );
    assert_eq!(result.rate_limit.remaining, 14);
    assert_eq!(result.rate_limit.reset_at, 1_704_067_260);
}

#[tokio::test]
async fn rate_limited_response_reports_exhausted_budget() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/123/tweets"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("x-rate-limit-remaining", "0")
                .insert_header("x-rate-limit-reset", "1704067260")
                .set_body_json(serde_json::json!({"title": "Too Many Requests"})),
        )
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let result = client.fetch_recent_posts("123", 5).await;

    assert!(result.posts.is_empty());
    assert!(result.rate_limit.is_exhausted());
    assert_eq!(result.rate_limit.reset_at, 1_704_067_260);
}

#[tokio::test]
async fn server_error_degrades_to_empty_with_defaults() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/123/tweets"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let before = chrono::Utc::now().timestamp();
    let result = client.fetch_recent_posts("123", 5).await;

    assert!(result.posts.is_empty());
    assert_eq!(result.rate_limit.remaining, 1);
    assert!(result.rate_limit.reset_at >= before + 900);
}

#[tokio::test]
async fn malformed_body_degrades_to_empty() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/123/tweets"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let result = client.fetch_recent_posts("123", 5).await;
    assert!(result.posts.is_empty());
}

#[tokio::test]
async fn unreachable_server_degrades_to_empty() {
    let client = test_client("http://127.0.0.1:9");
    let result = client.fetch_recent_posts("123", 5).await;
    assert!(result.posts.is_empty());
    assert_eq!(result.rate_limit.remaining, 1);
}

#[tokio::test]
async fn lookup_user_returns_profile() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/by/username/alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "id": "123",
                "name": "Alice",
                "username": "alice",
                "verified": false,
                "profile_image_url": "https://pbs.example/alice.jpg",
                "created_at": "2019-04-01T00:00:00.000Z"
            }
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let user = client
        .lookup_user("@alice")
        .await
        .expect("lookup")
        .expect("user");
    assert_eq!(user.id, "123");
    assert_eq!(user.username, "alice");
}

#[tokio::test]
async fn lookup_user_unknown_handle_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/by/username/ghost"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errors": [{"detail": "Could not find user with username: [ghost]."}]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let user = client.lookup_user("ghost").await.expect("lookup");
    assert!(user.is_none());
}
