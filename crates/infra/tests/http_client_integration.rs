//! Rate-limit cooperation through the shared HTTP client, against a live
//! mock server on the wall clock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use relaypost_common::resilience::HostRateLimiter;
use relaypost_core::SyncError;
use relaypost_infra::http::{HttpClient, RequestPolicy};
use reqwest::Method;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> HttpClient {
    HttpClient::builder()
        .limiter(Arc::new(HostRateLimiter::without_pacing()))
        .build()
        .expect("http client")
}

/// Validates a 429 window on one call holds back an unrelated later call.
///
/// Assertions:
/// - the first call surfaces the 429 with its 5s hint
/// - a second call to another path, issued 1s later, waits at least 4s more
/// - the second call reaches the server exactly once (no retry loop)
#[tokio::test(flavor = "multi_thread")]
async fn rate_limit_hint_holds_back_the_next_call_to_the_host() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "5"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client();
    let policy = RequestPolicy::posts(1, Duration::from_secs(10));

    let posts = format!("{}/wp-json/wp/v2/posts", server.uri());
    let tags = format!("{}/wp-json/wp/v2/tags", server.uri());

    let first = client.execute(client.request(Method::GET, posts), &policy).await.unwrap_err();
    match first {
        SyncError::RateLimited { retry_after, .. } => {
            assert_eq!(retry_after, Some(Duration::from_secs(5)));
        }
        other => panic!("expected rate limit, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_secs(1)).await;

    let started = Instant::now();
    let second = client
        .execute(client.request(Method::GET, tags), &policy)
        .await
        .expect("second call succeeds once the window closes");

    assert_eq!(second.status, 200);
    assert!(started.elapsed() >= Duration::from_secs(4), "waited only {:?}", started.elapsed());
}

/// Validates a window on one host leaves other hosts alone.
///
/// Assertions:
/// - a call to a second mock server dispatches without waiting
#[tokio::test(flavor = "multi_thread")]
async fn rate_limit_window_is_scoped_to_the_host() {
    let limited = MockServer::start().await;
    let other = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
        .mount(&limited)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&other)
        .await;

    let client = client();
    let policy = RequestPolicy::posts(1, Duration::from_secs(10));
    assert!(client.execute(client.request(Method::GET, limited.uri()), &policy).await.is_err());

    let started = Instant::now();
    client.execute(client.request(Method::GET, other.uri()), &policy).await.expect("response");

    assert!(started.elapsed() < Duration::from_secs(5));
}
