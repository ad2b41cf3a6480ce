#[cfg(test)]
mod tests {
    use crate::error::CrawlError;
    use crate::http::RetryPolicy;
    use crate::test_utilities::{fast_client, fast_client_with_token};
    use chrono::Utc;
    use serde_json::json;
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rate_limited(reset: i64) -> ResponseTemplate {
        ResponseTemplate::new(429)
            .insert_header("X-RateLimit-Remaining", "0")
            .insert_header("X-RateLimit-Reset", reset.to_string().as_str())
    }

    /// Test a plain 200: body and headers are both handed back.
    #[tokio::test]
    async fn test_fetch_returns_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/projects/pypi/keras"))
            .and(query_param("per_page", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"name": "keras"}))
                    .insert_header("total-count", "141"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = fast_client();
        let url = format!("{}/api/v1/projects/pypi/keras", server.uri());
        let resp = client.fetch(&url, &[("per_page", "1")]).await.unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.body["name"], "keras");
        assert_eq!(resp.header_u64("total-count"), Some(141));
    }

    /// Test that 500/503 responses are retried and a later 200 wins.
    #[tokio::test]
    async fn test_transient_errors_recover_within_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2])))
            .mount(&server)
            .await;

        let resp = fast_client()
            .fetch(&format!("{}/flaky", server.uri()), &[])
            .await
            .unwrap();
        assert_eq!(resp.body, json!([1, 2]));
    }

    /// Test that a server that never recovers fails after `max_attempts` requests.
    #[tokio::test]
    async fn test_persistent_500_exhausts_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = fast_client()
            .fetch(&format!("{}/broken", server.uri()), &[])
            .await
            .unwrap_err();

        match err {
            CrawlError::Http { status, reason, .. } => {
                assert_eq!(status, 500);
                assert_eq!(reason, "Internal Server Error");
            }
            other => panic!("expected Http error, got {:?}", other),
        }
    }

    /// Test: a 403 without `x-ratelimit-remaining: 0` is an ordinary HTTP error.
    #[tokio::test]
    async fn test_forbidden_without_quota_signal_is_plain_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/private"))
            .respond_with(ResponseTemplate::new(403))
            .expect(3)
            .mount(&server)
            .await;

        let err = fast_client()
            .fetch(&format!("{}/private", server.uri()), &[])
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(403));
    }

    /// Test rate limit handling: waiting for a reset does not count as an attempt.
    #[tokio::test]
    async fn test_rate_limit_waits_do_not_consume_retry_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(rate_limited(Utc::now().timestamp()))
            .up_to_n_times(5)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let client = fast_client();
        assert_eq!(client.policy().max_attempts, 3);

        let resp = client
            .fetch(&format!("{}/limited", server.uri()), &[])
            .await
            .unwrap();
        assert_eq!(resp.body["ok"], true);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 6);
    }

    /// Test that the client sleeps until `x-ratelimit-reset` before retrying.
    #[tokio::test]
    async fn test_rate_limit_sleeps_until_reset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(rate_limited(Utc::now().timestamp() + 2))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = fast_client().with_policy(RetryPolicy {
            max_attempts: 3,
            retry_delay: Duration::from_millis(5),
            rate_limit_margin: Duration::ZERO,
        });

        let started = Instant::now();
        client
            .fetch(&format!("{}/limited", server.uri()), &[])
            .await
            .unwrap();
        assert!(
            started.elapsed() >= Duration::from_secs(2),
            "waited only {:?}",
            started.elapsed()
        );
    }

    /// Test that a malformed body is reported once as a parse error.
    #[tokio::test]
    async fn test_invalid_json_is_parse_error_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let err = fast_client()
            .fetch(&format!("{}/html", server.uri()), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Parse(_)));
    }

    /// Test: nothing is listening on the port.
    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        // Reserve a port, then free it so nothing is listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = fast_client()
            .fetch(&format!("http://127.0.0.1:{}/gone", port), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Transport { .. }));
    }

    /// Test that cancelling the token ends a long rate-limit wait early.
    #[tokio::test]
    async fn test_cancellation_interrupts_rate_limit_wait() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(rate_limited(Utc::now().timestamp() + 60))
            .mount(&server)
            .await;

        let token = CancellationToken::new();
        let client = fast_client_with_token(token.clone());
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });

        let started = Instant::now();
        let err = client
            .fetch(&format!("{}/limited", server.uri()), &[])
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, CrawlError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
