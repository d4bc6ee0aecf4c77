// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `credential.rs`

#[cfg(test)]
mod tests {
    use crate::azure::credential::{
        AccessToken, CachedCredential, ClientSecretCredential, ManagedIdentityCredential,
        StaticTokenCredential, TokenCredential, http_client,
    };
    use crate::errors::NetworkError;
    use chrono::{TimeDelta, Utc};
    use reqwest::Client;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_client_secret_credential_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=app-1"))
            .and(body_string_contains("client_secret=s3cr%2Bt"))
            .and(body_string_contains(
                "scope=https%3A%2F%2Fmanagement.azure.com%2F.default",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "sp-token"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credential = ClientSecretCredential::new(
            Client::new(),
            &server.uri(),
            "tenant-1",
            "app-1",
            "s3cr+t",
            "https://management.azure.com/",
        );
        let token = credential.get_token().await.unwrap();

        assert_eq!(token.token, "sp-token");
        assert!(token.expires_at > Utc::now() + TimeDelta::seconds(3500));
    }

    #[tokio::test]
    async fn test_client_secret_credential_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let credential = ClientSecretCredential::new(
            Client::new(),
            &server.uri(),
            "tenant-1",
            "app-1",
            "wrong",
            "https://management.azure.com",
        );
        let err = credential.get_token().await.unwrap_err();

        assert!(matches!(err, NetworkError::Auth(ref msg) if msg.contains("invalid_client")));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_managed_identity_credential_queries_imds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata/identity/oauth2/token"))
            .and(header("Metadata", "true"))
            .and(query_param("api-version", "2018-02-01"))
            .and(query_param("resource", "https://management.azure.com/"))
            .and(query_param("client_id", "uami-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "mi-token",
                "expires_in": "86399",
                "expires_on": "1700000000",
                "resource": "https://management.azure.com/",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credential = ManagedIdentityCredential::new(
            Client::new(),
            "https://management.azure.com",
            Some("uami-1".to_string()),
        )
        .with_endpoint(format!("{}/metadata/identity/oauth2/token", server.uri()));
        let token = credential.get_token().await.unwrap();

        assert_eq!(token.token, "mi-token");
        assert!(token.is_fresh(300));
    }

    #[tokio::test]
    async fn test_unresponsive_imds_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata/identity/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": "late", "expires_in": "3600" }))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let credential = ManagedIdentityCredential::new(
            http_client(Duration::from_millis(200)).unwrap(),
            "https://management.azure.com",
            None,
        )
        .with_endpoint(format!("{}/metadata/identity/oauth2/token", server.uri()));

        let started = std::time::Instant::now();
        let err = credential.get_token().await.unwrap_err();

        assert!(matches!(err, NetworkError::Http(ref e) if e.is_timeout()), "{err}");
        assert!(err.is_transient());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_static_token_never_expires() {
        let token = StaticTokenCredential::new("fixed").get_token().await.unwrap();
        assert_eq!(token.token, "fixed");
        assert!(token.is_fresh(300));
    }

    struct CountingCredential {
        calls: Arc<AtomicUsize>,
        lifetime_secs: i64,
    }

    #[async_trait::async_trait]
    impl TokenCredential for CountingCredential {
        async fn get_token(&self) -> Result<AccessToken, NetworkError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AccessToken {
                token: format!("token-{n}"),
                expires_at: Utc::now() + TimeDelta::seconds(self.lifetime_secs),
            })
        }
    }

    #[tokio::test]
    async fn test_cached_credential_reuses_fresh_token() {
        let calls = Arc::new(AtomicUsize::new(0));
        let credential = CachedCredential::new(CountingCredential {
            calls: calls.clone(),
            lifetime_secs: 3600,
        });

        let first = credential.get_token().await.unwrap();
        let second = credential.get_token().await.unwrap();

        assert_eq!(first.token, "token-0");
        assert_eq!(second.token, "token-0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_credential_refreshes_near_expiry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let credential = CachedCredential::new(CountingCredential {
            calls: calls.clone(),
            lifetime_secs: 60,
        });

        credential.get_token().await.unwrap();
        let second = credential.get_token().await.unwrap();

        assert_eq!(second.token, "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_access_token_debug_is_redacted() {
        let token = AccessToken {
            token: "super-secret".to_string(),
            expires_at: Utc::now(),
        };
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("redacted"));
    }
}
