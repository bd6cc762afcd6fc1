// src/github/client.rs

//! GitHub REST API client.
//!
//! # Rate limiting
//!
//! HTTP 403 and 429 are both reported as [`AppError::RateLimited`]. The
//! client never sleeps on its own; pacing and back-off belong to the
//! pipeline stage making the call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, LINK};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{AppError, Result};
use crate::github::{Adoption, CodeHost, RepoDetails, SearchPage};
use crate::models::GitHubConfig;
use crate::utils::{http::create_async_client, truncate};

/// Longest response body excerpt kept in error messages.
const ERROR_BODY_CHARS: usize = 200;

/// GitHub API client.
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CommitItem {
    html_url: String,
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    author: Option<Signature>,
    committer: Option<Signature>,
}

#[derive(Debug, Deserialize)]
struct Signature {
    date: Option<DateTime<Utc>>,
}

impl GitHubClient {
    /// Create a client from the `[github]` config section.
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        Url::parse(&config.api_url)?;
        Ok(Self {
            client: create_async_client(config)?,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Send a request and decode a JSON body, mapping error statuses.
    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<(T, HeaderMap)> {
        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();

        if status.is_success() {
            let body = response.json::<T>().await?;
            return Ok((body, headers));
        }

        let body = response.text().await.unwrap_or_default();
        let message = truncate(body.trim(), ERROR_BODY_CHARS);
        match status {
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                Err(AppError::rate_limited(endpoint, message))
            }
            _ => Err(AppError::api(status.as_u16(), endpoint, message)),
        }
    }

    async fn commits_page(
        &self,
        full_name: &str,
        path: &str,
        page: u32,
    ) -> Result<(Vec<CommitItem>, HeaderMap)> {
        let endpoint = format!("/repos/{full_name}/commits");
        let page = page.to_string();
        let request = self.client.get(self.url(&endpoint)).query(&[
            ("path", path),
            ("per_page", "1"),
            ("page", page.as_str()),
        ]);
        self.send_json(&endpoint, request).await
    }
}

/// Extract the page number of the `rel="last"` entry of a `Link` header.
pub fn last_page(link: &str) -> Option<u32> {
    link.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_last = parts.any(|p| p.trim() == r#"rel="last""#);
        if !is_last {
            return None;
        }
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        let url = Url::parse(target).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "page")
            .and_then(|(_, value)| value.parse().ok())
    })
}

#[async_trait]
impl CodeHost for GitHubClient {
    async fn search_code(&self, query: &str, page: u32, per_page: u32) -> Result<SearchPage> {
        let endpoint = "/search/code";
        let request = self.client.get(self.url(endpoint)).query(&[
            ("q", query.to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ]);
        let (results, _) = self.send_json(endpoint, request).await?;
        Ok(results)
    }

    async fn repository(&self, full_name: &str) -> Result<RepoDetails> {
        let endpoint = format!("/repos/{full_name}");
        let request = self.client.get(self.url(&endpoint));
        let (details, _) = self.send_json(&endpoint, request).await?;
        Ok(details)
    }

    async fn first_commit(&self, full_name: &str, path: &str) -> Result<Adoption> {
        // With one commit per page, the last page holds the oldest commit
        let (mut commits, headers) = self.commits_page(full_name, path, 1).await?;

        let last = headers
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(last_page);
        if let Some(last) = last.filter(|&p| p > 1) {
            log::debug!("{full_name}: {path} has {last} commits, fetching the oldest");
            commits = self.commits_page(full_name, path, last).await?.0;
        }

        let endpoint = format!("/repos/{full_name}/commits");
        let oldest = commits
            .pop()
            .ok_or_else(|| AppError::api(404, &endpoint, format!("no commits touch {path}")))?;

        let date = oldest
            .commit
            .author
            .and_then(|s| s.date)
            .or_else(|| oldest.commit.committer.and_then(|s| s.date))
            .ok_or_else(|| AppError::api(422, &endpoint, "commit carries no date"))?;

        Ok(Adoption {
            date,
            commit_url: oldest.html_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GitHubClient {
        GitHubClient::new(&GitHubConfig {
            api_url: server.uri(),
            token: Some("test-token".to_string()),
            ..GitHubConfig::default()
        })
        .unwrap()
    }

    fn commit(sha: &str, date: &str) -> serde_json::Value {
        json!({
            "sha": sha,
            "html_url": format!("https://github.com/acme/api/commit/{sha}"),
            "commit": {
                "author": { "name": "dev", "date": date },
                "committer": { "name": "dev", "date": date }
            }
        })
    }

    #[test]
    fn test_last_page_parsing() {
        let link = r#"<https://api.github.com/repositories/1/commits?path=Dockerfile&per_page=1&page=2>; rel="next", <https://api.github.com/repositories/1/commits?path=Dockerfile&per_page=1&page=37>; rel="last""#;
        assert_eq!(last_page(link), Some(37));
        assert_eq!(last_page(r#"<https://x.test/a?page=2>; rel="next""#), None);
        assert_eq!(last_page("garbage"), None);
    }

    #[tokio::test]
    async fn test_search_code_sends_query_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/code"))
            .and(query_param("q", r#""dhi.io" language:Dockerfile"#))
            .and(query_param("page", "2"))
            .and(query_param("per_page", "100"))
            .and(header("authorization", "Bearer test-token"))
            .and(header("x-github-api-version", "2022-11-28"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_count": 150,
                "incomplete_results": false,
                "items": [{
                    "path": "build/Dockerfile",
                    "repository": {
                        "full_name": "acme/api",
                        "html_url": "https://github.com/acme/api"
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client_for(&server)
            .search_code(r#""dhi.io" language:Dockerfile"#, 2, 100)
            .await
            .unwrap();
        assert_eq!(page.total_count, 150);
        assert_eq!(page.items[0].repository.full_name, "acme/api");
        assert_eq!(page.items[0].path, "build/Dockerfile");
    }

    #[tokio::test]
    async fn test_forbidden_and_too_many_requests_are_rate_limits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/code"))
            .respond_with(
                ResponseTemplate::new(403).set_body_string("secondary rate limit exceeded"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/api"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.search_code("q", 1, 100).await.unwrap_err();
        assert!(err.is_rate_limited());
        assert!(err.to_string().contains("secondary rate limit"));

        let err = client.repository("acme/api").await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_repository_not_found_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;

        let err = client_for(&server).repository("acme/gone").await.unwrap_err();
        assert!(matches!(err, AppError::Api { status: 404, .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_repository_details_null_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "full_name": "acme/api",
                "html_url": "https://github.com/acme/api",
                "description": null,
                "stargazers_count": 1200,
                "language": null
            })))
            .mount(&server)
            .await;

        let details = client_for(&server).repository("acme/api").await.unwrap();
        assert_eq!(details.stargazers_count, 1200);
        assert!(details.description.is_none());
    }

    #[tokio::test]
    async fn test_first_commit_follows_last_page() {
        let server = MockServer::start().await;
        let last = format!(
            r#"<{}/repos/acme/api/commits?path=Dockerfile&per_page=1&page=3>; rel="last""#,
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/repos/acme/api/commits"))
            .and(query_param("page", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", last.as_str())
                    .set_body_json(json!([commit("newest", "2024-05-01T00:00:00Z")])),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/api/commits"))
            .and(query_param("page", "3"))
            .and(query_param("path", "Dockerfile"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([commit("oldest", "2024-01-15T10:00:00Z")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let adoption = client_for(&server)
            .first_commit("acme/api", "Dockerfile")
            .await
            .unwrap();
        assert_eq!(
            adoption.date,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
        );
        assert!(adoption.commit_url.ends_with("/commit/oldest"));
    }

    #[tokio::test]
    async fn test_first_commit_single_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/api/commits"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([commit("only", "2024-02-01T00:00:00Z")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let adoption = client_for(&server)
            .first_commit("acme/api", "Dockerfile")
            .await
            .unwrap();
        assert!(adoption.commit_url.ends_with("/commit/only"));
    }

    #[tokio::test]
    async fn test_first_commit_without_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/api/commits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .first_commit("acme/api", "Dockerfile")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Api { status: 404, .. }));
    }
}
