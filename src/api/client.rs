use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;
use uuid::Uuid;

use super::http::{send_with_retry, RetryPolicy};
use super::types::{strip_xssi, ApiError, FollowInfo, FollowInput};
use crate::config::Config;

/// Default CLI version (from Cargo.toml)
const DEFAULT_VERSION: &str = env!("CARGO_PKG_VERSION");

fn build_user_agent() -> String {
    format!("reviewtarget/{}", DEFAULT_VERSION)
}

/// Client for the `follow` endpoint of a change.
pub struct GerritClient {
    client: Client,
    base: Url,
    credentials: Option<(String, Option<String>)>,
    user_agent: String,
}

impl GerritClient {
    pub fn new(config: &Config) -> Result<Self> {
        let server_url = config.require_server_url()?;
        let base = Url::parse(server_url)
            .with_context(|| format!("Invalid server URL: {}", server_url))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("Invalid server URL: {}", server_url);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let credentials = config
            .username
            .clone()
            .map(|user| (user, config.http_password.clone()));

        Ok(Self {
            client,
            base,
            credentials,
            user_agent: build_user_agent(),
        })
    }

    /// URL of the follow endpoint for `change_id`.
    ///
    /// Authenticated requests go through the `/a/` prefix. The change id is
    /// percent-encoded as a single segment (`project~123` ids may contain `/`).
    pub fn follow_url(&self, change_id: &str) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow!("Server URL cannot be a base: {}", self.base))?;
            segments.pop_if_empty();
            if self.credentials.is_some() {
                segments.push("a");
            }
            segments.extend(["changes", change_id, "follow"]);
        }
        Ok(url)
    }

    /// Current review target, review files and follow version of a change.
    pub async fn get_follow(&self, change_id: &str) -> Result<FollowInfo> {
        let url = self.follow_url(change_id)?;
        let request_id = Uuid::new_v4().to_string();
        debug!("=== GET follow ===");
        debug!("URL: {}", url);

        let response = send_with_retry(RetryPolicy::default(), || {
            self.authorize(
                self.client
                    .get(url.clone())
                    .header("Accept", "application/json")
                    .header("User-Agent", &self.user_agent)
                    .header("x-request-id", &request_id),
            )
        })
        .await
        .with_context(|| format!("Failed to send request to {}", url))?;

        Self::read_follow(response, &request_id).await
    }

    /// Reconcile against `input`, creating a patch set when `do_update` is set.
    ///
    /// Dry runs are retried on transient failures; updates are sent once.
    pub async fn post_follow(&self, change_id: &str, input: &FollowInput) -> Result<FollowInfo> {
        let url = self.follow_url(change_id)?;
        let request_id = Uuid::new_v4().to_string();
        let policy = if input.do_update {
            RetryPolicy::none()
        } else {
            RetryPolicy::default()
        };
        debug!("=== POST follow ===");
        debug!("URL: {}", url);
        debug!(
            "do_update={} target={} files={:?}",
            input.do_update, input.new_review_target, input.new_review_files
        );

        let response = send_with_retry(policy, || {
            self.authorize(
                self.client
                    .post(url.clone())
                    .header("Content-Type", "application/json")
                    .header("User-Agent", &self.user_agent)
                    .header("x-request-id", &request_id)
                    .json(input),
            )
        })
        .await
        .with_context(|| format!("Failed to send request to {}", url))?;

        Self::read_follow(response, &request_id).await
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, password.as_ref()),
            None => request,
        }
    }

    async fn read_follow(response: reqwest::Response, request_id: &str) -> Result<FollowInfo> {
        let status = response.status();
        debug!("=== API Response ===");
        debug!("Status: {}", status);

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let api_error = ApiError::from_http_response(
                status.as_u16(),
                error_text,
                Some(request_id.to_string()),
            );
            if api_error.is_fatal() {
                error!("❌ {}", api_error.message);
                error!("   {}", api_error.user_hint());
            } else {
                error!(
                    "API request failed with {}: {} (request {})",
                    api_error.http_status,
                    api_error.message,
                    api_error.request_id.as_deref().unwrap_or("-")
                );
            }
            return Err(api_error.into());
        }

        let body = response
            .text()
            .await
            .context("Failed to read response body")?;
        serde_json::from_str(strip_xssi(&body)).context("Failed to parse follow response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str, user: Option<&str>) -> GerritClient {
        let config = Config {
            server_url: Some(url.to_string()),
            username: user.map(str::to_string),
            http_password: Some("secret".to_string()),
            ..Config::default()
        };
        GerritClient::new(&config).unwrap()
    }

    #[test]
    fn test_follow_url_authenticated() {
        let url = client("https://review.example.com", Some("alice"))
            .follow_url("1234")
            .unwrap();
        assert_eq!(url.as_str(), "https://review.example.com/a/changes/1234/follow");
    }

    #[test]
    fn test_follow_url_keeps_base_path() {
        let url = client("https://example.com/gerrit/", None)
            .follow_url("1234")
            .unwrap();
        assert_eq!(url.as_str(), "https://example.com/gerrit/changes/1234/follow");
    }

    #[test]
    fn test_follow_url_encodes_change_id() {
        let url = client("https://review.example.com/", Some("alice"))
            .follow_url("tools/app~42")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://review.example.com/a/changes/tools%2Fapp~42/follow"
        );
    }

    #[test]
    fn test_missing_server_url() {
        assert!(GerritClient::new(&Config::default()).is_err());
    }

    #[test]
    fn test_user_agent() {
        assert!(build_user_agent().starts_with("reviewtarget/"));
    }
}
