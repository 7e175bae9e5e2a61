//! GitHub REST API client.

use std::time::Duration;

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::GitHubConfig;
use crate::errors::GitHubError;

/// Repository metadata returned by `GET /repos/{owner}/{repo}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRepository {
    pub id: i64,
    pub full_name: String,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub private: bool,
}

/// A repository webhook registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hook {
    pub id: i64,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub config: HookConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl Hook {
    /// `true` if the hook delivers to `callback_url` (trailing slashes
    /// ignored).
    pub fn targets(&self, callback_url: &str) -> bool {
        self.config
            .url
            .as_deref()
            .map(|u| u.trim_end_matches('/') == callback_url.trim_end_matches('/'))
            .unwrap_or(false)
    }
}

/// Body of `GET /repos/{owner}/{repo}/contents/{path}`.
#[derive(Debug, Deserialize)]
struct ContentEntry {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

/// Error body of a 422 response.
#[derive(Debug, Deserialize)]
struct ValidationFailure {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

/// Asynchronous GitHub REST API client.
///
/// The token is optional: push processing may run unauthenticated against
/// public repositories, while webhook management always supplies the
/// caller's credential through [`GitHubClient::with_token`].
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(
        api_url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
        token: Option<String>,
    ) -> Result<Self, GitHubError> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| GitHubError::ParseError(format!("invalid user agent: {e}")))?,
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        info!(api_url = %api_url, authenticated = token.is_some(), "created GitHubClient");
        Ok(Self {
            http,
            api_url,
            token,
        })
    }

    /// Build a client from the `[github]` config section, using the service
    /// token if one was resolved.
    pub fn from_config(cfg: &GitHubConfig) -> Result<Self, GitHubError> {
        Self::new(
            cfg.api_url.clone(),
            &cfg.user_agent,
            cfg.request_timeout(),
            cfg.token.clone(),
        )
    }

    /// A copy of this client that authenticates with `token`. The underlying
    /// connection pool is shared.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            http: self.http.clone(),
            api_url: self.api_url.clone(),
            token: Some(token.into()),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Probe a repository; used to validate a credential before touching
    /// its hooks.
    #[instrument(skip(self))]
    pub async fn get_repository(&self, repo: &str) -> Result<GitHubRepository, GitHubError> {
        let url = format!("{}/repos/{}", self.api_url, repo);
        let resp = self.authorized(self.http.get(&url)).send().await?;
        let resp = check_response(resp).await?;
        let info: GitHubRepository = resp.json().await?;
        debug!(full_name = %info.full_name, "fetched repository");
        Ok(info)
    }

    /// Register a push webhook delivering JSON to `callback_url`.
    #[instrument(skip(self, secret))]
    pub async fn create_hook(
        &self,
        repo: &str,
        callback_url: &str,
        secret: &str,
    ) -> Result<Hook, GitHubError> {
        let url = format!("{}/repos/{}/hooks", self.api_url, repo);
        let body = serde_json::json!({
            "name": "web", "active": true, "events": ["push"],
            "config": { "url": callback_url, "content_type": "json", "secret": secret, "insecure_ssl": "0" }
        });
        let resp = self.authorized(self.http.post(&url)).json(&body).send().await?;
        let resp = check_response(resp).await?;
        let hook: Hook = resp.json().await?;
        info!(hook_id = hook.id, "created webhook");
        Ok(hook)
    }

    #[instrument(skip(self))]
    pub async fn list_hooks(&self, repo: &str) -> Result<Vec<Hook>, GitHubError> {
        let url = format!("{}/repos/{}/hooks", self.api_url, repo);
        let resp = self
            .authorized(self.http.get(&url))
            .query(&[("per_page", "100")])
            .send()
            .await?;
        let resp = check_response(resp).await?;
        let hooks: Vec<Hook> = resp.json().await?;
        debug!(count = hooks.len(), "listed webhooks");
        Ok(hooks)
    }

    #[instrument(skip(self))]
    pub async fn get_hook(&self, repo: &str, hook_id: i64) -> Result<Hook, GitHubError> {
        let url = format!("{}/repos/{}/hooks/{}", self.api_url, repo, hook_id);
        let resp = self.authorized(self.http.get(&url)).send().await?;
        let resp = check_response(resp).await?;
        let hook: Hook = resp.json().await?;
        debug!(hook_id, active = hook.active, "fetched webhook");
        Ok(hook)
    }

    /// Delete a hook. A hook that is already gone yields
    /// [`GitHubError::NotFound`]; callers decide whether that is fatal.
    #[instrument(skip(self))]
    pub async fn delete_hook(&self, repo: &str, hook_id: i64) -> Result<(), GitHubError> {
        let url = format!("{}/repos/{}/hooks/{}", self.api_url, repo, hook_id);
        let resp = self.authorized(self.http.delete(&url)).send().await?;
        check_response(resp).await?;
        info!(hook_id, "deleted webhook");
        Ok(())
    }

    /// Raw bytes of `path` at `git_ref`.
    ///
    /// Uses the contents API; files too large for inline base64 content are
    /// fetched through their `download_url`.
    #[instrument(skip(self))]
    pub async fn get_file_contents(
        &self,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Vec<u8>, GitHubError> {
        let url = self.contents_url(repo, path)?;
        let resp = self
            .authorized(self.http.get(url))
            .query(&[("ref", git_ref)])
            .send()
            .await?;
        let resp = check_response(resp).await?;
        let entry: ContentEntry = resp.json().await?;

        match (entry.encoding.as_deref(), entry.content) {
            (Some("base64"), Some(content)) if !content.is_empty() => {
                let compact: String = content.split_whitespace().collect();
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(compact.as_bytes())
                    .map_err(|e| GitHubError::ParseError(format!("invalid base64 content: {e}")))?;
                debug!(bytes = bytes.len(), "fetched file contents");
                Ok(bytes)
            }
            _ => match entry.download_url {
                Some(download_url) => {
                    let resp = self.authorized(self.http.get(&download_url)).send().await?;
                    let resp = check_response(resp).await?;
                    let bytes = resp.bytes().await?.to_vec();
                    debug!(bytes = bytes.len(), "downloaded raw file contents");
                    Ok(bytes)
                }
                None => Ok(Vec::new()),
            },
        }
    }

    /// `{api}/repos/{repo}/contents/{path}` with every path segment
    /// percent-encoded.
    fn contents_url(&self, repo: &str, path: &str) -> Result<Url, GitHubError> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| GitHubError::ParseError(format!("invalid API URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| GitHubError::ParseError("API URL cannot be a base".into()))?
            .pop_if_empty()
            .push("repos")
            .extend(repo.split('/'))
            .push("contents")
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

/// Map a non-success response to a typed error, reading the body where it
/// carries detail.
async fn check_response(resp: Response) -> Result<Response, GitHubError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let rate_limit_reset = resp
        .headers()
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let rate_limit_exhausted = resp
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        == Some("0");

    match status {
        StatusCode::UNAUTHORIZED => Err(GitHubError::AuthenticationFailed(format!("HTTP {status}"))),
        StatusCode::FORBIDDEN if rate_limit_exhausted => Err(GitHubError::RateLimited {
            reset_at: rate_limit_reset,
        }),
        StatusCode::TOO_MANY_REQUESTS => Err(GitHubError::RateLimited {
            reset_at: rate_limit_reset,
        }),
        StatusCode::FORBIDDEN => Err(GitHubError::Forbidden(format!("HTTP {status}"))),
        StatusCode::NOT_FOUND => Err(GitHubError::NotFound(resp.url().path().to_string())),
        StatusCode::UNPROCESSABLE_ENTITY => {
            let body = resp.text().await.unwrap_or_default();
            let failure: ValidationFailure =
                serde_json::from_str(&body).unwrap_or(ValidationFailure {
                    message: body.clone(),
                    errors: Vec::new(),
                });
            let errors = failure
                .errors
                .iter()
                .map(|e| match e.get("message").and_then(|m| m.as_str()) {
                    Some(m) => m.to_string(),
                    None => e.to_string(),
                })
                .collect();
            Err(GitHubError::Unprocessable {
                message: failure.message,
                errors,
            })
        }
        _ => {
            let body = resp.text().await.unwrap_or_default();
            Err(GitHubError::ApiError {
                status: status.as_u16(),
                body: if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    body
                },
            })
        }
    }
}
