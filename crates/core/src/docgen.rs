//! Documentation-generation collaborator.
//!
//! [`DocGenerator`] turns one source file into documentation text. The
//! production implementation, [`HttpDocGenerator`], posts the prompt to a
//! JSON endpoint:
//!
//! ```text
//! POST {endpoint}   {"code": "<prompt + source>", "max_tokens": 1024}
//! 200               {"documentation": "<text>"}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::DocGenConfig;
use crate::errors::DocGenError;

/// Turns source text into documentation text.
#[async_trait]
pub trait DocGenerator: Send + Sync {
    /// Generate documentation for `source`, read from `path`.
    async fn generate(&self, path: &str, source: &str) -> Result<String, DocGenError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    code: &'a str,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    documentation: Option<String>,
}

/// [`DocGenerator`] backed by an HTTP endpoint.
#[derive(Clone)]
pub struct HttpDocGenerator {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    prompt_template: String,
    max_tokens: u32,
    timeout: Duration,
}

impl HttpDocGenerator {
    pub fn new(cfg: &DocGenConfig) -> Result<Self, DocGenError> {
        let http = reqwest::Client::builder().timeout(cfg.timeout()).build()?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone(),
            prompt_template: cfg.prompt_template.clone(),
            max_tokens: cfg.max_tokens,
            timeout: cfg.timeout(),
        })
    }

    /// The prompt sent for `source`.
    pub fn build_prompt(&self, source: &str) -> String {
        if self.prompt_template.contains("{code}") {
            self.prompt_template.replace("{code}", source)
        } else {
            format!("{}\n\n{}", self.prompt_template, source)
        }
    }
}

#[async_trait]
impl DocGenerator for HttpDocGenerator {
    #[instrument(skip(self, source), fields(bytes = source.len()))]
    async fn generate(&self, path: &str, source: &str) -> Result<String, DocGenError> {
        let prompt = self.build_prompt(source);
        let mut req = self.http.post(&self.endpoint).json(&GenerateRequest {
            code: &prompt,
            max_tokens: self.max_tokens,
        });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                DocGenError::Timeout(self.timeout.as_secs())
            } else {
                DocGenError::HttpError(e)
            }
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DocGenError::Status {
                status: status.as_u16(),
            });
        }

        let body: GenerateResponse = resp.json().await?;
        match body.documentation {
            Some(text) if !text.trim().is_empty() => {
                debug!(chars = text.len(), "generated documentation");
                Ok(text)
            }
            _ => Err(DocGenError::Empty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(endpoint: String) -> DocGenConfig {
        DocGenConfig {
            endpoint,
            timeout_secs: 5,
            api_key_env: None,
            prompt_template: "Document:\n{code}".into(),
            max_tokens: 256,
            api_key: Some("k".into()),
        }
    }

    #[tokio::test]
    async fn test_generate_posts_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/repo2doc/"))
            .and(header("authorization", "Bearer k"))
            .and(body_partial_json(serde_json::json!({
                "code": "Document:\nfn main() {}",
                "max_tokens": 256
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "documentation": "# main" })),
            )
            .mount(&server)
            .await;

        let gen = HttpDocGenerator::new(&config(format!("{}/api/repo2doc/", server.uri()))).unwrap();
        let doc = gen.generate("src/main.rs", "fn main() {}").await.unwrap();
        assert_eq!(doc, "# main");
    }

    #[tokio::test]
    async fn test_blank_documentation_is_empty_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "documentation": "  " })),
            )
            .mount(&server)
            .await;

        let gen = HttpDocGenerator::new(&config(server.uri())).unwrap();
        assert!(matches!(
            gen.generate("a.py", "x = 1").await,
            Err(DocGenError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({ "error": "boom" })))
            .mount(&server)
            .await;

        let gen = HttpDocGenerator::new(&config(server.uri())).unwrap();
        assert!(matches!(
            gen.generate("a.py", "x = 1").await,
            Err(DocGenError::Status { status: 500 })
        ));
    }

    #[test]
    fn test_prompt_without_placeholder_appends_source() {
        let mut cfg = config("http://localhost".into());
        cfg.prompt_template = "Explain this".into();
        let gen = HttpDocGenerator::new(&cfg).unwrap();
        assert_eq!(gen.build_prompt("x = 1"), "Explain this\n\nx = 1");
    }
}
