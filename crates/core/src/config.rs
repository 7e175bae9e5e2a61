//! `docsync.toml`: server, GitHub, generator, sync policy and web settings.
//!
//! Secrets never live in the file. `github.token_env` and
//! `docgen.api_key_env` name environment variables that
//! [`AppConfig::resolve_env_vars`] reads at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listener, public URL and data directory.
    pub server: ServerConfig,

    /// GitHub API settings.
    #[serde(default)]
    pub github: GitHubConfig,

    /// Documentation-generation service settings.
    pub docgen: DocGenConfig,

    /// File selection and artifact settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Management API settings.
    #[serde(default)]
    pub web: WebConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Server / process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (default `127.0.0.1:8080`).
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Externally reachable base URL, used to build webhook callback URLs
    /// (e.g. `https://docs.example.com`).
    pub public_url: String,

    /// Directory for persistent data (database).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Maximum accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_listen() -> String {
    "127.0.0.1:8080".into()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/docsync")
}
fn default_log_level() -> String {
    "info".into()
}
fn default_max_body_bytes() -> usize {
    5 * 1024 * 1024
}

impl ServerConfig {
    /// Path of the SQLite database file inside `data_dir`.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("docsync.db")
    }
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

/// GitHub API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API base URL (default `https://api.github.com`).
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// User-Agent sent with every API request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upper bound for a single API call.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Environment variable holding a service token used to fetch file
    /// contents while processing pushes. Unauthenticated when unset.
    #[serde(default)]
    pub token_env: Option<String>,

    /// Resolved service token.
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}
fn default_user_agent() -> String {
    concat!("docsync/", env!("CARGO_PKG_VERSION")).into()
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_timeout_secs(),
            token_env: None,
            token: None,
        }
    }
}

impl GitHubConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Documentation generation
// ---------------------------------------------------------------------------

/// Documentation-generation collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocGenConfig {
    /// Endpoint accepting `{"code": ...}` and answering `{"documentation": ...}`.
    pub endpoint: String,

    /// Upper bound for a single generation call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Environment variable holding a bearer key for the endpoint.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Prompt wrapped around the source text. `{code}` is replaced by the
    /// file content.
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,

    /// Token budget forwarded to the generator.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Resolved API key.
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_prompt_template() -> String {
    "You are an expert technical writer and software documentation specialist. \
     Analyze the given code and generate clean, professional, developer-friendly \
     documentation suitable for a technical documentation site. Be concise but \
     complete, giving a developer enough context to understand and use the code \
     without reading its full implementation.\n\n{code}"
        .into()
}
fn default_max_tokens() -> u32 {
    1024
}

impl DocGenConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Sync behaviour
// ---------------------------------------------------------------------------

/// Which changed files are regenerated and how artifacts are named.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Recognized source-code extensions (with leading dot).
    #[serde(default = "default_code_extensions")]
    pub code_extensions: Vec<String>,

    /// Substrings that exclude a path wherever they occur in it.
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Additional glob patterns matched against the relative path.
    #[serde(default)]
    pub ignore_globs: Vec<String>,

    /// Extension (without dot) of derived documentation artifacts.
    #[serde(default = "default_doc_extension")]
    pub doc_extension: String,

    /// Files of one event processed concurrently.
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,

    /// Largest source file sent to generation. 0 = unlimited.
    #[serde(default)]
    pub max_file_bytes: u64,
}

fn default_code_extensions() -> Vec<String> {
    [
        ".py", ".js", ".ts", ".java", ".cpp", ".c", ".h", ".php", ".rb", ".go", ".rs", ".swift",
        ".kt", ".cs", ".sql", ".html", ".css", ".scss", ".less", ".sh",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_exclude_patterns() -> Vec<String> {
    [
        ".git/",
        "__pycache__/",
        "node_modules/",
        ".env",
        ".gitignore",
        "README.md",
        "LICENSE",
        ".DS_Store",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_doc_extension() -> String {
    "md".into()
}
fn default_max_concurrent_files() -> usize {
    4
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            code_extensions: default_code_extensions(),
            exclude_patterns: default_exclude_patterns(),
            ignore_globs: Vec::new(),
            doc_extension: default_doc_extension(),
            max_concurrent_files: default_max_concurrent_files(),
            max_file_bytes: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Web
// ---------------------------------------------------------------------------

/// Management API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Header set by the fronting authentication layer that carries the
    /// caller's user id.
    #[serde(default = "default_identity_header")]
    pub identity_header: String,
}

fn default_identity_header() -> String {
    "x-docsync-user".into()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            identity_header: default_identity_header(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Parse the TOML file at `path`. `*_env` references stay unresolved
    /// until [`resolve_env_vars`](Self::resolve_env_vars).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let raw = std::fs::read_to_string(path)?;
        let config = toml::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Fill `github.token` and `docgen.api_key` from the variables their
    /// `*_env` fields name. An unset variable leaves the secret empty.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(var) = &self.github.token_env {
            self.github.token = secret_from_env(var, "github.token_env");
        }
        if let Some(var) = &self.docgen.api_key_env {
            self.docgen.api_key = secret_from_env(var, "docgen.api_key_env");
        }
        Ok(())
    }

    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, detail: String| {
            Err(ConfigError::InvalidValue {
                field: field.into(),
                detail,
            })
        };

        for (field, url) in [
            ("server.public_url", &self.server.public_url),
            ("docgen.endpoint", &self.docgen.endpoint),
        ] {
            if !is_http_url(url) {
                return invalid(field, format!("'{url}' is not an http(s) URL"));
            }
        }
        for (field, value) in [
            ("github.request_timeout_secs", self.github.request_timeout_secs),
            ("docgen.timeout_secs", self.docgen.timeout_secs),
            ("sync.max_concurrent_files", self.sync.max_concurrent_files as u64),
        ] {
            if value == 0 {
                return invalid(field, "must be greater than zero".into());
            }
        }

        let ext = self.sync.doc_extension.as_str();
        if ext.is_empty() || ext.contains(['.', '/']) {
            return invalid(
                "sync.doc_extension",
                format!("'{ext}' must be a bare extension such as \"md\""),
            );
        }
        if let Some(bad) = self.sync.code_extensions.iter().find(|e| !e.starts_with('.')) {
            return invalid("sync.code_extensions", format!("'{bad}' must start with a dot"));
        }
        if self.web.identity_header.trim().is_empty() {
            return invalid("web.identity_header", "header name must not be empty".into());
        }

        Ok(())
    }

    /// [`load_from_file`](Self::load_from_file), then resolve secrets and
    /// validate.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Callback URL GitHub delivers events for `repository_id` to.
    pub fn callback_url(&self, repository_id: i64) -> String {
        callback_url(&self.server.public_url, repository_id)
    }

    /// A commented starter configuration.
    pub fn example_toml() -> &'static str {
        EXAMPLE_CONFIG
    }
}

/// `{public_url}/webhook/github/{repository_id}/`.
pub fn callback_url(public_url: &str, repository_id: i64) -> String {
    format!(
        "{}/webhook/github/{}/",
        public_url.trim_end_matches('/'),
        repository_id
    )
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

fn secret_from_env(var: &str, field: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => {
            warn!(field, var, "referenced environment variable is unset or empty");
            None
        }
    }
}

const EXAMPLE_CONFIG: &str = r#"# docsync configuration

[server]
listen = "127.0.0.1:8080"
# Base URL GitHub can reach; webhook callbacks are built from it.
public_url = "https://docs.example.com"
data_dir = "/var/lib/docsync"
log_level = "info"

[github]
api_url = "https://api.github.com"
request_timeout_secs = 30
# Optional service token used to fetch file contents for private repositories.
# token_env = "DOCSYNC_GITHUB_TOKEN"

[docgen]
endpoint = "http://127.0.0.1:9000/api/repo2doc/"
timeout_secs = 30
# api_key_env = "DOCSYNC_DOCGEN_KEY"

[sync]
doc_extension = "md"
max_concurrent_files = 4
ignore_globs = []

[web]
identity_header = "x-docsync-user"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[server]
listen = "0.0.0.0:9090"
public_url = "https://docs.example.com/"
data_dir = "/tmp/docsync"
log_level = "debug"

[github]
api_url = "https://github.example.com/api/v3"
request_timeout_secs = 10
token_env = "DOCSYNC_TEST_GH_TOKEN"

[docgen]
endpoint = "http://localhost:9000/generate"
timeout_secs = 45
prompt_template = "Document this:\n{code}"

[sync]
code_extensions = [".py", ".rs"]
ignore_globs = ["vendor/**"]
doc_extension = "txt"
max_concurrent_files = 2

[web]
identity_header = "x-remote-user"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.server.listen, "0.0.0.0:9090");
        assert_eq!(config.github.request_timeout_secs, 10);
        assert_eq!(config.docgen.timeout_secs, 45);
        assert_eq!(config.sync.code_extensions, vec![".py", ".rs"]);
        assert_eq!(config.sync.doc_extension, "txt");
        assert_eq!(config.web.identity_header, "x-remote-user");
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.database_path(), PathBuf::from("/tmp/docsync/docsync.db"));
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/docsync.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_defaults() {
        let minimal = r#"
[server]
public_url = "https://docs.example.com"
[docgen]
endpoint = "http://localhost:9000/generate"
"#;
        let config: AppConfig = toml::from_str(minimal).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:8080");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.request_timeout_secs, 30);
        assert_eq!(config.docgen.timeout_secs, 30);
        assert!(config.docgen.prompt_template.contains("{code}"));
        assert_eq!(config.sync.doc_extension, "md");
        assert!(config.sync.code_extensions.contains(&".py".to_string()));
        assert!(config.sync.exclude_patterns.contains(&"node_modules/".to_string()));
        assert_eq!(config.web.identity_header, "x-docsync-user");
    }

    #[test]
    fn test_example_config_is_valid() {
        let config: AppConfig = toml::from_str(AppConfig::example_toml()).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_public_url() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.server.public_url = "docs.example.com".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "server.public_url"
        ));
    }

    #[test]
    fn test_validate_rejects_dotted_doc_extension() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.sync.doc_extension = ".md".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "sync.doc_extension"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.docgen.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_callback_url_strips_trailing_slash() {
        let config: AppConfig = toml::from_str(sample_toml()).unwrap();
        assert_eq!(
            config.callback_url(42),
            "https://docs.example.com/webhook/github/42/"
        );
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("DOCSYNC_TEST_GH_TOKEN", "ghp_abc");

        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.resolve_env_vars().unwrap();
        assert_eq!(config.github.token.as_deref(), Some("ghp_abc"));
        assert!(config.docgen.api_key.is_none());

        std::env::remove_var("DOCSYNC_TEST_GH_TOKEN");
    }
}
