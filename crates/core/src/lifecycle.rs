//! Webhook registration lifecycle.
//!
//! Provisions, removes and checks the GitHub hook that delivers pushes for a
//! tracked repository. Credentials are supplied per call by the caller and
//! never stored.

use std::sync::Arc;

use rand::RngCore;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::callback_url;
use crate::db::Database;
use crate::errors::{GitHubError, LifecycleError};
use crate::github::{GitHubClient, Hook};
use crate::models::TrackedRepository;

/// Result of a successful [`WebhookLifecycle::provision`].
#[derive(Debug, Clone, Serialize)]
pub struct Provisioned {
    pub webhook_id: i64,
    pub webhook_url: String,
    /// `true` if an existing hook with the same callback URL was adopted.
    pub adopted: bool,
}

impl Provisioned {
    pub fn message(&self) -> &'static str {
        if self.adopted {
            "Existing webhook adopted"
        } else {
            "Webhook created successfully"
        }
    }
}

/// Result of a successful [`WebhookLifecycle::deprovision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Deprovisioned {
    /// The hook was deleted on GitHub.
    Removed,
    /// GitHub no longer had the hook.
    AlreadyGone,
    /// Nothing was registered.
    NotRegistered,
    /// No credential was given; only local state was cleared.
    LocalOnly,
}

impl Deprovisioned {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Removed => "Webhook removed successfully",
            Self::AlreadyGone => "Webhook was already removed on GitHub",
            Self::NotRegistered => "No webhook to delete",
            Self::LocalOnly => "Webhook disabled locally",
        }
    }
}

/// Health of a registration as reported by GitHub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookHealth {
    Active,
    Inactive,
    NotFound,
    NotConfigured,
}

impl HookHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Active => "Webhook is active and configured correctly",
            Self::Inactive => "Webhook exists but is not active",
            Self::NotFound => "Webhook not found on GitHub (may have been manually deleted)",
            Self::NotConfigured => "Webhook not configured",
        }
    }
}

/// A fresh webhook secret: 24 random bytes, hex encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Issues hook create/delete/get calls and records the results.
#[derive(Clone)]
pub struct WebhookLifecycle {
    db: Arc<Database>,
    github: GitHubClient,
    public_url: String,
}

impl WebhookLifecycle {
    pub fn new(db: Arc<Database>, github: GitHubClient, public_url: impl Into<String>) -> Self {
        Self {
            db,
            github,
            public_url: public_url.into(),
        }
    }

    /// Callback URL GitHub delivers to for `repo`.
    pub fn callback_url(&self, repo: &TrackedRepository) -> String {
        callback_url(&self.public_url, repo.id)
    }

    /// Register (or adopt) the push hook for `repo`.
    #[instrument(skip(self, repo, credential), fields(repository = %repo))]
    pub async fn provision(
        &self,
        repo: &TrackedRepository,
        credential: &str,
    ) -> Result<Provisioned, LifecycleError> {
        let gh = self.client_for(credential)?;
        let full_name = repo.full_name();

        gh.get_repository(&full_name).await.map_err(|e| match e {
            GitHubError::AuthenticationFailed(_) => LifecycleError::InvalidCredential,
            GitHubError::NotFound(_) => LifecycleError::RepositoryNotFound,
            other => LifecycleError::Api(other),
        })?;

        let secret = if repo.webhook_secret.is_empty() {
            generate_secret()
        } else {
            repo.webhook_secret.clone()
        };
        let webhook_url = self.callback_url(repo);

        let (hook, adopted) = match gh.create_hook(&full_name, &webhook_url, &secret).await {
            Ok(hook) => (hook, false),
            Err(e) if e.is_already_exists() => {
                info!(url = %webhook_url, "webhook already exists, looking it up");
                let hooks = gh.list_hooks(&full_name).await.map_err(map_hook_error)?;
                match find_hook(hooks, &webhook_url) {
                    Some(hook) => (hook, true),
                    None => return Err(LifecycleError::Api(e)),
                }
            }
            Err(e) => return Err(map_hook_error(e)),
        };

        self.db.set_webhook_registration(repo.id, hook.id, &secret)?;
        info!(repo_id = repo.id, hook_id = hook.id, adopted, "webhook provisioned");
        Ok(Provisioned {
            webhook_id: hook.id,
            webhook_url,
            adopted,
        })
    }

    /// Remove the hook for `repo`.
    ///
    /// Without a credential only local state is cleared. With one, local
    /// state is cleared only once GitHub confirms the hook is gone.
    #[instrument(skip(self, repo, credential), fields(repository = %repo))]
    pub async fn deprovision(
        &self,
        repo: &TrackedRepository,
        credential: Option<&str>,
    ) -> Result<Deprovisioned, LifecycleError> {
        let credential = credential.filter(|c| !c.trim().is_empty());
        let outcome = match (repo.webhook_id, credential) {
            (None, _) => Deprovisioned::NotRegistered,
            (Some(_), None) => Deprovisioned::LocalOnly,
            (Some(hook_id), Some(credential)) => {
                let gh = self.client_for(credential)?;
                match gh.delete_hook(&repo.full_name(), hook_id).await {
                    Ok(()) => Deprovisioned::Removed,
                    Err(GitHubError::NotFound(_)) => {
                        warn!(hook_id, "webhook already deleted on GitHub");
                        Deprovisioned::AlreadyGone
                    }
                    Err(e) => return Err(map_hook_error(e)),
                }
            }
        };

        self.db.clear_webhook_registration(repo.id)?;
        info!(repo_id = repo.id, outcome = ?outcome, "webhook deprovisioned");
        Ok(outcome)
    }

    /// Ask GitHub whether the registered hook exists and is active.
    #[instrument(skip(self, repo, credential), fields(repository = %repo))]
    pub async fn test(
        &self,
        repo: &TrackedRepository,
        credential: &str,
    ) -> Result<HookHealth, LifecycleError> {
        let gh = self.client_for(credential)?;
        let Some(hook_id) = repo.webhook_id else {
            return Ok(HookHealth::NotConfigured);
        };
        match gh.get_hook(&repo.full_name(), hook_id).await {
            Ok(hook) if hook.active => Ok(HookHealth::Active),
            Ok(_) => Ok(HookHealth::Inactive),
            Err(GitHubError::NotFound(_)) => Ok(HookHealth::NotFound),
            Err(e) => Err(map_hook_error(e)),
        }
    }

    fn client_for(&self, credential: &str) -> Result<GitHubClient, LifecycleError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(LifecycleError::MissingCredential);
        }
        Ok(self.github.with_token(credential))
    }
}

fn find_hook(hooks: Vec<Hook>, webhook_url: &str) -> Option<Hook> {
    hooks.into_iter().find(|h| h.targets(webhook_url))
}

fn map_hook_error(e: GitHubError) -> LifecycleError {
    match e {
        GitHubError::AuthenticationFailed(_) => LifecycleError::InvalidCredential,
        GitHubError::Forbidden(_) => LifecycleError::InsufficientPermissions,
        other => LifecycleError::Api(other),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::db::queries::NewTrackedRepository;

    const PUBLIC_URL: &str = "https://docs.example.com";

    async fn setup() -> (MockServer, WebhookLifecycle, Arc<Database>, TrackedRepository) {
        let server = MockServer::start().await;
        let db = Arc::new(Database::in_memory().unwrap());
        db.initialize().unwrap();
        let folder = db.create_doc_folder("alice", "/docs/w").unwrap();
        let repo = db
            .create_tracked_repository(&NewTrackedRepository {
                doc_folder_id: folder.id,
                github_url: "https://github.com/acme/widgets",
                owner: "acme",
                repo_name: "widgets",
                branch: "main",
                webhook_secret: "stored-secret",
            })
            .unwrap();
        let gh = GitHubClient::new(server.uri(), "docsync-test", Duration::from_secs(5), None).unwrap();
        let lifecycle = WebhookLifecycle::new(db.clone(), gh, PUBLIC_URL);
        (server, lifecycle, db, repo)
    }

    async fn mount_repo_probe(server: &MockServer, status: u16) {
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets"))
            .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({
                "id": 1, "full_name": "acme/widgets", "default_branch": "main", "private": false
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn test_generate_secret_shape() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), 48);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_provision_creates_hook() {
        let (server, lifecycle, db, repo) = setup().await;
        mount_repo_probe(&server, 200).await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/widgets/hooks"))
            .and(header("authorization", "Bearer user-token"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": 321, "active": true,
                "config": { "url": format!("{PUBLIC_URL}/webhook/github/{}/", repo.id) }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = lifecycle.provision(&repo, "user-token").await.unwrap();
        assert_eq!(result.webhook_id, 321);
        assert!(!result.adopted);
        assert_eq!(
            result.webhook_url,
            format!("https://docs.example.com/webhook/github/{}/", repo.id)
        );

        let repo = db.require_tracked_repository(repo.id).unwrap();
        assert_eq!(repo.webhook_id, Some(321));
        assert!(repo.is_webhook_active);
        assert!(repo.auto_sync_enabled);
        assert_eq!(repo.webhook_secret, "stored-secret");
    }

    #[tokio::test]
    async fn test_provision_adopts_existing_hook() {
        let (server, lifecycle, db, repo) = setup().await;
        mount_repo_probe(&server, 200).await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/widgets/hooks"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "message": "Validation Failed",
                "errors": [{ "message": "Hook already exists on this repository" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/hooks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": 10, "active": true, "config": { "url": "https://ci.example.com/hook" } },
                { "id": 11, "active": true, "config": { "url": format!("{PUBLIC_URL}/webhook/github/{}", repo.id) } }
            ])))
            .mount(&server)
            .await;

        let result = lifecycle.provision(&repo, "user-token").await.unwrap();
        assert!(result.adopted);
        assert_eq!(result.webhook_id, 11);
        assert_eq!(db.require_tracked_repository(repo.id).unwrap().webhook_id, Some(11));
    }

    #[tokio::test]
    async fn test_provision_distinguishes_probe_failures() {
        let (server, lifecycle, _db, repo) = setup().await;
        mount_repo_probe(&server, 401).await;
        assert!(matches!(
            lifecycle.provision(&repo, "bad").await,
            Err(LifecycleError::InvalidCredential)
        ));

        let (server, lifecycle, _db, repo) = setup().await;
        mount_repo_probe(&server, 404).await;
        assert!(matches!(
            lifecycle.provision(&repo, "t").await,
            Err(LifecycleError::RepositoryNotFound)
        ));

        assert!(matches!(
            lifecycle.provision(&repo, "  ").await,
            Err(LifecycleError::MissingCredential)
        ));
    }

    #[tokio::test]
    async fn test_deprovision_tolerates_missing_hook() {
        let (server, lifecycle, db, repo) = setup().await;
        db.set_webhook_registration(repo.id, 55, "stored-secret").unwrap();
        let repo = db.require_tracked_repository(repo.id).unwrap();
        Mock::given(method("DELETE"))
            .and(path("/repos/acme/widgets/hooks/55"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let outcome = lifecycle.deprovision(&repo, Some("t")).await.unwrap();
        assert_eq!(outcome, Deprovisioned::AlreadyGone);
        let repo = db.require_tracked_repository(repo.id).unwrap();
        assert_eq!(repo.webhook_id, None);
        assert!(!repo.is_webhook_active);
    }

    #[tokio::test]
    async fn test_deprovision_failure_keeps_local_state() {
        let (server, lifecycle, db, repo) = setup().await;
        db.set_webhook_registration(repo.id, 55, "stored-secret").unwrap();
        let repo = db.require_tracked_repository(repo.id).unwrap();
        Mock::given(method("DELETE"))
            .and(path("/repos/acme/widgets/hooks/55"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        assert!(matches!(
            lifecycle.deprovision(&repo, Some("t")).await,
            Err(LifecycleError::InsufficientPermissions)
        ));
        assert_eq!(db.require_tracked_repository(repo.id).unwrap().webhook_id, Some(55));
    }

    #[tokio::test]
    async fn test_deprovision_without_credential_is_local_only() {
        let (server, lifecycle, db, repo) = setup().await;
        db.set_webhook_registration(repo.id, 55, "stored-secret").unwrap();
        let repo = db.require_tracked_repository(repo.id).unwrap();

        let outcome = lifecycle.deprovision(&repo, None).await.unwrap();
        assert_eq!(outcome, Deprovisioned::LocalOnly);
        assert!(server.received_requests().await.unwrap().is_empty());

        let repo = db.require_tracked_repository(repo.id).unwrap();
        assert!(!repo.is_webhook_active);
        assert!(!repo.auto_sync_enabled);
    }

    #[tokio::test]
    async fn test_hook_health() {
        let (server, lifecycle, db, repo) = setup().await;
        assert_eq!(
            lifecycle.test(&repo, "t").await.unwrap(),
            HookHealth::NotConfigured
        );

        db.set_webhook_registration(repo.id, 8, "stored-secret").unwrap();
        let repo = db.require_tracked_repository(repo.id).unwrap();
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/hooks/8"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 8, "active": false, "config": {}
            })))
            .mount(&server)
            .await;
        let health = lifecycle.test(&repo, "t").await.unwrap();
        assert_eq!(health, HookHealth::Inactive);
        assert!(!health.is_healthy());
    }
}
