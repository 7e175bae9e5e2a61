//! End-to-end push handling against mocked GitHub and documentation
//! generator services.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use docsync_core::config::{DocGenConfig, SyncConfig};
use docsync_core::db::queries::NewTrackedRepository;
use docsync_core::db::Database;
use docsync_core::docgen::HttpDocGenerator;
use docsync_core::file_policy::FilePolicy;
use docsync_core::github::signature::{sign, SignatureScheme};
use docsync_core::github::GitHubClient;
use docsync_core::models::{EventStatus, FileAction};
use docsync_core::sync::{
    Delivery, FileSyncWorker, IgnoreReason, IngestOutcome, PushOutcome, PushProcessor,
    WebhookIngestor,
};

const SECRET: &str = "e2e-secret";
const COMMIT: &str = "9f8e7d6c5b4a39281706f5e4d3c2b1a098765432";

struct Pipeline {
    ingestor: WebhookIngestor,
    db: Arc<Database>,
    repo_id: i64,
    docs: tempfile::TempDir,
}

async fn pipeline(github: &MockServer, docgen: &MockServer) -> Pipeline {
    let docs = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::in_memory().unwrap());
    db.initialize().unwrap();

    let folder = db
        .create_doc_folder("carol", docs.path().to_str().unwrap())
        .unwrap();
    let repo = db
        .create_tracked_repository(&NewTrackedRepository {
            doc_folder_id: folder.id,
            github_url: "https://github.com/acme/widgets",
            owner: "acme",
            repo_name: "widgets",
            branch: "main",
            webhook_secret: SECRET,
        })
        .unwrap();
    db.set_webhook_registration(repo.id, 12, SECRET).unwrap();

    let client = GitHubClient::new(github.uri(), "docsync-test", Duration::from_secs(5), None).unwrap();
    let generator = HttpDocGenerator::new(&DocGenConfig {
        endpoint: format!("{}/generate", docgen.uri()),
        timeout_secs: 5,
        api_key_env: None,
        prompt_template: "Document this:\n{code}".into(),
        max_tokens: 512,
        api_key: None,
    })
    .unwrap();

    let worker = Arc::new(FileSyncWorker::new(
        db.clone(),
        Arc::new(client),
        Arc::new(generator),
        FilePolicy::from(&SyncConfig::default()),
        Duration::from_secs(5),
    ));
    let processor = Arc::new(PushProcessor::new(db.clone(), worker, "md", 4));

    Pipeline {
        ingestor: WebhookIngestor::new(db.clone(), processor),
        db,
        repo_id: repo.id,
        docs,
    }
}

async fn deliver(p: &Pipeline, delivery_id: &str, body: &[u8]) -> IngestOutcome {
    let signature = sign(SignatureScheme::Sha256, body, SECRET);
    p.ingestor
        .ingest(
            p.repo_id,
            Delivery {
                event: Some("push"),
                delivery_id: Some(delivery_id),
                signature: Some(&signature),
                body,
            },
            CancellationToken::new(),
        )
        .await
        .unwrap()
        .outcome
}

#[tokio::test]
async fn test_push_regenerates_and_removes_documentation() {
    let github = MockServer::start().await;
    let docgen = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/contents/src/greet.py"))
        .and(query_param("ref", COMMIT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "file",
            "encoding": "base64",
            "content": "ZGVmIGdyZWV0KCk6CiAgICByZXR1cm4gJ2hpJwo="
        })))
        .mount(&github)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/contents/src/missing.js"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
        .mount(&github)
        .await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documentation": "# greet\n\nReturns a greeting.\n"
        })))
        .expect(1)
        .mount(&docgen)
        .await;

    let p = pipeline(&github, &docgen).await;
    std::fs::create_dir_all(p.docs.path().join("legacy")).unwrap();
    std::fs::write(p.docs.path().join("legacy/x.md"), "stale").unwrap();

    let body = json!({
        "ref": "refs/heads/main",
        "after": COMMIT,
        "commits": [
            {
                "id": "1111111111111111111111111111111111111111",
                "added": ["src/greet.py", "src/missing.js", "notes/guide.md"],
                "modified": ["legacy/x.go"],
                "removed": []
            },
            {
                "id": COMMIT,
                "added": [],
                "modified": [],
                "removed": ["legacy/x.go"]
            }
        ]
    })
    .to_string();

    let outcome = deliver(&p, "flow-1", body.as_bytes()).await;
    match outcome {
        IngestOutcome::Push(PushOutcome::Synced {
            commit,
            files_processed,
            files_failed,
        }) => {
            assert_eq!(commit, COMMIT);
            assert_eq!(files_processed, 3);
            assert_eq!(files_failed, 1);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(
        std::fs::read_to_string(p.docs.path().join("src/greet.md")).unwrap(),
        "# greet\n\nReturns a greeting.\n"
    );
    assert!(!p.docs.path().join("src/missing.md").exists());
    assert!(!p.docs.path().join("notes").exists());
    assert!(!p.docs.path().join("legacy/x.md").exists());
    assert!(!p.docs.path().join("legacy").exists());

    let event = p.db.get_event_by_delivery("flow-1").unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Success);
    assert_eq!(event.files_processed, 3);
    assert_eq!(event.commit_sha.as_deref(), Some(COMMIT));

    let mut records = p.db.list_file_syncs(event.id).unwrap();
    records.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    let summary: Vec<_> = records
        .iter()
        .map(|r| (r.file_path.as_str(), r.action, r.success))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("legacy/x.go", FileAction::Removed, true),
            ("src/greet.py", FileAction::Added, true),
            ("src/missing.js", FileAction::Added, false),
        ]
    );

    let repo = p.db.require_tracked_repository(p.repo_id).unwrap();
    assert_eq!(repo.last_commit_sha.as_deref(), Some(COMMIT));
    assert_eq!(repo.sync_failures, 0);
    assert!(repo.last_sync_at.is_some());

    // A new delivery of the same head commit performs no file work.
    let replay = deliver(&p, "flow-2", body.as_bytes()).await;
    assert!(matches!(
        replay,
        IngestOutcome::Push(PushOutcome::Ignored(IgnoreReason::AlreadyProcessed))
    ));
    let event = p.db.get_event_by_delivery("flow-2").unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Ignored);
    assert!(p.db.list_file_syncs(event.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_push_to_other_branch_is_ignored() {
    let github = MockServer::start().await;
    let docgen = MockServer::start().await;
    let p = pipeline(&github, &docgen).await;

    let body = json!({
        "ref": "refs/heads/feature/x",
        "commits": [{ "id": COMMIT, "added": ["src/greet.py"] }]
    })
    .to_string();

    let outcome = deliver(&p, "branch-1", body.as_bytes()).await;
    assert_eq!(outcome.response_body(), json!({ "status": "ignored" }));
    assert!(!p.docs.path().join("src").exists());

    let repo = p.db.require_tracked_repository(p.repo_id).unwrap();
    assert!(repo.last_commit_sha.is_none());
}
