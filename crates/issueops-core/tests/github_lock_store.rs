use mockito::{Matcher, Server};
use serde_json::json;

use issueops_core::github::GitHubClient;
use issueops_core::lock::{
    CreateOutcome, DeleteOutcome, GitHubLockStore, LockRecord, LockScope, LockStore,
    LockStoreError,
};

const REF_PATH: &str = "/repos/corp/test/git/ref/heads/production-branch-deploy-lock";

fn store(server: &Server) -> GitHubLockStore {
    let client = GitHubClient::new(&server.url(), "faketoken", "corp/test").unwrap();
    GitHubLockStore::new(client)
}

fn contents_path() -> Matcher {
    Matcher::Regex(r"^/repos/corp/test/contents/lock\.json".to_string())
}

#[tokio::test]
async fn read_missing_lock() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", REF_PATH)
        .with_status(404)
        .with_body(r#"{"message":"Not Found"}"#)
        .create_async()
        .await;

    let scope = LockScope::environment("production");
    assert!(store(&server).read(&scope).await.unwrap().is_none());
}

#[tokio::test]
async fn read_existing_lock() {
    let mut server = Server::new_async().await;
    let record = LockRecord::new(&LockScope::environment("production"), "monalisa")
        .with_reason(Some("testing".to_string()));

    server
        .mock("GET", REF_PATH)
        .match_header("authorization", "Bearer faketoken")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "object": { "sha": "abc123" } }).to_string())
        .create_async()
        .await;
    server
        .mock("GET", contents_path())
        .match_header("accept", "application/vnd.github.raw+json")
        .with_status(200)
        .with_body(serde_json::to_string(&record).unwrap())
        .create_async()
        .await;

    let stored = store(&server)
        .read(&LockScope::environment("production"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.version, "abc123");
    assert_eq!(stored.record, record);
}

#[tokio::test]
async fn ref_without_lock_file_is_corrupt() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", REF_PATH)
        .with_status(200)
        .with_body(json!({ "object": { "sha": "abc" } }).to_string())
        .create_async()
        .await;
    server
        .mock("GET", contents_path())
        .with_status(404)
        .with_body(r#"{"message":"Not Found"}"#)
        .create_async()
        .await;

    let err = store(&server)
        .read(&LockScope::environment("production"))
        .await
        .unwrap_err();
    assert!(matches!(err, LockStoreError::Corrupt { .. }));
    assert!(err.to_string().contains("production-branch-deploy-lock"));
}

#[tokio::test]
async fn create_writes_root_commit_and_ref() {
    let mut server = Server::new_async().await;
    let record = LockRecord::new(&LockScope::environment("production"), "monalisa");

    let tree = server
        .mock("POST", "/repos/corp/test/git/trees")
        .with_status(201)
        .with_body(json!({ "sha": "tree1" }).to_string())
        .create_async()
        .await;
    let commit = server
        .mock("POST", "/repos/corp/test/git/commits")
        .match_body(Matcher::PartialJson(json!({ "tree": "tree1", "parents": [] })))
        .with_status(201)
        .with_body(json!({ "sha": "commit1" }).to_string())
        .create_async()
        .await;
    let reference = server
        .mock("POST", "/repos/corp/test/git/refs")
        .match_body(Matcher::Json(json!({
            "ref": "refs/heads/production-branch-deploy-lock",
            "sha": "commit1",
        })))
        .with_status(201)
        .with_body(json!({ "ref": "refs/heads/production-branch-deploy-lock" }).to_string())
        .create_async()
        .await;

    match store(&server).create(&record).await.unwrap() {
        CreateOutcome::Created(stored) => {
            assert_eq!(stored.version, "commit1");
            assert_eq!(stored.record, record);
        }
        other => panic!("expected created, got {:?}", other),
    }
    tree.assert_async().await;
    commit.assert_async().await;
    reference.assert_async().await;
}

#[tokio::test]
async fn create_conflict_reports_existing_lock() {
    let mut server = Server::new_async().await;
    let existing = LockRecord::new(&LockScope::environment("production"), "octocat");

    server
        .mock("POST", "/repos/corp/test/git/trees")
        .with_status(201)
        .with_body(json!({ "sha": "tree1" }).to_string())
        .create_async()
        .await;
    server
        .mock("POST", "/repos/corp/test/git/commits")
        .with_status(201)
        .with_body(json!({ "sha": "commit2" }).to_string())
        .create_async()
        .await;
    server
        .mock("POST", "/repos/corp/test/git/refs")
        .with_status(422)
        .with_body(r#"{"message":"Reference already exists"}"#)
        .create_async()
        .await;
    server
        .mock("GET", REF_PATH)
        .with_status(200)
        .with_body(json!({ "object": { "sha": "commit1" } }).to_string())
        .create_async()
        .await;
    server
        .mock("GET", contents_path())
        .with_status(200)
        .with_body(serde_json::to_string(&existing).unwrap())
        .create_async()
        .await;

    let record = LockRecord::new(&LockScope::environment("production"), "monalisa");
    match store(&server).create(&record).await.unwrap() {
        CreateOutcome::Exists(Some(stored)) => {
            assert_eq!(stored.version, "commit1");
            assert_eq!(stored.record.holder, "octocat");
        }
        other => panic!("expected exists, got {:?}", other),
    }
}

#[tokio::test]
async fn delete_skips_moved_ref() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", REF_PATH)
        .with_status(200)
        .with_body(json!({ "object": { "sha": "newer" } }).to_string())
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/repos/corp/test/git/refs/heads/production-branch-deploy-lock")
        .with_status(204)
        .expect(0)
        .create_async()
        .await;

    let scope = LockScope::environment("production");
    assert_eq!(
        store(&server).delete(&scope, "older").await.unwrap(),
        DeleteOutcome::Changed
    );
    delete.assert_async().await;
}

#[tokio::test]
async fn delete_matching_ref() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", REF_PATH)
        .with_status(200)
        .with_body(json!({ "object": { "sha": "commit1" } }).to_string())
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/repos/corp/test/git/refs/heads/production-branch-deploy-lock")
        .with_status(204)
        .create_async()
        .await;

    let scope = LockScope::environment("production");
    assert_eq!(
        store(&server).delete(&scope, "commit1").await.unwrap(),
        DeleteOutcome::Deleted
    );
    delete.assert_async().await;
}

#[tokio::test]
async fn api_errors_surface_message() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", REF_PATH)
        .with_status(403)
        .with_body(r#"{"message":"Resource not accessible by integration"}"#)
        .create_async()
        .await;

    let err = store(&server)
        .read(&LockScope::environment("production"))
        .await
        .unwrap_err();
    assert!(
        err.to_string()
            .contains("Resource not accessible by integration")
    );
}
