// Change detection against real git repositories built in a temp dir.

use std::fs;
use std::path::Path;
use std::process::Command;

use docs_sync_core::contract::ChangeDetector;
use docs_sync_core::detect::{GitChangeDetector, NULL_SHA};
use docs_sync_core::DetectError;
use tempfile::tempdir;

fn run_git(repo_dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn write(repo: &Path, rel: &str, content: &str) {
    let path = repo.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn commit(repo: &Path, message: &str) -> String {
    run_git(repo, &["add", "-A"]);
    run_git(repo, &["commit", "--allow-empty", "-q", "-m", message]);
    run_git(repo, &["rev-parse", "HEAD"])
}

fn make_repo() -> (tempfile::TempDir, String) {
    let dir = tempdir().unwrap();
    run_git(dir.path(), &["init", "-q"]);
    run_git(dir.path(), &["config", "user.name", "test-user"]);
    run_git(dir.path(), &["config", "user.email", "test@example.com"]);
    write(dir.path(), "README.md", "root\n");
    write(dir.path(), "integrations/foo/x.py", "x = 1\n");
    write(dir.path(), "integrations/bar/y.py", "y = 1\n");
    write(dir.path(), "integrations/baz/z.py", "z = 1\n");
    let base = commit(dir.path(), "initial");
    (dir, base)
}

#[tokio::test]
async fn changed_integrations_are_detected_once_each() {
    let (repo, base) = make_repo();
    write(repo.path(), "integrations/foo/x.py", "x = 2\n");
    write(repo.path(), "integrations/foo/new.py", "new\n");
    write(repo.path(), "integrations/bar/y.py", "y = 2\n");
    let head = commit(repo.path(), "touch foo and bar");

    let detector = GitChangeDetector::new(repo.path(), "integrations");
    let changes = detector.detect(&base, &head).await.unwrap();

    assert_eq!(changes.iter().collect::<Vec<_>>(), vec!["bar", "foo"]);
}

#[tokio::test]
async fn changes_outside_integrations_yield_an_empty_set() {
    let (repo, base) = make_repo();
    write(repo.path(), "README.md", "changed\n");
    let head = commit(repo.path(), "docs only");

    let detector = GitChangeDetector::new(repo.path(), "integrations");
    let changes = detector.detect(&base, &head).await.unwrap();

    assert!(changes.is_empty());
}

#[tokio::test]
async fn deleted_integrations_are_not_reported() {
    let (repo, base) = make_repo();
    fs::remove_dir_all(repo.path().join("integrations/baz")).unwrap();
    let head = commit(repo.path(), "drop baz");

    let detector = GitChangeDetector::new(repo.path(), "integrations");
    let changes = detector.detect(&base, &head).await.unwrap();

    assert!(changes.is_empty());
}

#[tokio::test]
async fn unknown_base_is_diff_unavailable() {
    let (repo, _) = make_repo();
    let head = run_git(repo.path(), &["rev-parse", "HEAD"]);

    let detector = GitChangeDetector::new(repo.path(), "integrations");
    let err = detector
        .detect("1111111111111111111111111111111111111111", &head)
        .await
        .unwrap_err();

    match err {
        DetectError::DiffUnavailable { reference, .. } => {
            assert_eq!(reference, "1111111111111111111111111111111111111111")
        }
        other => panic!("expected DiffUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn option_like_references_are_rejected() {
    let (repo, base) = make_repo();
    let detector = GitChangeDetector::new(repo.path(), "integrations");
    let err = detector.detect(&base, "--output=/tmp/x").await.unwrap_err();
    assert!(matches!(err, DetectError::DiffUnavailable { .. }));
}

#[tokio::test]
async fn null_base_treats_every_integration_as_changed() {
    let (repo, base) = make_repo();

    let detector = GitChangeDetector::new(repo.path(), "integrations");
    let changes = detector.detect(NULL_SHA, &base).await.unwrap();

    assert_eq!(changes.iter().collect::<Vec<_>>(), vec!["bar", "baz", "foo"]);
}

#[tokio::test]
async fn branch_named_like_a_file_is_read_as_a_ref() {
    let (repo, base) = make_repo();
    run_git(repo.path(), &["checkout", "-q", "-b", "release"]);
    write(repo.path(), "release", "notes\n");
    write(repo.path(), "integrations/foo/x.py", "x = 2\n");
    commit(repo.path(), "release notes and foo");

    let detector = GitChangeDetector::new(repo.path(), "integrations");
    let changes = detector.detect(&base, "release").await.unwrap();
    assert_eq!(changes.iter().collect::<Vec<_>>(), vec!["foo"]);

    let all = detector.detect(NULL_SHA, "release").await.unwrap();
    assert_eq!(all.iter().collect::<Vec<_>>(), vec!["bar", "baz", "foo"]);
}
