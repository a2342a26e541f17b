//! End-to-end post-login runs against in-memory and directory stores.

use std::fs;
use std::sync::Arc;

use hivesync_core::{content_keys, AsyncStore, DirStore, FileTreeNode, MemoryStore, UserId};
use hivesync_sync::{
    content_hash, enqueue_task, load_profile, post_login, ProfileTaskAction, SyncEnv,
    UserProfile, UserProfileTask,
};
use tempfile::TempDir;

async fn seed_profile(store: &dyn AsyncStore, env: &SyncEnv, nodes: Vec<FileTreeNode>) {
    let mut profile = UserProfile::new(env.user.clone());
    for node in nodes {
        profile.upsert(node);
    }
    store
        .put(&env.profile_key(), profile.to_bytes().expect("serialize"))
        .await
        .expect("seed profile");
}

async fn seed_file(store: &dyn AsyncStore, env: &SyncEnv, path: &str, content: &[u8]) -> FileTreeNode {
    store
        .put(&env.file_key(path), content.to_vec())
        .await
        .expect("seed content");
    FileTreeNode::file(path, Some(content_hash(content)))
}

fn setup() -> (TempDir, Arc<MemoryStore>, SyncEnv) {
    let root = TempDir::new().expect("root");
    let store = Arc::new(MemoryStore::new(3));
    let env = SyncEnv::new(store.clone(), UserId::from("alice"), root.path());
    (root, store, env)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn downloads_missing_and_uploads_new_files() {
    let (root, store, env) = setup();
    let remote = seed_file(store.as_ref(), &env, "/docs/a.txt", b"remote a").await;
    seed_profile(store.as_ref(), &env, vec![FileTreeNode::folder("/docs"), remote]).await;
    fs::write(root.path().join("notes.txt"), b"local notes").unwrap();

    let report = post_login(env.clone(), false).await.expect("post login");

    assert!(report.is_clean(), "{report:?}");
    assert_eq!((report.downloads, report.uploads, report.updates), (2, 1, 0));
    assert!(report.profile_written);
    assert_eq!(fs::read(root.path().join("docs/a.txt")).unwrap(), b"remote a");
    assert_eq!(store.value(&env.file_key("/notes.txt")), Some(b"local notes".to_vec()));

    let (profile, _) = load_profile(store.as_ref(), &env.user).await.expect("load");
    let notes = profile.find("/notes.txt").expect("notes recorded");
    assert_eq!(notes.content_hash.as_deref(), Some(content_hash(b"local notes").as_str()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_failing_download_is_reported_without_stopping_the_rest() {
    let (root, store, env) = setup();
    let ok = seed_file(store.as_ref(), &env, "/ok.txt", b"fine").await;
    seed_profile(
        store.as_ref(),
        &env,
        vec![ok, FileTreeNode::file("/lost.txt", Some(content_hash(b"lost")))],
    )
    .await;

    let report = post_login(env, false).await.expect("post login still succeeds");

    assert_eq!(report.problems.len(), 1, "{:?}", report.problems);
    assert!(report.problems[0].contains("/lost.txt"));
    assert_eq!(fs::read(root.path().join("ok.txt")).unwrap(), b"fine");
    assert!(!root.path().join("lost.txt").exists());
    assert!(!report.profile_written);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn changed_files_are_replaced_with_the_profile_version() {
    let (root, store, env) = setup();
    let remote = seed_file(store.as_ref(), &env, "/a.txt", b"profile version").await;
    seed_profile(store.as_ref(), &env, vec![remote]).await;
    fs::write(root.path().join("a.txt"), b"stale local").unwrap();

    let report = post_login(env, false).await.expect("post login");

    assert_eq!(report.updates, 1);
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(fs::read(root.path().join("a.txt")).unwrap(), b"profile version");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn master_drains_the_task_queue_into_the_profile() {
    let (_root, store, env) = setup();
    seed_profile(store.as_ref(), &env, vec![]).await;
    let add = ProfileTaskAction::AddNode {
        node: FileTreeNode::folder("/shared"),
    };
    enqueue_task(&env, &UserProfileTask::new("t1", add)).await.expect("enqueue");

    let report = post_login(env.clone(), true).await.expect("post login");

    assert_eq!(report.tasks_applied, 1);
    assert_eq!(report.tasks_pending, 0);
    assert!(report.profile_written);
    assert!(!store.contains(&env.task_key("t1")));
    let (profile, _) = load_profile(store.as_ref(), &env.user).await.expect("load");
    assert!(profile.find("/shared").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_profile_write_keeps_queued_tasks() {
    let (_root, store, env) = setup();
    let add = ProfileTaskAction::AddNode {
        node: FileTreeNode::folder("/shared"),
    };
    enqueue_task(&env, &UserProfileTask::new("t1", add)).await.expect("enqueue");
    store.fail_puts_for(content_keys::USER_PROFILE);

    let err = post_login(env.clone(), true).await.expect_err("profile write rejected");

    assert!(err.to_string().contains("put user profile"), "{err}");
    assert!(store.contains(&env.task_key("t1")));
    let queue = store.value(&env.queue_key()).expect("queue document");
    assert!(String::from_utf8_lossy(&queue).contains("t1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_master_leaves_the_queue_alone() {
    let (_root, store, env) = setup();
    let add = ProfileTaskAction::AddNode {
        node: FileTreeNode::folder("/shared"),
    };
    enqueue_task(&env, &UserProfileTask::new("t1", add)).await.expect("enqueue");

    let report = post_login(env.clone(), false).await.expect("post login");

    assert_eq!(report.tasks_applied, 0);
    assert!(store.contains(&env.task_key("t1")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_clients_converge_through_a_directory_store() {
    let store_dir = TempDir::new().expect("store");
    let store: Arc<dyn AsyncStore> = Arc::new(DirStore::new(store_dir.path(), 2));
    let first = TempDir::new().expect("first");
    let second = TempDir::new().expect("second");
    fs::create_dir(first.path().join("photos")).unwrap();
    fs::write(first.path().join("photos/cat.jpg"), b"meow").unwrap();

    let user = UserId::from("alice");
    let env_a = SyncEnv::new(store.clone(), user.clone(), first.path());
    let env_b = SyncEnv::new(store.clone(), user, second.path());

    let up = post_login(env_a, false).await.expect("upload side");
    assert_eq!(up.uploads, 2);
    let down = post_login(env_b, false).await.expect("download side");

    assert!(down.is_clean(), "{down:?}");
    assert_eq!(down.downloads, 2);
    assert_eq!(fs::read(second.path().join("photos/cat.jpg")).unwrap(), b"meow");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_byte_files_sync_between_clients() {
    let store = Arc::new(MemoryStore::new(2));
    let first = TempDir::new().expect("first");
    let second = TempDir::new().expect("second");
    fs::write(first.path().join(".gitkeep"), b"").unwrap();
    let user = UserId::from("alice");

    let up = post_login(SyncEnv::new(store.clone(), user.clone(), first.path()), false)
        .await
        .expect("upload side");
    assert!(up.is_clean(), "{up:?}");
    let (profile, _) = load_profile(store.as_ref(), &user).await.expect("load");
    assert!(profile.find("/.gitkeep").is_some());

    let down = post_login(SyncEnv::new(store.clone(), user, second.path()), false)
        .await
        .expect("download side");
    assert!(down.is_clean(), "{down:?}");
    assert_eq!(down.downloads, 1);
    assert!(fs::read(second.path().join(".gitkeep")).unwrap().is_empty());
}
