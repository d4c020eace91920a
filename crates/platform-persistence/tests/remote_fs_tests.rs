use platform_persistence::{remote_from_env, FsRemoteStorage, SqliteStoreOpener};
use reconcile::{with_state, Access, ClusterIdentity, ReconcileError, RemoteStateGuard, RemoteStorage, ResourceRecord,
                StatePaths, StateStore};
use serde_json::json;
use std::future::pending;
use std::sync::Arc;

#[tokio::test]
async fn objects_roundtrip_and_lock_semantics() {
  let dir = tempfile::tempdir().unwrap();
  let remote = FsRemoteStorage::new(dir.path());

  assert_eq!(remote.get_object("a/b/state.db").await.unwrap(), None);
  remote.put_object("a/b/state.db", b"one").await.unwrap();
  remote.put_object("a/b/state.db", b"two").await.unwrap();
  assert_eq!(remote.get_object("a/b/state.db").await.unwrap(), Some(b"two".to_vec()));

  assert!(remote.put_if_absent("a/b/state.lock", b"me").await.unwrap());
  assert!(!remote.put_if_absent("a/b/state.lock", b"you").await.unwrap());
  assert_eq!(remote.get_object("a/b/state.lock").await.unwrap(), Some(b"me".to_vec()));

  remote.delete_object("a/b/state.lock").await.unwrap();
  remote.delete_object("a/b/state.lock").await.unwrap();
  assert_eq!(remote.get_object("a/b/state.lock").await.unwrap(), None);

  // no temporaries are left behind
  let names: Vec<String> = std::fs::read_dir(dir.path().join("a/b")).unwrap()
                                                                    .map(|e| e.unwrap().file_name().into_string().unwrap())
                                                                    .collect();
  assert_eq!(names, vec!["state.db".to_string()]);
}

#[tokio::test]
async fn keys_cannot_escape_the_root() {
  let dir = tempfile::tempdir().unwrap();
  let remote = FsRemoteStorage::new(dir.path().join("root"));
  assert!(matches!(remote.put_object("../escape", b"x").await, Err(ReconcileError::Validation(_))));
  assert!(matches!(remote.get_object("/etc/passwd").await, Err(ReconcileError::Validation(_))));
}

#[test]
fn remote_dir_comes_from_environment() {
  std::env::set_var("KUBEPLAT_REMOTE_DIR", "/tmp/kubeplat-remote-test");
  let remote = remote_from_env();
  assert_eq!(remote.root(), std::path::Path::new("/tmp/kubeplat-remote-test"));
}

#[tokio::test]
async fn scoped_state_with_sqlite_and_filesystem_remote() {
  let dir = tempfile::tempdir().unwrap();
  let remote = Arc::new(FsRemoteStorage::new(dir.path().join("remote")));
  let paths = StatePaths::new(dir.path().join("state"), dir.path().join("backups"));
  let id = ClusterIdentity::new("eu-west-1", "123456789012", "demo");

  let writer = RemoteStateGuard::new(remote.clone(), id.clone(), paths.clone());
  with_state(&writer, &SqliteStoreOpener, Access::Writable, "apply", pending(), |store| async move {
    store.save("vpc", ResourceRecord::new("main", json!({"id": "vpc-123"})))
  }).await
    .expect("writable scope");

  assert!(remote.get_object(&id.lock_key()).await.unwrap().is_none());
  assert!(remote.get_object(&id.digest_key()).await.unwrap().is_some());

  let reader = RemoteStateGuard::new(remote.clone(), id.clone(), paths);
  let vpc = with_state(&reader, &SqliteStoreOpener, Access::ReadOnly, "show", pending(), |store| async move {
              store.get("vpc", "main")
            }).await
              .expect("read only scope")
              .expect("record uploaded");
  assert_eq!(vpc.attributes["id"], "vpc-123");
}

#[tokio::test]
async fn read_only_download_does_not_clobber_a_locked_run() {
  let dir = tempfile::tempdir().unwrap();
  let remote = Arc::new(FsRemoteStorage::new(dir.path().join("remote")));
  let paths = StatePaths::new(dir.path().join("state"), dir.path().join("backups"));
  let id = ClusterIdentity::new("eu-west-1", "123456789012", "demo");

  let writer = RemoteStateGuard::new(remote.clone(), id.clone(), paths.clone());
  let reader = RemoteStateGuard::new(remote.clone(), id.clone(), paths.clone());
  let reader_ref = &reader;
  with_state(&writer, &SqliteStoreOpener, Access::Writable, "apply", pending(), |store| async move {
    store.save("cluster", ResourceRecord::new("main", json!({"id": "eks-1"})))?;
    let copy = reader_ref.download(false).await?;
    assert_ne!(copy, reader_ref.local_path());
    store.save("postgres_database", ResourceRecord::new("orders", json!({"id": "db-1"})))
  }).await
    .expect("writable scope");
  reader.discard_read_only().await.unwrap();

  let check = RemoteStateGuard::new(remote.clone(), id.clone(), paths);
  let (cluster, db) = with_state(&check, &SqliteStoreOpener, Access::ReadOnly, "show", pending(), |store| async move {
                        Ok((store.get("cluster", "main")?, store.get("postgres_database", "orders")?))
                      }).await
                        .expect("read only scope");
  assert!(cluster.is_some());
  assert!(db.is_some());

  // only the shared writable copy stays on disk
  let names: Vec<String> = std::fs::read_dir(dir.path().join("state")).unwrap()
                                                                     .map(|e| e.unwrap().file_name().into_string().unwrap())
                                                                     .collect();
  assert_eq!(names, vec![check.local_path().file_name().unwrap().to_string_lossy().to_string()]);
}
