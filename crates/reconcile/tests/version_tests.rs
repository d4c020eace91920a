use async_trait::async_trait;
use reconcile::stubs::InMemoryStateStore;
use reconcile::{ClusterIdentity, Migration, MigrationRunner, NoVersionTags, OriginalVersionSource, ReconcileError,
                ResourceRecord, Result, StateStore, VersionGate, VersionState};
use semver::Version;
use serde_json::json;
use std::sync::{Arc, Mutex};

fn identity() -> ClusterIdentity {
  ClusterIdentity::new("eu-west-1", "123456789012", "demo")
}

fn v(s: &str) -> Version {
  Version::parse(s).unwrap()
}

#[test]
fn cluster_version_never_moves_backwards() {
  let store = InMemoryStateStore::new();
  let id = identity();
  let binary = v("0.0.60");
  let gate = VersionGate::new(&store, &id, &binary);

  assert!(gate.save_cluster_version(&v("0.0.60")).unwrap());
  assert!(!gate.save_cluster_version(&v("0.0.60")).unwrap());

  let err = gate.save_cluster_version(&v("0.0.50")).unwrap_err();
  match err {
    ReconcileError::VersionRegression { stored, attempted } => {
      assert_eq!(stored, v("0.0.60"));
      assert_eq!(attempted, v("0.0.50"));
    }
    other => panic!("unexpected error {:?}", other),
  }
  assert_eq!(gate.cluster_version().unwrap(), Some(v("0.0.60")));
}

#[tokio::test]
async fn fresh_cluster_records_binary_as_original_and_current() {
  let store = InMemoryStateStore::new();
  let id = identity();
  let binary = v("0.1.0");
  let gate = VersionGate::new(&store, &id, &binary);

  assert_eq!(gate.state().unwrap(), VersionState::Unset);
  gate.validate_binary_equals_cluster().expect("fresh cluster passes");

  let original = gate.ensure_original_version(&NoVersionTags).await.unwrap();
  assert_eq!(original, v("0.1.0"));
  assert_eq!(gate.state().unwrap(), VersionState::OriginalRecorded { original: v("0.1.0") });

  gate.save_cluster_version(&binary).unwrap();
  assert_eq!(gate.state().unwrap(),
             VersionState::CurrentTracked { original: v("0.1.0"),
                                            current: v("0.1.0") });
}

#[test]
fn newer_binary_must_upgrade_before_apply() {
  let store = InMemoryStateStore::new();
  let id = identity();
  let old = v("0.1.0");
  VersionGate::new(&store, &id, &old).save_cluster_version(&old).unwrap();

  let newer = v("0.2.0");
  let gate = VersionGate::new(&store, &id, &newer);
  let err = gate.validate_binary_equals_cluster().unwrap_err();
  assert!(matches!(err, ReconcileError::VersionMismatch { .. }));
  assert!(err.to_string().contains("upgrade"));
  gate.validate_binary_not_less_than_cluster().expect("newer binary may read");

  let older = v("0.0.9");
  let gate = VersionGate::new(&store, &id, &older);
  assert!(matches!(gate.validate_binary_not_less_than_cluster(), Err(ReconcileError::BinaryTooOld { .. })));
}

struct Tagged(Version);

#[async_trait]
impl OriginalVersionSource for Tagged {
  async fn original_version_tag(&self, _identity: &ClusterIdentity) -> Result<Option<Version>> {
    Ok(Some(self.0.clone()))
  }
}

#[tokio::test]
async fn original_version_is_write_once_and_prefers_tags() {
  let store = InMemoryStateStore::new();
  let id = identity();
  let binary = v("0.3.0");
  let gate = VersionGate::new(&store, &id, &binary);

  assert_eq!(gate.resolve_original_version(&Tagged(v("0.0.40"))).await.unwrap(), v("0.0.40"));
  // resolving alone writes nothing
  assert_eq!(gate.original_version().unwrap(), None);

  gate.ensure_original_version(&Tagged(v("0.0.40"))).await.unwrap();
  assert!(!gate.save_original_version(&v("0.2.0")).unwrap());
  assert_eq!(gate.original_version().unwrap(), Some(v("0.0.40")));
}

struct Recording {
  version: Version,
  name: String,
  fail: bool,
  log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Migration for Recording {
  fn version(&self) -> Version {
    self.version.clone()
  }

  fn name(&self) -> &str {
    &self.name
  }

  async fn migrate(&self, store: &dyn StateStore, _identity: &ClusterIdentity) -> Result<()> {
    self.log.lock().unwrap().push(self.version.to_string());
    if self.fail {
      return Err(ReconcileError::Other("boom".into()));
    }
    store.save("touched", ResourceRecord::new(self.version.to_string(), json!({})))
  }
}

fn migration(version: &str, fail: bool, log: &Arc<Mutex<Vec<String>>>) -> Box<dyn Migration> {
  Box::new(Recording { version: v(version),
                       name: format!("step-{}", version),
                       fail,
                       log: log.clone() })
}

#[tokio::test]
async fn migrations_run_in_order_within_window_once() {
  let log = Arc::new(Mutex::new(Vec::new()));
  let runner = MigrationRunner::new(vec![migration("0.3.0", false, &log),
                                         migration("0.1.0", false, &log),
                                         migration("0.2.0", false, &log),
                                         migration("0.4.0", false, &log)]);
  let store = InMemoryStateStore::new();
  let id = identity();

  let applied = runner.run(&store, &id, &v("0.1.0"), &v("0.3.0")).await.unwrap();
  assert_eq!(applied, vec![v("0.2.0"), v("0.3.0")]);
  assert_eq!(*log.lock().unwrap(), vec!["0.2.0", "0.3.0"]);

  let again = runner.run(&store, &id, &v("0.1.0"), &v("0.3.0")).await.unwrap();
  assert!(again.is_empty());
  assert_eq!(log.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn failing_migration_aborts_the_rest() {
  let log = Arc::new(Mutex::new(Vec::new()));
  let runner = MigrationRunner::new(vec![migration("0.1.1", false, &log),
                                         migration("0.1.2", true, &log),
                                         migration("0.1.3", false, &log)]);
  let store = InMemoryStateStore::new();
  let id = identity();

  let err = runner.run(&store, &id, &v("0.1.0"), &v("0.2.0")).await.unwrap_err();
  match err {
    ReconcileError::Migration { version, .. } => assert_eq!(version, v("0.1.2")),
    other => panic!("unexpected error {:?}", other),
  }
  assert_eq!(*log.lock().unwrap(), vec!["0.1.1", "0.1.2"]);
  assert!(store.get("touched", "0.1.3").unwrap().is_none());

  // the successful one is remembered; only the failed one is pending
  let pending: Vec<Version> = runner.pending(&store, &v("0.1.0"), &v("0.2.0"))
                                    .unwrap()
                                    .iter()
                                    .map(|m| m.version())
                                    .collect();
  assert_eq!(pending, vec![v("0.1.2"), v("0.1.3")]);
}
