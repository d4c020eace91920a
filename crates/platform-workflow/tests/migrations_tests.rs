use platform_domain::{parse_declaration, ClusterDeclaration};
use platform_workflow::migrations::platform_migrations;
use platform_workflow::provider::CloudProvider;
use platform_workflow::reconcilers::{HostedZoneRecord, VpcRecord, DATABASE_KIND, HOSTED_ZONE_KIND, MAIN_KEY, VPC_KIND};
use platform_workflow::{PlatformConfig, PlatformFactory, SimulatedCloud};
use reconcile::stubs::{InMemoryRemoteStorage, InMemoryStateStore, InMemoryStoreOpener};
use reconcile::{ClusterIdentity, Declaration, DelayPolicy, PlatformService, ReconcileError,
                ResourceRecord, SchedulerConfig, StatePaths, StateStore, VersionGate};
use semver::Version;
use serde_json::json;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

const CLUSTER: &str = r#"
metadata:
  name: demo
  region: eu-west-1
  account_id: "123456789012"
vpc:
  cidr: 10.0.0.0/16
dns:
  root_domain: example.com
databases:
  - name: orders
"#;

fn identity() -> ClusterIdentity {
  ClusterIdentity::new("eu-west-1", "123456789012", "demo")
}

/// State as a 0.1.0 binary left it.
fn legacy_store() -> InMemoryStateStore {
  let store = InMemoryStateStore::new();
  store.save(VPC_KIND,
             ResourceRecord::new(MAIN_KEY, json!({"vpc_id": "vpc-legacy", "cidr": "10.0.0.0/16"})))
       .unwrap();
  store.save(HOSTED_ZONE_KIND,
             ResourceRecord::new(MAIN_KEY,
                                 json!({"zone_id": "zone-legacy",
                                        "name": "demo.example.com",
                                        "parent": "example.com",
                                        "name_servers": ["ns-1.legacy"]})))
       .unwrap();
  store
}

#[tokio::test]
async fn legacy_records_are_rewritten_once() {
  let store = legacy_store();
  let id = identity();
  let legacy = store.get(VPC_KIND, MAIN_KEY).unwrap().unwrap();
  assert!(legacy.decode::<VpcRecord>().is_err());

  let runner = platform_migrations();
  let applied = runner.run(&store, &id, &Version::new(0, 1, 0), &Version::new(0, 2, 0))
                      .await
                      .unwrap();
  assert_eq!(applied, vec![Version::new(0, 1, 1), Version::new(0, 2, 0)]);

  let vpc: VpcRecord = store.get(VPC_KIND, MAIN_KEY).unwrap().unwrap().decode().unwrap();
  assert_eq!(vpc.network_block, "10.0.0.0/16");
  assert_eq!(vpc.nat_gateways, 1);
  let zone: HostedZoneRecord = store.get(HOSTED_ZONE_KIND, MAIN_KEY).unwrap().unwrap().decode().unwrap();
  assert!(zone.managed);

  let again = runner.run(&store, &id, &Version::new(0, 1, 0), &Version::new(0, 2, 0))
                    .await
                    .unwrap();
  assert!(again.is_empty());
}

#[tokio::test]
async fn only_migrations_newer_than_the_original_version_run() {
  let store = legacy_store();
  let applied = platform_migrations().run(&store, &identity(), &Version::new(0, 1, 1), &Version::new(0, 2, 0))
                                     .await
                                     .unwrap();
  assert_eq!(applied, vec![Version::new(0, 2, 0)]);
  let zone = store.get(HOSTED_ZONE_KIND, MAIN_KEY).unwrap().unwrap();
  assert!(zone.attributes.get("managed").is_none());
}

#[tokio::test]
async fn upgrade_migrates_legacy_state_and_apply_adopts_it() {
  let dir = tempfile::tempdir().unwrap();
  let remote = Arc::new(InMemoryRemoteStorage::new());
  let id = identity();

  let legacy = legacy_store();
  let old = Version::new(0, 1, 0);
  let gate = VersionGate::new(&legacy, &id, &old);
  gate.save_original_version(&old).unwrap();
  gate.save_cluster_version(&old).unwrap();
  remote.insert(&id.state_key(), legacy.to_bytes().unwrap());

  let svc = PlatformService::new(remote.clone(),
                                 InMemoryStoreOpener,
                                 StatePaths::new(dir.path().join("state"), dir.path().join("backups")),
                                 Version::new(0, 2, 0),
                                 SchedulerConfig { delay: DelayPolicy::Fixed(Duration::ZERO),
                                                   max_generations: Some(20) });
  let sim = Arc::new(SimulatedCloud::new());
  let provider: Arc<dyn CloudProvider> = sim.clone();
  let decl: ClusterDeclaration = parse_declaration(CLUSTER).unwrap();
  assert_eq!(decl.identity(), id);

  let err = svc.apply(&decl,
                      PlatformFactory::cluster_reconcilers(provider),
                      &PlatformFactory::migrations(),
                      &*sim,
                      pending())
               .await
               .unwrap_err();
  assert!(matches!(err, ReconcileError::VersionMismatch { .. }));

  let upgrade = svc.upgrade(&decl, &PlatformFactory::migrations(), &*sim, pending())
                   .await
                   .expect("upgrade");
  assert_eq!(upgrade.from, Some(old.clone()));
  assert_eq!(upgrade.migrated, vec![Version::new(0, 1, 1), Version::new(0, 2, 0)]);

  let vpc = svc.show(&decl, pending(), |store| {
                     let record = store.get(VPC_KIND, MAIN_KEY)?
                                       .ok_or_else(|| ReconcileError::NotFound("vpc".into()))?;
                     record.decode::<VpcRecord>()
                   })
                 .await
                 .expect("show");
  assert_eq!(vpc.vpc_id, "vpc-legacy");
  assert_eq!(vpc.network_block, "10.0.0.0/16");
  assert_eq!(sim.calls().len(), 0);
}

#[tokio::test]
async fn sqlite_backed_service_round_trip() {
  let dir = tempfile::tempdir().unwrap();
  let config = PlatformConfig { state_dir: dir.path().join("state"),
                                backup_dir: dir.path().join("backups"),
                                remote_dir: dir.path().join("remote"),
                                requeue_delay: Duration::ZERO,
                                ..PlatformConfig::default() };
  let svc = PlatformFactory::service(&config, Version::new(0, 2, 0));
  let sim = Arc::new(SimulatedCloud::new().with_readiness_polls(1));
  let decl: ClusterDeclaration = parse_declaration(CLUSTER).unwrap();

  let report = svc.apply(&decl,
                         PlatformFactory::cluster_reconcilers(sim.clone()),
                         &PlatformFactory::migrations(),
                         &*sim,
                         pending())
                  .await
                  .expect("apply");
  assert!(report.run.generations > 1);
  assert!(dir.path().join("remote").join(decl.identity().state_key()).exists());

  let databases = svc.show(&decl, pending(), |store| Ok(store.enumerate(DATABASE_KIND)?.len()))
                     .await
                     .expect("show");
  assert_eq!(databases, 1);
}
