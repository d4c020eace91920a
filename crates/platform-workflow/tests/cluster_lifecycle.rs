use platform_domain::{parse_declaration, ApplicationDeclaration, ClusterDeclaration};
use platform_workflow::provider::CloudProvider;
use platform_workflow::reconcilers::{ClusterRecord, VpcRecord, CLUSTER_KIND, DATABASE_KIND, MAIN_KEY, VPC_KIND};
use platform_workflow::{PlatformFactory, SimulatedCloud};
use reconcile::stubs::{InMemoryRemoteStorage, InMemoryStateStore, InMemoryStoreOpener};
use reconcile::{Declaration, DelayPolicy, Direction, PlatformService, ReconcileError, Scheduler, SchedulerConfig, StatePaths,
                StateStore};
use semver::Version;
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
  - name: billing
"#;

const APP: &str = r#"
metadata:
  name: web
  namespace: shop
cluster:
  name: demo
  region: eu-west-1
  account_id: "123456789012"
image: ghcr.io/acme/web:1.0.0
port: 8080
replicas: 2
subdomain: shop
postgres: orders
"#;

type Service = PlatformService<InMemoryRemoteStorage, InMemoryStoreOpener>;

fn fast() -> SchedulerConfig {
  SchedulerConfig { delay: DelayPolicy::Fixed(Duration::ZERO),
                    max_generations: Some(20) }
}

fn service(remote: &Arc<InMemoryRemoteStorage>, dir: &tempfile::TempDir) -> Service {
  PlatformService::new(remote.clone(),
                       InMemoryStoreOpener,
                       StatePaths::new(dir.path().join("state"), dir.path().join("backups")),
                       Version::new(0, 2, 0),
                       fast())
}

fn cluster() -> ClusterDeclaration {
  parse_declaration(CLUSTER).unwrap()
}

fn provider(sim: &Arc<SimulatedCloud>) -> Arc<dyn CloudProvider> {
  sim.clone()
}

fn remote_state(remote: &InMemoryRemoteStorage, decl: &ClusterDeclaration) -> InMemoryStateStore {
  let bytes = remote.object(&decl.identity().state_key()).expect("remote state");
  InMemoryStateStore::read_only(InMemoryStateStore::from_bytes(&bytes).unwrap())
}

fn count(calls: &[String], op: &str) -> usize {
  calls.iter().filter(|c| c.as_str() == op).count()
}

#[test]
fn reconcilers_are_ordered_by_dependency() {
  let sim = Arc::new(SimulatedCloud::new());
  let scheduler = Scheduler::new(PlatformFactory::cluster_reconcilers(provider(&sim)), fast());
  assert_eq!(scheduler.order(Direction::Apply),
             vec!["vpc", "hosted-zone", "nameserver-delegation", "cluster", "postgres-databases"]);
  assert_eq!(scheduler.order(Direction::Purge),
             vec!["postgres-databases", "cluster", "nameserver-delegation", "hosted-zone", "vpc"]);
}

#[tokio::test]
async fn cluster_apply_waits_for_readiness_and_is_idempotent() {
  let dir = tempfile::tempdir().unwrap();
  let remote = Arc::new(InMemoryRemoteStorage::new());
  let svc = service(&remote, &dir);
  let sim = Arc::new(SimulatedCloud::new().with_readiness_polls(1));
  let decl = cluster();

  let report = svc.apply(&decl,
                         PlatformFactory::cluster_reconcilers(provider(&sim)),
                         &PlatformFactory::migrations(),
                         &*sim,
                         pending())
                  .await
                  .expect("apply");
  assert_eq!(report.run.generations, 3);
  assert_eq!(report.run.requeued[0], vec!["nameserver-delegation".to_string(), "cluster".to_string()]);
  assert_eq!(report.original_version, Version::new(0, 2, 0));
  // a fresh cluster has nothing to migrate
  assert!(report.migrated.is_empty());
  assert_eq!(sim.live_resources(), 6);

  let state = remote_state(&remote, &decl);
  let cluster: ClusterRecord = state.get(CLUSTER_KIND, MAIN_KEY).unwrap().unwrap().decode().unwrap();
  assert!(cluster.endpoint.is_some());
  assert_eq!(state.enumerate(DATABASE_KIND).unwrap().len(), 2);

  let before = sim.calls();
  let again = svc.apply(&decl,
                        PlatformFactory::cluster_reconcilers(provider(&sim)),
                        &PlatformFactory::migrations(),
                        &*sim,
                        pending())
                 .await
                 .expect("second apply");
  assert_eq!(again.run.generations, 1);
  assert_eq!(sim.calls(), before);
}

#[tokio::test]
async fn cluster_purge_tears_down_in_reverse_and_deletes_state() {
  let dir = tempfile::tempdir().unwrap();
  let remote = Arc::new(InMemoryRemoteStorage::new());
  let svc = service(&remote, &dir);
  let sim = Arc::new(SimulatedCloud::new().with_readiness_polls(1));
  let decl = cluster();

  svc.apply(&decl,
            PlatformFactory::cluster_reconcilers(provider(&sim)),
            &PlatformFactory::migrations(),
            &*sim,
            pending())
     .await
     .unwrap();

  let report = svc.purge(&decl, PlatformFactory::cluster_reconcilers(provider(&sim)), pending())
                  .await
                  .expect("purge");
  assert_eq!(report.run.generations, 3);
  assert_eq!(sim.live_resources(), 0);
  assert!(report.backup.expect("backup").exists());
  assert!(remote.object(&decl.identity().state_key()).is_none());

  let calls = sim.calls();
  let pos = |op: &str| calls.iter().position(|c| c == op).unwrap();
  assert!(pos("delete_database") < pos("delete_cluster"));
  assert!(pos("remove_delegation") < pos("delete_hosted_zone"));
  assert!(pos("delete_cluster") < pos("delete_vpc"));
}

#[tokio::test]
async fn removed_databases_are_pruned() {
  let dir = tempfile::tempdir().unwrap();
  let remote = Arc::new(InMemoryRemoteStorage::new());
  let svc = service(&remote, &dir);
  let sim = Arc::new(SimulatedCloud::new());
  let mut decl = cluster();

  svc.apply(&decl,
            PlatformFactory::cluster_reconcilers(provider(&sim)),
            &PlatformFactory::migrations(),
            &*sim,
            pending())
     .await
     .unwrap();
  decl.databases.retain(|d| d.name == "orders");
  svc.apply(&decl,
            PlatformFactory::cluster_reconcilers(provider(&sim)),
            &PlatformFactory::migrations(),
            &*sim,
            pending())
     .await
     .unwrap();

  let dbs = remote_state(&remote, &decl).enumerate(DATABASE_KIND).unwrap();
  assert_eq!(dbs.len(), 1);
  assert_eq!(dbs[0].key, "orders");
  assert_eq!(count(&sim.calls(), "delete_database"), 1);
}

#[tokio::test]
async fn provider_failure_keeps_progress_for_the_next_run() {
  let dir = tempfile::tempdir().unwrap();
  let remote = Arc::new(InMemoryRemoteStorage::new());
  let svc = service(&remote, &dir);
  let sim = Arc::new(SimulatedCloud::new());
  let decl = cluster();
  sim.fail_on("create_cluster");

  let err = svc.apply(&decl,
                      PlatformFactory::cluster_reconcilers(provider(&sim)),
                      &PlatformFactory::migrations(),
                      &*sim,
                      pending())
               .await
               .unwrap_err();
  assert!(matches!(err, ReconcileError::Reconciler { ref reconciler, .. } if reconciler == "cluster"));
  let state = remote_state(&remote, &decl);
  let vpc: VpcRecord = state.get(VPC_KIND, MAIN_KEY).unwrap().unwrap().decode().unwrap();
  assert_eq!(vpc.network_block, "10.0.0.0/16");
  // databases come after the cluster and never ran
  assert!(state.enumerate(DATABASE_KIND).unwrap().is_empty());

  sim.heal("create_cluster");
  svc.apply(&decl,
            PlatformFactory::cluster_reconcilers(provider(&sim)),
            &PlatformFactory::migrations(),
            &*sim,
            pending())
     .await
     .expect("second attempt converges");
  assert_eq!(count(&sim.calls(), "create_vpc"), 1);
}

#[tokio::test]
async fn network_block_cannot_change() {
  let dir = tempfile::tempdir().unwrap();
  let remote = Arc::new(InMemoryRemoteStorage::new());
  let svc = service(&remote, &dir);
  let sim = Arc::new(SimulatedCloud::new());
  let mut decl = cluster();

  svc.apply(&decl,
            PlatformFactory::cluster_reconcilers(provider(&sim)),
            &PlatformFactory::migrations(),
            &*sim,
            pending())
     .await
     .unwrap();
  decl.vpc.cidr = "10.1.0.0/16".into();
  let err = svc.apply(&decl,
                      PlatformFactory::cluster_reconcilers(provider(&sim)),
                      &PlatformFactory::migrations(),
                      &*sim,
                      pending())
               .await
               .unwrap_err();
  match err {
    ReconcileError::Reconciler { reconciler, source } => {
      assert_eq!(reconciler, "vpc");
      assert!(matches!(*source, ReconcileError::Validation(_)));
    }
    other => panic!("unexpected error {:?}", other),
  }
}

#[tokio::test]
async fn application_deploys_onto_an_applied_cluster() {
  let dir = tempfile::tempdir().unwrap();
  let remote = Arc::new(InMemoryRemoteStorage::new());
  let svc = service(&remote, &dir);
  let sim = Arc::new(SimulatedCloud::new());
  let app: ApplicationDeclaration = parse_declaration(APP).unwrap();

  let err = svc.apply(&app,
                      PlatformFactory::application_reconcilers(provider(&sim)),
                      &PlatformFactory::migrations(),
                      &*sim,
                      pending())
               .await
               .unwrap_err();
  match err {
    ReconcileError::Reconciler { source, .. } => assert!(matches!(*source, ReconcileError::NotFound(_))),
    other => panic!("unexpected error {:?}", other),
  }

  let decl = cluster();
  svc.apply(&decl,
            PlatformFactory::cluster_reconcilers(provider(&sim)),
            &PlatformFactory::migrations(),
            &*sim,
            pending())
     .await
     .unwrap();
  svc.apply(&app,
            PlatformFactory::application_reconcilers(provider(&sim)),
            &PlatformFactory::migrations(),
            &*sim,
            pending())
     .await
     .expect("deploy");

  let cluster: ClusterRecord = remote_state(&remote, &decl).get(CLUSTER_KIND, MAIN_KEY)
                                                           .unwrap()
                                                           .unwrap()
                                                           .decode()
                                                           .unwrap();
  let deployed = sim.deployment(&cluster.cluster_id, "shop", "web").expect("deployed");
  assert_eq!(deployed.host.as_deref(), Some("shop.demo.example.com"));
  assert!(deployed.database_endpoint.unwrap().starts_with("orders."));
  assert_eq!(deployed.replicas, 2);

  let report = svc.purge(&app, PlatformFactory::application_reconcilers(provider(&sim)), pending())
                  .await
                  .expect("remove app");
  assert!(report.backup.is_none());
  assert!(sim.deployment(&cluster.cluster_id, "shop", "web").is_none());
  // the cluster state is untouched
  assert!(remote_state(&remote, &decl).get(VPC_KIND, MAIN_KEY).unwrap().is_some());
}

#[tokio::test]
async fn persistent_cloud_is_shared_between_runs() {
  let dir = tempfile::tempdir().unwrap();
  let remote = Arc::new(InMemoryRemoteStorage::new());
  let svc = service(&remote, &dir);
  let backing = dir.path().join("remote").join("simulated-cloud.json");
  let decl = cluster();

  // first run: only the cluster
  {
    let first = Arc::new(SimulatedCloud::persistent(&backing).with_readiness_polls(1));
    svc.apply(&decl,
              PlatformFactory::cluster_reconcilers(provider(&first)),
              &PlatformFactory::migrations(),
              &*first,
              pending())
       .await
       .expect("cluster apply");
  }
  assert!(backing.exists());

  // second run: a new cloud instance must still find the active cluster
  let second = Arc::new(SimulatedCloud::persistent(&backing).with_readiness_polls(1));
  assert_eq!(second.live_resources(), 6);
  let app: ApplicationDeclaration = parse_declaration(APP).unwrap();
  svc.apply(&app,
            PlatformFactory::application_reconcilers(provider(&second)),
            &PlatformFactory::migrations(),
            &*second,
            pending())
     .await
     .expect("application apply");
  assert_eq!(count(&second.calls(), "create_cluster"), 0);

  let cluster: ClusterRecord = remote_state(&remote, &decl).get(CLUSTER_KIND, MAIN_KEY)
                                                           .unwrap()
                                                           .unwrap()
                                                           .decode()
                                                           .unwrap();
  assert!(second.deployment(&cluster.cluster_id, "shop", "web").is_some());
  let third = SimulatedCloud::persistent(&backing);
  assert!(third.deployment(&cluster.cluster_id, "shop", "web").is_some());
}
