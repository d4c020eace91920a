use crate::config::PlatformConfig;
use crate::migrations::platform_migrations;
use crate::provider::CloudProvider;
use crate::reconcilers::{ApplicationReconciler, ClusterReconciler, HostedZoneReconciler,
                         NameserverDelegationReconciler, PostgresDatabasesReconciler, VpcReconciler};
use platform_domain::{ApplicationDeclaration, ClusterDeclaration};
use platform_persistence::{FsRemoteStorage, SqliteStoreOpener};
use reconcile::{MigrationRunner, PlatformService, Reconciler};
use semver::Version;
use std::sync::Arc;

/// Servicio con el backend de producción: estado SQLite por cluster y
/// almacenamiento remoto en un directorio.
pub type FsPlatformService = PlatformService<FsRemoteStorage, SqliteStoreOpener>;

/// Fábrica de las piezas que consume `PlatformService`.
///
/// Las listas de reconciliadores se construyen en cada llamada y en el
/// orden de aplicación; la purga las recorre al revés.
pub struct PlatformFactory;
impl PlatformFactory {
  /// `vpc → hosted-zone → nameserver-delegation → cluster → postgres-databases`
  pub fn cluster_reconcilers(provider: Arc<dyn CloudProvider>) -> Vec<Box<dyn Reconciler<ClusterDeclaration>>> {
    vec![Box::new(VpcReconciler::new(provider.clone())),
         Box::new(HostedZoneReconciler::new(provider.clone())),
         Box::new(NameserverDelegationReconciler::new(provider.clone())),
         Box::new(ClusterReconciler::new(provider.clone())),
         Box::new(PostgresDatabasesReconciler::new(provider))]
  }
  pub fn application_reconcilers(provider: Arc<dyn CloudProvider>)
                                 -> Vec<Box<dyn Reconciler<ApplicationDeclaration>>> {
    vec![Box::new(ApplicationReconciler::new(provider))]
  }
  pub fn migrations() -> MigrationRunner {
    platform_migrations()
  }
  /// Construye el servicio a partir de la configuración.
  pub fn service(config: &PlatformConfig, binary: Version) -> FsPlatformService {
    PlatformService::new(Arc::new(FsRemoteStorage::new(config.remote_dir.clone())),
                         SqliteStoreOpener,
                         config.paths(),
                         binary,
                         config.scheduler())
  }
}
