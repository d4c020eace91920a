// Archivo: service.rs
// Propósito: implementar `PlatformService`, la capa orquestadora que
// compone guard, gate de versiones, migraciones y scheduler en las
// operaciones completas: apply, purge, upgrade y show.
use crate::domain::{Access, ClusterIdentity, Declaration, ReconcileMeta};
use crate::engine::{RunReport, Scheduler, SchedulerConfig};
use crate::errors::{ReconcileError, Result};
use crate::guard::{RemoteStateGuard, StatePaths};
use crate::reconciler::Reconciler;
use crate::repository::{RemoteStorage, StateStore, StoreOpener};
use crate::scope::with_state;
use crate::version::{MigrationRunner, OriginalVersionSource, VersionGate, VersionState};
use semver::Version;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

/// Resultado de un `apply`.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub identity: ClusterIdentity,
    pub run: RunReport,
    pub migrated: Vec<Version>,
    pub original_version: Version,
    pub cluster_version: Version,
}

/// Resultado de una purga.
#[derive(Debug, Clone)]
pub struct PurgeReport {
    pub identity: ClusterIdentity,
    pub run: RunReport,
    /// Copia local del estado tomada antes de borrar el remoto. `None` si
    /// la declaración no es dueña del estado y éste se conserva.
    pub backup: Option<PathBuf>,
}

/// Resultado de un `upgrade`.
#[derive(Debug, Clone)]
pub struct UpgradeReport {
    pub identity: ClusterIdentity,
    pub from: Option<Version>,
    pub to: Version,
    pub migrated: Vec<Version>,
}

/// Servicio de alto nivel que expone las operaciones sobre un cluster.
///
/// Esta capa orquesta el almacenamiento remoto, el opener del estado local
/// y el scheduler. Está pensada para ser invocada desde el binario.
pub struct PlatformService<R, O>
    where R: RemoteStorage,
          O: StoreOpener
{
    remote: Arc<R>,
    opener: O,
    paths: StatePaths,
    binary: Version,
    scheduler: SchedulerConfig,
}

impl<R, O> PlatformService<R, O>
    where R: RemoteStorage,
          O: StoreOpener
{
    pub fn new(remote: Arc<R>, opener: O, paths: StatePaths, binary: Version, scheduler: SchedulerConfig) -> Self {
        Self { remote,
               opener,
               paths,
               binary,
               scheduler }
    }

    /// Versión del binario con la que opera el servicio.
    pub fn binary_version(&self) -> &Version {
        &self.binary
    }

    /// Crea un guard nuevo (con su propio poseedor de lock) para `identity`.
    pub fn guard(&self, identity: ClusterIdentity) -> RemoteStateGuard<R> {
        RemoteStateGuard::new(self.remote.clone(), identity, self.paths.clone())
    }

    /// Crea o actualiza los recursos de la declaración.
    ///
    /// Orden: validar -> lock -> descargar -> gate de versión igual ->
    /// migraciones pendientes -> scheduler hacia delante -> registrar
    /// versiones -> subir -> liberar.
    pub async fn apply<D, I>(&self,
                             declaration: &D,
                             reconcilers: Vec<Box<dyn Reconciler<D>>>,
                             migrations: &MigrationRunner,
                             versions: &dyn OriginalVersionSource,
                             interrupt: I)
                             -> Result<ApplyReport>
        where D: Declaration,
              I: Future<Output = ()>
    {
        declaration.validate()?;
        let identity = declaration.identity();
        let guard = self.guard(identity.clone());
        let scheduler = Scheduler::new(reconcilers, self.scheduler.clone());
        let binary = &self.binary;

        with_state(&guard, &self.opener, Access::Writable, "apply", interrupt, |store| async move {
            let gate = VersionGate::new(&*store, &identity, binary);
            gate.validate_binary_equals_cluster()?;
            let original = gate.resolve_original_version(versions).await?;
            let migrated = migrations.run(&*store, &identity, &original, binary).await?;

            let meta = ReconcileMeta { declaration,
                                       identity: &identity,
                                       purge: false };
            let run = scheduler.run(&meta, &*store).await?;

            gate.save_original_version(&original)?;
            gate.save_cluster_version(binary)?;
            Ok(ApplyReport { identity: identity.clone(),
                             run,
                             migrated,
                             original_version: original,
                             cluster_version: binary.clone() })
        }).await
    }

    /// Borra los recursos en orden inverso. Si la declaración es dueña del
    /// estado, después borra el estado remoto (con backup local previo); si
    /// no, el estado se sube como en cualquier otra operación.
    pub async fn purge<D, I>(&self,
                             declaration: &D,
                             reconcilers: Vec<Box<dyn Reconciler<D>>>,
                             interrupt: I)
                             -> Result<PurgeReport>
        where D: Declaration,
              I: Future<Output = ()>
    {
        declaration.validate()?;
        let identity = declaration.identity();
        let guard = self.guard(identity.clone());
        let scheduler = Scheduler::new(reconcilers, self.scheduler.clone());
        let binary = &self.binary;
        let guard_ref = &guard;

        with_state(&guard, &self.opener, Access::Writable, "purge", interrupt, |store| async move {
            VersionGate::new(&*store, &identity, binary).validate_binary_equals_cluster()?;

            let meta = ReconcileMeta { declaration,
                                       identity: &identity,
                                       purge: true };
            let run = scheduler.run(&meta, &*store).await?;

            let backup = if declaration.owns_state() {
                store.flush()?;
                Some(guard_ref.purge().await?)
            } else {
                None
            };
            Ok(PurgeReport { identity: identity.clone(),
                             run,
                             backup })
        }).await
    }

    /// Lleva el estado del cluster a la versión del binario: ejecuta las
    /// migraciones pendientes y avanza `ClusterVersion`.
    pub async fn upgrade<D, I>(&self,
                               declaration: &D,
                               migrations: &MigrationRunner,
                               versions: &dyn OriginalVersionSource,
                               interrupt: I)
                               -> Result<UpgradeReport>
        where D: Declaration,
              I: Future<Output = ()>
    {
        declaration.validate()?;
        let identity = declaration.identity();
        let guard = self.guard(identity.clone());
        let binary = &self.binary;

        with_state(&guard, &self.opener, Access::Writable, "upgrade", interrupt, |store| async move {
            let gate = VersionGate::new(&*store, &identity, binary);
            gate.validate_binary_not_less_than_cluster()?;
            if gate.state()? == VersionState::Unset {
                return Err(ReconcileError::Validation(format!("{} no tiene versión registrada; ejecuta apply primero",
                                                              identity)));
            }
            let from = gate.cluster_version()?;
            let original = gate.ensure_original_version(versions).await?;
            let migrated = migrations.run(&*store, &identity, &original, binary).await?;
            gate.save_cluster_version(binary)?;
            Ok(UpgradeReport { identity: identity.clone(),
                               from,
                               to: binary.clone(),
                               migrated })
        }).await
    }

    /// Operación de sólo lectura: descarga sin lock, exige un binario no
    /// más antiguo que el cluster y entrega el almacén a `f`.
    pub async fn show<D, I, T, F>(&self, declaration: &D, interrupt: I, f: F) -> Result<T>
        where D: Declaration,
              I: Future<Output = ()>,
              F: FnOnce(&dyn StateStore) -> Result<T>
    {
        declaration.validate()?;
        let identity = declaration.identity();
        let guard = self.guard(identity.clone());
        let binary = &self.binary;

        with_state(&guard, &self.opener, Access::ReadOnly, "show", interrupt, |store| async move {
            VersionGate::new(&*store, &identity, binary).validate_binary_not_less_than_cluster()?;
            f(&*store)
        }).await
    }
}
