// Archivo: guard.rs
// Propósito: proteger la mutación del estado compartido: lock remoto,
// descarga/subida del fichero de estado y purga con backup obligatorio.
use crate::domain::{Access, ClusterIdentity, LockInfo};
use crate::errors::{ReconcileError, Result};
use crate::repository::RemoteStorage;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Directorios locales usados por el guard.
#[derive(Debug, Clone)]
pub struct StatePaths {
    /// Donde se descarga el estado de cada cluster.
    pub state_dir: PathBuf,
    /// Donde se guardan las copias previas a una purga.
    pub backup_dir: PathBuf,
}

impl StatePaths {
    pub fn new(state_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self { state_dir: state_dir.into(),
               backup_dir: backup_dir.into() }
    }
}

/// Fase del fichero local respecto del remoto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalPhase {
    NotDownloaded,
    Downloaded(Access),
    Purged,
}

#[derive(Debug)]
struct GuardState {
    phase: LocalPhase,
    lock: Option<LockInfo>,
}

/// Guard del estado remoto de un cluster.
///
/// Todas las operaciones se acotan a una `ClusterIdentity`. El lock no es
/// reentrante ni bloqueante: si otro lo tiene, `acquire_lock` falla con
/// `AlreadyLocked` y el caller decide.
pub struct RemoteStateGuard<R>
    where R: RemoteStorage
{
    remote: Arc<R>,
    identity: ClusterIdentity,
    paths: StatePaths,
    holder: Uuid,
    state: Mutex<GuardState>,
}

impl<R> RemoteStateGuard<R> where R: RemoteStorage
{
    pub fn new(remote: Arc<R>, identity: ClusterIdentity, paths: StatePaths) -> Self {
        Self { remote,
               identity,
               paths,
               holder: Uuid::new_v4(),
               state: Mutex::new(GuardState { phase: LocalPhase::NotDownloaded,
                                              lock: None }) }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, GuardState>> {
        self.state
            .lock()
            .map_err(|e| ReconcileError::Storage(format!("mutex poisoned: {:?}", e)))
    }

    pub fn identity(&self) -> &ClusterIdentity {
        &self.identity
    }

    /// Identificador de este poseedor del lock.
    pub fn holder(&self) -> Uuid {
        self.holder
    }

    /// Ruta del fichero de estado local de las operaciones escribibles.
    /// El lock serializa a quienes la usan.
    pub fn local_path(&self) -> PathBuf {
        self.paths.state_dir.join(format!("{}.db", self.identity.file_stem()))
    }

    /// Copia privada de una descarga de sólo lectura. Lleva el `holder`
    /// para no pisar el fichero que una operación con lock tiene abierto.
    pub fn read_only_path(&self) -> PathBuf {
        self.paths
            .state_dir
            .join(format!("{}.{}.ro.db", self.identity.file_stem(), self.holder))
    }

    /// `true` si este guard tiene el lock.
    pub fn holds_lock(&self) -> Result<bool> {
        Ok(self.lock_state()?.lock.is_some())
    }

    /// `true` si el estado local se descargó escribible y sigue pendiente
    /// de subir (no se purgó).
    pub fn needs_upload(&self) -> Result<bool> {
        Ok(self.lock_state()?.phase == LocalPhase::Downloaded(Access::Writable))
    }

    /// Intenta tomar el lock remoto. No espera ni reintenta.
    pub async fn acquire_lock(&self, operation: &str) -> Result<LockInfo> {
        let existing = self.lock_state()?.lock.clone();
        if let Some(info) = existing {
            return Err(ReconcileError::AlreadyLocked { identity: self.identity.to_string(),
                                                       holder: info.holder.to_string(),
                                                       operation: info.operation,
                                                       since: info.acquired_at.to_rfc3339() });
        }
        let info = LockInfo { holder: self.holder,
                              operation: operation.to_string(),
                              acquired_at: Utc::now() };
        let body = serde_json::to_vec(&info)?;
        let key = self.identity.lock_key();
        if !self.remote.put_if_absent(&key, &body).await? {
            let current = self.read_lock().await?;
            let (holder, operation, since) = match current {
                Some(other) => (other.holder.to_string(), other.operation, other.acquired_at.to_rfc3339()),
                None => ("<desconocido>".to_string(), "<desconocida>".to_string(), "<desconocido>".to_string()),
            };
            return Err(ReconcileError::AlreadyLocked { identity: self.identity.to_string(),
                                                       holder,
                                                       operation,
                                                       since });
        }
        log::info!("{} lock acquired by {} for {}", self.identity, self.holder, operation);
        self.lock_state()?.lock = Some(info.clone());
        Ok(info)
    }

    async fn read_lock(&self) -> Result<Option<LockInfo>> {
        match self.remote.get_object(&self.identity.lock_key()).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map(Some)
                                                         .map_err(|e| ReconcileError::Corrupt(format!("lock {}: {}", self.identity, e))),
            None => Ok(None),
        }
    }

    /// Libera el lock. Idempotente: sin lock remoto no hace nada. Si el
    /// lock remoto es de otro poseedor devuelve `LockNotHeld` y no lo toca.
    pub async fn release_lock(&self) -> Result<()> {
        match self.read_lock().await? {
            None => {
                log::debug!("{} release_lock: no lock present", self.identity);
            }
            Some(info) if info.holder != self.holder => {
                return Err(ReconcileError::LockNotHeld { identity: self.identity.to_string(),
                                                         holder: info.holder.to_string() });
            }
            Some(_) => {
                self.remote.delete_object(&self.identity.lock_key()).await?;
                log::info!("{} lock released by {}", self.identity, self.holder);
            }
        }
        self.lock_state()?.lock = None;
        Ok(())
    }

    /// Descarga el estado remoto. Escribible va a `local_path()`; sólo
    /// lectura va a `read_only_path()`. Si no existe en remoto deja un
    /// fichero vacío (primera ejecución). `writable` decide si `upload`
    /// estará permitido.
    pub async fn download(&self, writable: bool) -> Result<PathBuf> {
        let path = if writable { self.local_path() } else { self.read_only_path() };
        tokio::fs::create_dir_all(&self.paths.state_dir).await?;
        let body = match self.remote.get_object(&self.identity.state_key()).await? {
            Some(bytes) => {
                self.verify_digest(&bytes).await?;
                log::info!("{} downloaded state ({} bytes)", self.identity, bytes.len());
                bytes
            }
            None => {
                log::info!("{} has no remote state, starting empty", self.identity);
                Vec::new()
            }
        };
        tokio::fs::write(&path, &body).await?;
        self.lock_state()?.phase = LocalPhase::Downloaded(Access::from_writable(writable));
        Ok(path)
    }

    async fn verify_digest(&self, bytes: &[u8]) -> Result<()> {
        if let Some(expected) = self.remote.get_object(&self.identity.digest_key()).await? {
            let expected = String::from_utf8_lossy(&expected).trim().to_string();
            let actual = blake3::hash(bytes).to_hex().to_string();
            if expected != actual {
                return Err(ReconcileError::Corrupt(format!("digest de {} no coincide (esperado {}, obtenido {})",
                                                           self.identity.state_key(),
                                                           expected,
                                                           actual)));
            }
        }
        Ok(())
    }

    /// Borra la copia de sólo lectura, si la hay. No toca `local_path()`.
    pub async fn discard_read_only(&self) -> Result<()> {
        match tokio::fs::remove_file(self.read_only_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Sube el estado local. `Immutable` si se descargó en sólo lectura,
    /// `NotFound` si no hay estado local.
    pub async fn upload(&self) -> Result<()> {
        let phase = self.lock_state()?.phase;
        match phase {
            LocalPhase::Downloaded(Access::Writable) => {}
            LocalPhase::Downloaded(Access::ReadOnly) => {
                return Err(ReconcileError::Immutable(format!("{} se descargó en modo sólo lectura", self.identity)));
            }
            LocalPhase::NotDownloaded | LocalPhase::Purged => {
                return Err(ReconcileError::NotFound(format!("no hay estado local para {}", self.identity)));
            }
        }
        let path = self.local_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReconcileError::NotFound(format!("{}", path.display())));
            }
            Err(e) => return Err(e.into()),
        };
        let digest = blake3::hash(&bytes).to_hex().to_string();
        self.remote.put_object(&self.identity.state_key(), &bytes).await?;
        self.remote.put_object(&self.identity.digest_key(), digest.as_bytes()).await?;
        log::info!("{} uploaded state ({} bytes, blake3 {})", self.identity, bytes.len(), digest);
        Ok(())
    }

    /// Copia el estado local a `backup_dir` con marca de tiempo. Devuelve la
    /// ruta del backup.
    pub async fn backup(&self) -> Result<PathBuf> {
        let source = self.local_path();
        if !tokio::fs::try_exists(&source).await? {
            return Err(ReconcileError::NotFound(format!("no hay estado local que respaldar en {}", source.display())));
        }
        tokio::fs::create_dir_all(&self.paths.backup_dir).await?;
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let target = self.paths
                         .backup_dir
                         .join(format!("{}-{}.db", self.identity.file_stem(), stamp));
        copy_synced(&source, &target).await?;
        log::info!("{} state backed up to {}", self.identity, target.display());
        Ok(target)
    }

    /// Borra el estado remoto. Siempre hace antes un backup local; si el
    /// backup falla, la purga no ocurre.
    pub async fn purge(&self) -> Result<PathBuf> {
        let backup = self.backup().await?;
        self.remote.delete_object(&self.identity.state_key()).await?;
        self.remote.delete_object(&self.identity.digest_key()).await?;
        self.lock_state()?.phase = LocalPhase::Purged;
        log::info!("{} remote state purged", self.identity);
        Ok(backup)
    }
}

async fn copy_synced(source: &Path, target: &Path) -> Result<()> {
    tokio::fs::copy(source, target).await?;
    let file = tokio::fs::File::open(target).await?;
    file.sync_all().await?;
    Ok(())
}
