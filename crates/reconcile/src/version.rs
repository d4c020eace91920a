// Archivo: version.rs
// Propósito: compatibilidad entre la versión del binario y la del cluster,
// y ejecución ordenada de migraciones pendientes.
//
// Las versiones se guardan en el mismo `StateStore` que los recursos, bajo
// los tipos `cluster_version`, `original_cluster_version` y `migration`.
use crate::domain::{ClusterIdentity, ResourceRecord};
use crate::errors::{ReconcileError, Result};
use crate::repository::StateStore;
use async_trait::async_trait;
use chrono::Utc;
use semver::Version;
use serde::{Deserialize, Serialize};

pub const CLUSTER_VERSION_KIND: &str = "cluster_version";
pub const ORIGINAL_VERSION_KIND: &str = "original_cluster_version";
pub const MIGRATION_KIND: &str = "migration";

/// Atributos de los registros de versión.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub cluster: ClusterIdentity,
    pub version: Version,
}

/// Atributos del registro de una migración aplicada.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub version: Version,
    pub name: String,
    pub applied_at: chrono::DateTime<Utc>,
}

/// Estado del ciclo de versiones de un cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionState {
    Unset,
    OriginalRecorded { original: Version },
    CurrentTracked { original: Version, current: Version },
}

/// Fuente de la versión original registrada del lado del proveedor (por
/// ejemplo tags en la infraestructura creada por binarios antiguos).
#[async_trait]
pub trait OriginalVersionSource: Send + Sync {
    async fn original_version_tag(&self, identity: &ClusterIdentity) -> Result<Option<Version>>;
}

/// Fuente sin tags: la versión original será siempre la del binario.
pub struct NoVersionTags;

#[async_trait]
impl OriginalVersionSource for NoVersionTags {
    async fn original_version_tag(&self, _identity: &ClusterIdentity) -> Result<Option<Version>> {
        Ok(None)
    }
}

/// Guardián de compatibilidad de versiones para un cluster.
pub struct VersionGate<'a> {
    store: &'a dyn StateStore,
    identity: &'a ClusterIdentity,
    binary: &'a Version,
}

impl<'a> VersionGate<'a> {
    pub fn new(store: &'a dyn StateStore, identity: &'a ClusterIdentity, binary: &'a Version) -> Self {
        Self { store, identity, binary }
    }

    fn read(&self, kind: &str) -> Result<Option<Version>> {
        match self.store.get(kind, &self.identity.state_key())? {
            Some(record) => {
                let rec: VersionRecord = record.decode()?;
                Ok(Some(rec.version))
            }
            None => Ok(None),
        }
    }

    fn write(&self, kind: &str, version: &Version) -> Result<()> {
        let rec = VersionRecord { cluster: self.identity.clone(),
                                  version: version.clone() };
        self.store
            .save(kind, ResourceRecord::new(self.identity.state_key(), serde_json::to_value(rec)?))
    }

    /// Versión del último binario que mutó el cluster con éxito.
    pub fn cluster_version(&self) -> Result<Option<Version>> {
        self.read(CLUSTER_VERSION_KIND)
    }

    /// Versión con la que se creó el cluster.
    pub fn original_version(&self) -> Result<Option<Version>> {
        self.read(ORIGINAL_VERSION_KIND)
    }

    pub fn state(&self) -> Result<VersionState> {
        Ok(match (self.original_version()?, self.cluster_version()?) {
            (Some(original), Some(current)) => VersionState::CurrentTracked { original, current },
            (Some(original), None) => VersionState::OriginalRecorded { original },
            // Estados escritos antes de registrar la original: la actual es
            // la mejor cota inferior.
            (None, Some(current)) => VersionState::OriginalRecorded { original: current },
            (None, None) => VersionState::Unset,
        })
    }

    /// Antes de un `apply`: el binario debe coincidir con el cluster.
    /// Un cluster sin versión registrada (nuevo) pasa.
    pub fn validate_binary_equals_cluster(&self) -> Result<()> {
        match self.cluster_version()? {
            Some(cluster) if cluster != *self.binary => {
                Err(ReconcileError::VersionMismatch { binary: self.binary.clone(),
                                                      cluster })
            }
            _ => Ok(()),
        }
    }

    /// Antes de operaciones de sólo lectura: el binario no puede ser más
    /// antiguo que el cluster.
    pub fn validate_binary_not_less_than_cluster(&self) -> Result<()> {
        match self.cluster_version()? {
            Some(cluster) if *self.binary < cluster => {
                Err(ReconcileError::BinaryTooOld { binary: self.binary.clone(),
                                                   cluster })
            }
            _ => Ok(()),
        }
    }

    /// Registra la versión del cluster. Idempotente si ya es igual; nunca
    /// retrocede (`VersionRegression`, sin tocar lo almacenado). Devuelve
    /// `true` si cambió algo.
    pub fn save_cluster_version(&self, version: &Version) -> Result<bool> {
        match self.cluster_version()? {
            Some(stored) if stored == *version => Ok(false),
            Some(stored) if stored > *version => {
                Err(ReconcileError::VersionRegression { stored,
                                                        attempted: version.clone() })
            }
            _ => {
                self.write(CLUSTER_VERSION_KIND, version)?;
                log::info!("{} cluster version is now {}", self.identity, version);
                Ok(true)
            }
        }
    }

    /// Registra la versión original si aún no existe. Devuelve `false` si
    /// ya estaba registrada (nunca se sobrescribe).
    pub fn save_original_version(&self, version: &Version) -> Result<bool> {
        if self.original_version()?.is_some() {
            return Ok(false);
        }
        self.write(ORIGINAL_VERSION_KIND, version)?;
        log::info!("{} original cluster version recorded as {}", self.identity, version);
        Ok(true)
    }

    /// Versión original sin escribir nada: la registrada, o la de los tags
    /// del proveedor, o la del binario en curso.
    pub async fn resolve_original_version(&self, source: &dyn OriginalVersionSource) -> Result<Version> {
        if let Some(original) = self.original_version()? {
            return Ok(original);
        }
        if let Some(current) = self.cluster_version()? {
            return Ok(current);
        }
        Ok(match source.original_version_tag(self.identity).await? {
            Some(tagged) => tagged,
            None => self.binary.clone(),
        })
    }

    /// Como `resolve_original_version`, pero además la registra si no
    /// existía.
    pub async fn ensure_original_version(&self, source: &dyn OriginalVersionSource) -> Result<Version> {
        let original = self.resolve_original_version(source).await?;
        self.save_original_version(&original)?;
        Ok(original)
    }
}

/// Un paso de migración del estado de un cluster.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Versión del binario que introduce el cambio de formato.
    fn version(&self) -> Version;

    fn name(&self) -> &str;

    async fn migrate(&self, store: &dyn StateStore, identity: &ClusterIdentity) -> Result<()>;
}

/// Ejecuta migraciones en orden de versión, cada una una sola vez por
/// cluster.
pub struct MigrationRunner {
    migrations: Vec<Box<dyn Migration>>,
}

impl MigrationRunner {
    pub fn new(mut migrations: Vec<Box<dyn Migration>>) -> Self {
        migrations.sort_by_key(|m| m.version());
        Self { migrations }
    }

    pub fn empty() -> Self {
        Self { migrations: Vec::new() }
    }

    fn record_key(migration: &dyn Migration) -> String {
        format!("{}:{}", migration.version(), migration.name())
    }

    /// Migraciones con versión en `(original, binary]` aún no aplicadas.
    pub fn pending(&self, store: &dyn StateStore, original: &Version, binary: &Version) -> Result<Vec<&dyn Migration>> {
        let mut out = Vec::new();
        for m in self.migrations.iter() {
            let v = m.version();
            if v <= *original || v > *binary {
                continue;
            }
            if store.get(MIGRATION_KIND, &Self::record_key(m.as_ref()))?.is_none() {
                out.push(m.as_ref());
            }
        }
        Ok(out)
    }

    /// Aplica las pendientes en orden. La primera que falla aborta el
    /// resto. Devuelve las versiones aplicadas.
    pub async fn run(&self,
                     store: &dyn StateStore,
                     identity: &ClusterIdentity,
                     original: &Version,
                     binary: &Version)
                     -> Result<Vec<Version>> {
        let pending = self.pending(store, original, binary)?;
        let mut applied = Vec::new();
        for m in pending {
            let version = m.version();
            log::info!("{} running migration {} ({})", identity, version, m.name());
            m.migrate(store, identity).await.map_err(|e| ReconcileError::Migration { version: version.clone(),
                                                                                      name: m.name().to_string(),
                                                                                      message: e.to_string() })?;
            let rec = MigrationRecord { version: version.clone(),
                                        name: m.name().to_string(),
                                        applied_at: Utc::now() };
            store.save(MIGRATION_KIND, ResourceRecord::new(Self::record_key(m), serde_json::to_value(rec)?))?;
            applied.push(version);
        }
        Ok(applied)
    }
}
