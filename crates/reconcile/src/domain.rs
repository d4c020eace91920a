// Archivo: domain.rs
// Propósito: tipos de dominio del motor: identidad del cluster, registros
// de recursos, resultado de reconciliación y metadatos del lock remoto.
use crate::errors::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// Identidad inmutable de un cluster: clave de partición para descargar,
/// subir, bloquear y purgar el estado remoto.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterIdentity {
    pub region: String,
    pub account_id: String,
    pub cluster_name: String,
}

impl ClusterIdentity {
    pub fn new(region: impl Into<String>, account_id: impl Into<String>, cluster_name: impl Into<String>) -> Self {
        Self { region: region.into(),
               account_id: account_id.into(),
               cluster_name: cluster_name.into() }
    }

    /// Prefijo común de todos los objetos remotos del cluster.
    pub fn prefix(&self) -> String {
        format!("{}/{}/{}", self.account_id, self.region, self.cluster_name)
    }

    /// Clave del objeto remoto con el estado serializado.
    pub fn state_key(&self) -> String {
        format!("{}/state.db", self.prefix())
    }

    /// Clave del digest blake3 que acompaña al estado.
    pub fn digest_key(&self) -> String {
        format!("{}/state.db.blake3", self.prefix())
    }

    /// Clave del lock; comparte partición con el estado.
    pub fn lock_key(&self) -> String {
        format!("{}/state.lock", self.prefix())
    }

    /// Nombre de fichero seguro para la copia local del estado.
    pub fn file_stem(&self) -> String {
        format!("{}-{}-{}", self.cluster_name, self.region, self.account_id)
    }
}

impl fmt::Display for ClusterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.cluster_name, self.account_id, self.region)
    }
}

/// Contrato mínimo del documento de estado deseado.
///
/// La declaración pertenece al caller y es de sólo lectura para el motor.
/// Debe validarse (estructura + semántica) antes de entregarse al
/// scheduler.
pub trait Declaration: Send + Sync {
    /// Identidad del cluster al que apunta la declaración.
    fn identity(&self) -> ClusterIdentity;

    /// Validación semántica; los errores se reportan como
    /// `ReconcileError::Validation`.
    fn validate(&self) -> Result<()>;

    /// `true` si la declaración es dueña de todo el estado del cluster: al
    /// purgarla se borra también el estado remoto. Las declaraciones que
    /// viven dentro de un cluster ajeno (aplicaciones) devuelven `false`.
    fn owns_state(&self) -> bool {
        true
    }
}

/// Registro persistido de un recurso gestionado.
///
/// Los atributos son propios de cada tipo de recurso; `key` basta para que
/// el reconciliador dueño lo empareje con la declaración.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub key: String,
    pub attributes: JsonValue,
    pub updated_at: DateTime<Utc>,
}

impl ResourceRecord {
    pub fn new(key: impl Into<String>, attributes: JsonValue) -> Self {
        Self { key: key.into(),
               attributes,
               updated_at: Utc::now() }
    }

    /// Deserializa los atributos en un tipo concreto.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.attributes.clone())?)
    }
}

/// Resultado de una invocación de `reconcile` dentro de una generación.
/// No se persiste. Los errores viajan por el `Err` del `Result`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    pub requeue: bool,
}

impl ReconcileResult {
    /// El recurso convergió.
    pub fn done() -> Self {
        Self { requeue: false }
    }

    /// Todavía no convergió; reintentar en la siguiente generación.
    pub fn requeue() -> Self {
        Self { requeue: true }
    }
}

/// Metadatos entregados a cada reconciliador.
pub struct ReconcileMeta<'a, D> {
    pub declaration: &'a D,
    pub identity: &'a ClusterIdentity,
    pub purge: bool,
}

/// Contenido del objeto de lock remoto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub holder: Uuid,
    pub operation: String,
    pub acquired_at: DateTime<Utc>,
}

/// Modo en que se descargó el estado local.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    Writable,
}

impl Access {
    pub fn from_writable(writable: bool) -> Self {
        if writable {
            Access::Writable
        } else {
            Access::ReadOnly
        }
    }

    pub fn is_writable(self) -> bool {
        matches!(self, Access::Writable)
    }
}
