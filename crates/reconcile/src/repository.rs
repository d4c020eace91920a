// Archivo: repository.rs
// Propósito: definir los contratos de persistencia: el almacén local de
// registros (`StateStore`), cómo se abre sobre un fichero descargado
// (`StoreOpener`) y el almacenamiento remoto compartido (`RemoteStorage`).
use crate::domain::ResourceRecord;
use crate::errors::Result;
use async_trait::async_trait;
use std::path::Path;

/// Almacén local del estado real de los recursos de un cluster.
///
/// Cada registro se indexa por `(kind, key)`. El almacén se carga desde un
/// único fichero por cluster y no accede a la red. La ausencia de un
/// registro no es un error: `get` devuelve `Ok(None)`.
pub trait StateStore: Send + Sync {
    /// Obtiene un registro; `None` si no existe.
    fn get(&self, kind: &str, key: &str) -> Result<Option<ResourceRecord>>;

    /// Inserta o reemplaza un registro.
    fn save(&self, kind: &str, record: ResourceRecord) -> Result<()>;

    /// Elimina un registro. Eliminar uno inexistente no es un error.
    fn remove(&self, kind: &str, key: &str) -> Result<()>;

    /// Lista los registros de un tipo ordenados por `key`.
    fn enumerate(&self, kind: &str) -> Result<Vec<ResourceRecord>>;

    /// Vuelca al fichero lo pendiente antes de una subida.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Abre un `StateStore` sobre el fichero que dejó la descarga.
///
/// Sólo existe un almacén después de `open`, así que usarlo sin haberlo
/// descargado no es representable.
pub trait StoreOpener: Send + Sync {
    type Store: StateStore + 'static;

    /// `writable == false` produce un almacén que rechaza escrituras con
    /// `ReconcileError::Immutable`. Un fichero ilegible es `Corrupt`.
    fn open(&self, path: &Path, writable: bool) -> Result<Self::Store>;
}

/// Almacenamiento remoto de objetos (S3, GCS, un directorio compartido).
///
/// El lock es cooperativo: se implementa con `put_if_absent`, que debe ser
/// atómico en el backend concreto.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Descarga un objeto; `None` si no existe.
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Sube (o reemplaza) un objeto.
    async fn put_object(&self, key: &str, body: &[u8]) -> Result<()>;

    /// Crea el objeto sólo si no existe. Devuelve `false` si ya existía.
    async fn put_if_absent(&self, key: &str, body: &[u8]) -> Result<bool>;

    /// Borra un objeto. Borrar uno inexistente no es un error.
    async fn delete_object(&self, key: &str) -> Result<()>;
}
