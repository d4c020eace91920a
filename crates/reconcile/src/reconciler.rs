// Archivo: reconciler.rs
// Propósito: contrato uniforme de los reconciliadores y el acceso acotado
// (`StateHandle`) que cada uno recibe al almacén de estado.
use crate::domain::{ReconcileMeta, ReconcileResult, ResourceRecord};
use crate::errors::{ReconcileError, Result};
use crate::repository::StateStore;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Un tipo de recurso gestionado.
///
/// `reconcile` compara el estado deseado (`meta.declaration`) con el real
/// (registros del `StateHandle`) y actúa. Debe ser idempotente: sin cambios
/// externos, invocarlo de nuevo converge en `ReconcileResult::done()` sin
/// repetir efectos. `requeue()` significa "todavía no, vuelve a intentar";
/// un `Err` es fatal y aborta el scheduler.
///
/// En modo purga (`meta.purge`) el reconciliador borra en lugar de crear, y
/// un recurso ya ausente se reporta como `done()`.
#[async_trait]
pub trait Reconciler<D>: Send + Sync
    where D: Send + Sync
{
    /// Nombre del reconciliador, usado en logs y errores.
    fn name(&self) -> &str;

    /// Tipos de registro que este reconciliador crea y borra.
    fn owns(&self) -> &[&'static str];

    /// Tipos de registro de otros reconciliadores que sólo lee.
    fn reads(&self) -> &[&'static str] {
        &[]
    }

    async fn reconcile(&self, meta: &ReconcileMeta<'_, D>, state: &StateHandle<'_>) -> Result<ReconcileResult>;
}

/// Acceso acotado al `StateStore` para un reconciliador.
///
/// Permite leer y escribir los tipos propios (`owns`) y sólo leer los de
/// sus dependencias (`reads`). Cualquier otro acceso devuelve
/// `ReconcileError::AccessDenied`.
pub struct StateHandle<'a> {
    store: &'a dyn StateStore,
    owner: &'a str,
    owns: &'a [&'static str],
    reads: &'a [&'static str],
}

impl<'a> StateHandle<'a> {
    pub fn new(store: &'a dyn StateStore, owner: &'a str, owns: &'a [&'static str], reads: &'a [&'static str]) -> Self {
        Self { store,
               owner,
               owns,
               reads }
    }

    fn check_read(&self, kind: &str) -> Result<()> {
        if self.owns.iter().chain(self.reads).any(|k| *k == kind) {
            Ok(())
        } else {
            Err(self.denied(kind, "lectura"))
        }
    }

    fn check_write(&self, kind: &str) -> Result<()> {
        if self.owns.iter().any(|k| *k == kind) {
            Ok(())
        } else {
            Err(self.denied(kind, "escritura"))
        }
    }

    fn denied(&self, kind: &str, access: &'static str) -> ReconcileError {
        ReconcileError::AccessDenied { reconciler: self.owner.to_string(),
                                       kind: kind.to_string(),
                                       access }
    }

    pub fn get(&self, kind: &str, key: &str) -> Result<Option<ResourceRecord>> {
        self.check_read(kind)?;
        self.store.get(kind, key)
    }

    /// Lee un registro y deserializa sus atributos en `T`. Retorna
    /// `Ok(None)` si no existe.
    pub fn get_typed<T: DeserializeOwned>(&self, kind: &str, key: &str) -> Result<Option<T>> {
        match self.get(kind, key)? {
            Some(record) => Ok(Some(record.decode()?)),
            None => Ok(None),
        }
    }

    /// Como `get_typed`, pero la ausencia es `NotFound`. Útil para
    /// dependencias que otro reconciliador ya debió crear.
    pub fn require<T: DeserializeOwned>(&self, kind: &str, key: &str) -> Result<T> {
        self.get_typed(kind, key)?
            .ok_or_else(|| ReconcileError::NotFound(format!("{}/{}", kind, key)))
    }

    pub fn save(&self, kind: &str, record: ResourceRecord) -> Result<()> {
        self.check_write(kind)?;
        self.store.save(kind, record)
    }

    /// Serializa `value` como atributos y guarda el registro.
    pub fn save_typed<T: Serialize>(&self, kind: &str, key: &str, value: &T) -> Result<()> {
        let attributes = serde_json::to_value(value)?;
        self.save(kind, ResourceRecord::new(key, attributes))
    }

    pub fn remove(&self, kind: &str, key: &str) -> Result<()> {
        self.check_write(kind)?;
        self.store.remove(kind, key)
    }

    pub fn enumerate(&self, kind: &str) -> Result<Vec<ResourceRecord>> {
        self.check_read(kind)?;
        self.store.enumerate(kind)
    }
}
