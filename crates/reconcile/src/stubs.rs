// Archivo: stubs.rs
// Propósito: implementaciones en memoria para pruebas y wiring rápido.
//
// Incluye un almacén de estado en memoria que se serializa como JSON al
// fichero descargado (`InMemoryStateStore`) y un almacenamiento remoto en
// memoria (`InMemoryRemoteStorage`). No son durables entre procesos.
use crate::domain::ResourceRecord;
use crate::errors::{ReconcileError, Result};
use crate::repository::{RemoteStorage, StateStore, StoreOpener};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

type RecordMap = BTreeMap<String, BTreeMap<String, ResourceRecord>>;

/// Almacén en memoria: un mapa `kind -> key -> registro`.
///
/// Si se abrió sobre un fichero, `flush` lo reescribe entero como JSON.
pub struct InMemoryStateStore {
    records: Mutex<RecordMap>,
    writable: bool,
    backing: Option<PathBuf>,
}

impl InMemoryStateStore {
    /// Almacén vacío, escribible y sin fichero.
    pub fn new() -> Self {
        Self { records: Mutex::new(BTreeMap::new()),
               writable: true,
               backing: None }
    }

    /// Almacén de sólo lectura a partir de otro (útil en pruebas).
    pub fn read_only(records: RecordMap) -> Self {
        Self { records: Mutex::new(records),
               writable: false,
               backing: None }
    }

    /// Carga desde bytes JSON. Vacío equivale a un almacén nuevo.
    pub fn from_bytes(bytes: &[u8]) -> Result<RecordMap> {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(BTreeMap::new());
        }
        serde_json::from_slice(bytes).map_err(|e| ReconcileError::Corrupt(format!("estado JSON ilegible: {}", e)))
    }

    /// Serializa el contenido completo.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let records = self.lock()?;
        Ok(serde_json::to_vec_pretty(&*records)?)
    }

    /// Número total de registros (todas las clases).
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.values().map(|m| m.len()).sum())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Helper para mapear `Mutex::lock()` en un `Result` con
    /// `ReconcileError::Storage`.
    fn lock(&self) -> Result<MutexGuard<'_, RecordMap>> {
        self.records
            .lock()
            .map_err(|e| ReconcileError::Storage(format!("mutex poisoned: {:?}", e)))
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(ReconcileError::Immutable("almacén abierto en modo sólo lectura".into()))
        }
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for InMemoryStateStore {
    fn get(&self, kind: &str, key: &str) -> Result<Option<ResourceRecord>> {
        Ok(self.lock()?.get(kind).and_then(|m| m.get(key)).cloned())
    }

    fn save(&self, kind: &str, record: ResourceRecord) -> Result<()> {
        self.ensure_writable()?;
        self.lock()?
            .entry(kind.to_string())
            .or_default()
            .insert(record.key.clone(), record);
        Ok(())
    }

    fn remove(&self, kind: &str, key: &str) -> Result<()> {
        self.ensure_writable()?;
        let mut records = self.lock()?;
        if let Some(m) = records.get_mut(kind) {
            m.remove(key);
            if m.is_empty() {
                records.remove(kind);
            }
        }
        Ok(())
    }

    fn enumerate(&self, kind: &str) -> Result<Vec<ResourceRecord>> {
        Ok(self.lock()?
               .get(kind)
               .map(|m| m.values().cloned().collect())
               .unwrap_or_default())
    }

    fn flush(&self) -> Result<()> {
        if let (true, Some(path)) = (self.writable, self.backing.as_ref()) {
            std::fs::write(path, self.to_bytes()?)?;
        }
        Ok(())
    }
}

/// Abre `InMemoryStateStore` sobre el fichero descargado.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStoreOpener;

impl StoreOpener for InMemoryStoreOpener {
    type Store = InMemoryStateStore;

    fn open(&self, path: &Path, writable: bool) -> Result<Self::Store> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let records = InMemoryStateStore::from_bytes(&bytes)?;
        Ok(InMemoryStateStore { records: Mutex::new(records),
                                writable,
                                backing: Some(path.to_path_buf()) })
    }
}

/// Almacenamiento remoto en memoria (un "bucket" de claves a bytes).
#[derive(Debug, Default)]
pub struct InMemoryRemoteStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    puts: AtomicUsize,
}

impl InMemoryRemoteStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.objects
            .lock()
            .map_err(|e| ReconcileError::Storage(format!("mutex poisoned: {:?}", e)))
    }

    /// Copia del objeto, si existe (para inspección en pruebas).
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned()
    }

    /// Inserta un objeto directamente, sin pasar por el guard.
    pub fn insert(&self, key: &str, body: Vec<u8>) {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), body);
    }

    /// Número de escrituras realizadas (`put_object` + `put_if_absent`
    /// exitosos).
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStorage for InMemoryRemoteStorage {
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn put_object(&self, key: &str, body: &[u8]) -> Result<()> {
        self.lock()?.insert(key.to_string(), body.to_vec());
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, body: &[u8]) -> Result<bool> {
        let mut objects = self.lock()?;
        if objects.contains_key(key) {
            return Ok(false);
        }
        objects.insert(key.to_string(), body.to_vec());
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}
