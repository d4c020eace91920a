use async_trait::async_trait;
use reconcile::{ReconcileError, RemoteStorage, Result};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;
pub const DEFAULT_REMOTE_DIR: &str = ".kubeplat/remote";
/// Almacenamiento remoto sobre un directorio (montaje compartido, NFS,
/// bucket montado). Cada clave es una ruta relativa bajo `root`.
///
/// `put_object` escribe a un temporal y renombra, así un lector nunca ve
/// un objeto a medias. `put_if_absent` usa `create_new`, que es atómico en
/// un mismo sistema de ficheros.
#[derive(Debug, Clone)]
pub struct FsRemoteStorage {
  root: PathBuf,
}
impl FsRemoteStorage {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }
  pub fn root(&self) -> &Path {
    &self.root
  }
  fn object_path(&self, key: &str) -> Result<PathBuf> {
    let rel = Path::new(key);
    if key.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
      return Err(ReconcileError::Validation(format!("clave remota inválida: '{}'", key)));
    }
    Ok(self.root.join(rel))
  }
  async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
  }
}
#[async_trait]
impl RemoteStorage for FsRemoteStorage {
  async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
    let path = self.object_path(key)?;
    match tokio::fs::read(&path).await {
      Ok(bytes) => Ok(Some(bytes)),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e.into()),
    }
  }
  async fn put_object(&self, key: &str, body: &[u8]) -> Result<()> {
    let path = self.object_path(key)?;
    Self::ensure_parent(&path).await?;
    let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4()));
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(body).await?;
    file.sync_all().await?;
    drop(file);
    if let Err(e) = tokio::fs::rename(&tmp, &path).await {
      let _ = tokio::fs::remove_file(&tmp).await;
      return Err(e.into());
    }
    log::debug!("put {} ({} bytes)", key, body.len());
    Ok(())
  }
  async fn put_if_absent(&self, key: &str, body: &[u8]) -> Result<bool> {
    let path = self.object_path(key)?;
    Self::ensure_parent(&path).await?;
    let mut file = match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
      Ok(f) => f,
      Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
      Err(e) => return Err(e.into()),
    };
    file.write_all(body).await?;
    file.sync_all().await?;
    Ok(true)
  }
  async fn delete_object(&self, key: &str) -> Result<()> {
    let path = self.object_path(key)?;
    match tokio::fs::remove_file(&path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }
}
/// Construye el almacenamiento remoto a partir de `KUBEPLAT_REMOTE_DIR`
/// (cargando `.env` si existe). Sin la variable usa `DEFAULT_REMOTE_DIR`.
pub fn remote_from_env() -> FsRemoteStorage {
  dotenvy::dotenv().ok();
  let root = std::env::var("KUBEPLAT_REMOTE_DIR").unwrap_or_else(|_| DEFAULT_REMOTE_DIR.into());
  FsRemoteStorage::new(root)
}
