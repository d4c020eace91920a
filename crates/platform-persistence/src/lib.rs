//! Persistencia del estado de los clusters.
//! Expone el almacén Diesel/SQLite de un solo fichero (`DieselStateStore`),
//! su opener para el guard, y un almacenamiento remoto sobre el sistema de
//! ficheros (`FsRemoteStorage`). La implementación detallada está en
//! `state_persistence.rs` y `remote_fs.rs`.

mod remote_fs;
pub mod schema;
mod state_persistence;

pub use remote_fs::{remote_from_env, FsRemoteStorage, DEFAULT_REMOTE_DIR};
pub use state_persistence::{DieselStateStore, SqliteStoreOpener, MIGRATIONS};
