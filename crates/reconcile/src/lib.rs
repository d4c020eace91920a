//! Crate `reconcile`: motor de reconciliación con estado remoto protegido
//!
//! Este crate define los tipos de dominio (`ClusterIdentity`,
//! `ResourceRecord`, `ReconcileResult`), el contrato del almacén de estado
//! (`StateStore`) y del almacenamiento remoto (`RemoteStorage`), el contrato
//! de los reconciliadores (`Reconciler`) y el `Scheduler` que los lleva a
//! converger. También expone el guard del estado remoto, el gate de
//! versiones con sus migraciones y el `PlatformService` que lo compone todo.
//!
//! Diseño resumido:
//! - Reconciliación por generaciones: la lista ordenada se recorre entera
//!   hasta que nadie pide `requeue`; un error aborta todo.
//! - Exclusión entre procesos: lock remoto no bloqueante por cluster.
//! - Teardown garantizado: subir y liberar en todas las salidas, también al
//!   recibir una señal (`scope::with_state`).
//!
//! Ejemplo rápido:
//! ```rust
//! use reconcile::stubs::{InMemoryRemoteStorage, InMemoryStoreOpener};
//! use reconcile::{PlatformService, SchedulerConfig, StatePaths};
//! use std::sync::Arc;
//! let remote = Arc::new(InMemoryRemoteStorage::new());
//! let paths = StatePaths::new("/tmp/kubeplat/state", "/tmp/kubeplat/backups");
//! let version = semver::Version::new(0, 1, 0);
//! let service = PlatformService::new(remote, InMemoryStoreOpener, paths, version, SchedulerConfig::default());
//! ```
pub mod domain;
pub mod engine;
pub mod errors;
pub mod guard;
pub mod reconciler;
pub mod repository;
pub mod scope;
pub mod service;
pub mod stubs;
pub mod version;

pub use domain::*;
pub use engine::*;
pub use errors::*;
pub use guard::*;
pub use reconciler::*;
pub use repository::*;
pub use scope::{shutdown_signal, with_state};
pub use service::*;
pub use version::*;
