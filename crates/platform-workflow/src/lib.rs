//! platform-workflow: reconciliadores concretos de la plataforma
//!
//! Define el proveedor de nube (`CloudProvider`) contra el que trabajan los
//! reconciliadores de cluster y de aplicación, las migraciones del formato
//! de estado, la configuración por entorno y la fábrica que arma las listas
//! ordenadas que consume `reconcile::PlatformService`.

pub mod config;
pub mod errors;
pub mod factory;
pub mod migrations;
pub mod provider;
pub mod reconcilers;

pub use config::PlatformConfig;
pub use errors::WorkflowError;
pub use factory::PlatformFactory;
pub use provider::{CloudProvider, SimulatedCloud};
