// Archivo: provider/mod.rs
// Propósito: contrato con el proveedor de nube. Los reconciliadores sólo
// hablan con la infraestructura a través de `CloudProvider`.
mod simulated;

pub use simulated::SimulatedCloud;

use crate::WorkflowError;
use async_trait::async_trait;
use platform_domain::DatabaseSpec;
use reconcile::ClusterIdentity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcInfo {
  pub vpc_id: String,
  pub network_block: String,
  pub nat_gateways: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneInfo {
  pub zone_id: String,
  pub name: String,
  pub name_servers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
  Creating,
  Active,
  Deleting,
  /// El proveedor ya no conoce el cluster.
  Gone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
  pub cluster_id: String,
  pub status: ClusterStatus,
  pub endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
  pub database_id: String,
  pub endpoint: String,
}

/// Despliegue de una aplicación tal como se envía al cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
  pub namespace: String,
  pub name: String,
  pub image: String,
  pub port: u16,
  pub replicas: u32,
  pub host: Option<String>,
  pub database_endpoint: Option<String>,
}

/// Operaciones de infraestructura que necesitan los reconciliadores.
///
/// Los borrados de recursos inexistentes deben ser `Ok(())`; la purga
/// depende de ello para ser idempotente.
#[async_trait]
pub trait CloudProvider: Send + Sync {
  async fn create_vpc(&self, identity: &ClusterIdentity, network_block: &str, high_availability: bool)
                      -> Result<VpcInfo, WorkflowError>;
  async fn delete_vpc(&self, vpc_id: &str) -> Result<(), WorkflowError>;

  async fn create_hosted_zone(&self, name: &str) -> Result<ZoneInfo, WorkflowError>;
  async fn delete_hosted_zone(&self, zone_id: &str) -> Result<(), WorkflowError>;

  /// Publica los NS de `zone` en la zona padre `parent`.
  async fn delegate_zone(&self, parent: &str, zone: &ZoneInfo) -> Result<(), WorkflowError>;
  /// `true` cuando la delegación ya resuelve públicamente.
  async fn delegation_propagated(&self, zone_name: &str) -> Result<bool, WorkflowError>;
  async fn remove_delegation(&self, parent: &str, zone_name: &str) -> Result<(), WorkflowError>;

  async fn create_cluster(&self, identity: &ClusterIdentity, vpc_id: &str) -> Result<ClusterInfo, WorkflowError>;
  async fn describe_cluster(&self, cluster_id: &str) -> Result<ClusterInfo, WorkflowError>;
  async fn delete_cluster(&self, cluster_id: &str) -> Result<(), WorkflowError>;

  async fn create_database(&self, identity: &ClusterIdentity, vpc_id: &str, spec: &DatabaseSpec)
                           -> Result<DatabaseInfo, WorkflowError>;
  async fn delete_database(&self, database_id: &str) -> Result<(), WorkflowError>;

  async fn deploy(&self, cluster_id: &str, deployment: &Deployment) -> Result<(), WorkflowError>;
  async fn undeploy(&self, cluster_id: &str, namespace: &str, name: &str) -> Result<(), WorkflowError>;
}
