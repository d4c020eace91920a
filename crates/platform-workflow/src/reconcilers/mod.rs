// Archivo: reconcilers/mod.rs
// Propósito: reconciliadores concretos y los registros que guardan en el
// estado del cluster.
mod application;
mod cluster;
mod hosted_zone;
mod nameserver_delegation;
mod postgres_databases;
mod vpc;

pub use application::ApplicationReconciler;
pub use cluster::ClusterReconciler;
pub use hosted_zone::HostedZoneReconciler;
pub use nameserver_delegation::NameserverDelegationReconciler;
pub use postgres_databases::PostgresDatabasesReconciler;
pub use vpc::VpcReconciler;

use crate::provider::ClusterStatus;
use serde::{Deserialize, Serialize};

pub const VPC_KIND: &str = "vpc";
pub const HOSTED_ZONE_KIND: &str = "hosted_zone";
pub const DELEGATION_KIND: &str = "nameserver_delegation";
pub const CLUSTER_KIND: &str = "cluster";
pub const DATABASE_KIND: &str = "postgres_database";
pub const APPLICATION_KIND: &str = "application";

/// Clave de los recursos únicos por cluster.
pub const MAIN_KEY: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcRecord {
  pub vpc_id: String,
  pub network_block: String,
  pub nat_gateways: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZoneRecord {
  pub zone_id: String,
  pub name: String,
  pub parent: String,
  pub name_servers: Vec<String>,
  /// `false` para zonas importadas que no se borran en la purga.
  pub managed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRecord {
  pub zone: String,
  pub parent: String,
  pub propagated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
  pub cluster_id: String,
  pub vpc_id: String,
  pub status: ClusterStatus,
  pub endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRecord {
  pub database_id: String,
  pub name: String,
  pub endpoint: String,
  pub instance_class: String,
  pub storage_gb: u32,
}
