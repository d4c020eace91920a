// cluster.rs
use crate::validation::{check_account_id, check_cidr, check_database_name, check_domain, check_name, check_region};
use crate::{DomainError, Validate};
use reconcile::{ClusterIdentity, Declaration, ReconcileError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Entorno lógico del cluster. Sólo afecta a etiquetas y tamaños por
/// defecto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
  Development,
  Staging,
  Production,
}

impl fmt::Display for Environment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Environment::Development => "development",
      Environment::Staging => "staging",
      Environment::Production => "production",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterMetadata {
  pub name: String,
  pub region: String,
  pub account_id: String,
  #[serde(default = "default_environment")]
  pub environment: Environment,
}

fn default_environment() -> Environment {
  Environment::Development
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VpcSpec {
  pub cidr: String,
  /// Una NAT por zona en lugar de una compartida.
  #[serde(default)]
  pub high_availability: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DnsSpec {
  pub root_domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSpec {
  pub name: String,
  #[serde(default = "default_instance_class")]
  pub instance_class: String,
  #[serde(default = "default_storage_gb")]
  pub storage_gb: u32,
}

fn default_instance_class() -> String {
  "db.t3.micro".to_string()
}

fn default_storage_gb() -> u32 {
  20
}

/// Declaración de un cluster: red, DNS, cluster Kubernetes y bases de
/// datos Postgres gestionadas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterDeclaration {
  pub metadata: ClusterMetadata,
  pub vpc: VpcSpec,
  pub dns: DnsSpec,
  #[serde(default)]
  pub databases: Vec<DatabaseSpec>,
}

impl ClusterDeclaration {
  pub fn database(&self, name: &str) -> Option<&DatabaseSpec> {
    self.databases.iter().find(|d| d.name == name)
  }
}

impl Validate for ClusterDeclaration {
  fn check(&self) -> Result<(), DomainError> {
    check_name("metadata.name", &self.metadata.name)?;
    check_region(&self.metadata.region)?;
    check_account_id(&self.metadata.account_id)?;
    check_cidr(&self.vpc.cidr)?;
    check_domain(&self.dns.root_domain)?;

    let mut seen = HashSet::new();
    for db in &self.databases {
      check_database_name(&db.name)?;
      if !seen.insert(db.name.as_str()) {
        return Err(DomainError::ValidationError(format!("base de datos '{}' declarada dos veces", db.name)));
      }
      if !(20..=1000).contains(&db.storage_gb) {
        return Err(DomainError::ValidationError(format!("storage_gb de '{}' debe estar entre 20 y 1000",
                                                        db.name)));
      }
    }
    Ok(())
  }
}

impl Declaration for ClusterDeclaration {
  fn identity(&self) -> ClusterIdentity {
    ClusterIdentity::new(&self.metadata.region, &self.metadata.account_id, &self.metadata.name)
  }

  fn validate(&self) -> reconcile::Result<()> {
    self.check().map_err(ReconcileError::from)
  }
}
