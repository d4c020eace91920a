// application.rs
use crate::validation::{check_account_id, check_database_name, check_dns_label, check_name, check_region};
use crate::{DomainError, Validate};
use reconcile::{ClusterIdentity, Declaration, ReconcileError};
use serde::{Deserialize, Serialize};

pub const MAX_REPLICAS: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicationMetadata {
  pub name: String,
  #[serde(default = "default_namespace")]
  pub namespace: String,
}

fn default_namespace() -> String {
  "default".to_string()
}

/// Cluster destino. Debe existir (aplicado antes) para poder desplegar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterRef {
  pub name: String,
  pub region: String,
  pub account_id: String,
}

/// Declaración de una aplicación desplegada sobre un cluster existente.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicationDeclaration {
  pub metadata: ApplicationMetadata,
  pub cluster: ClusterRef,
  pub image: String,
  pub port: u16,
  #[serde(default = "default_replicas")]
  pub replicas: u32,
  /// Se publica como `{subdomain}.{root_domain}` del cluster.
  #[serde(default)]
  pub subdomain: Option<String>,
  /// Base de datos del cluster a la que se conecta.
  #[serde(default)]
  pub postgres: Option<String>,
}

fn default_replicas() -> u32 {
  1
}

impl ApplicationDeclaration {
  /// Clave de los registros de la aplicación: `namespace/name`.
  pub fn key(&self) -> String {
    format!("{}/{}", self.metadata.namespace, self.metadata.name)
  }
}

impl Validate for ApplicationDeclaration {
  fn check(&self) -> Result<(), DomainError> {
    check_name("metadata.name", &self.metadata.name)?;
    check_name("metadata.namespace", &self.metadata.namespace)?;
    check_name("cluster.name", &self.cluster.name)?;
    check_region(&self.cluster.region)?;
    check_account_id(&self.cluster.account_id)?;
    if self.image.trim().is_empty() || self.image.chars().any(char::is_whitespace) {
      return Err(DomainError::ValidationError("image no puede estar vacía ni contener espacios".to_string()));
    }
    if self.port == 0 {
      return Err(DomainError::ValidationError("port debe estar entre 1 y 65535".to_string()));
    }
    if self.replicas == 0 || self.replicas > MAX_REPLICAS {
      return Err(DomainError::ValidationError(format!("replicas debe estar entre 1 y {}", MAX_REPLICAS)));
    }
    if let Some(sub) = &self.subdomain {
      check_dns_label("subdomain", sub)?;
    }
    if let Some(db) = &self.postgres {
      check_database_name(db)?;
    }
    Ok(())
  }
}

impl Declaration for ApplicationDeclaration {
  fn identity(&self) -> ClusterIdentity {
    ClusterIdentity::new(&self.cluster.region, &self.cluster.account_id, &self.cluster.name)
  }

  fn validate(&self) -> reconcile::Result<()> {
    self.check().map_err(ReconcileError::from)
  }

  /// Una aplicación vive dentro del estado de su cluster; borrarla no
  /// borra ese estado.
  fn owns_state(&self) -> bool {
    false
  }
}
