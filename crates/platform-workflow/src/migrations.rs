// Archivo: migrations.rs
// Propósito: migraciones del formato de los registros guardados por los
// reconciliadores. Cada una reescribe registros en su sitio.
use crate::reconcilers::{HOSTED_ZONE_KIND, VPC_KIND};
use async_trait::async_trait;
use reconcile::{ClusterIdentity, Migration, MigrationRunner, ReconcileError, ResourceRecord, Result, StateStore};
use semver::Version;
use serde_json::{Map, Value as JsonValue};

/// Reescribe los atributos de todos los registros de `kind` con `f`.
/// `f` devuelve `false` si el registro ya estaba migrado.
fn rewrite_kind<F>(store: &dyn StateStore, kind: &str, mut f: F) -> Result<usize>
  where F: FnMut(&mut Map<String, JsonValue>) -> bool
{
  let mut changed = 0;
  for record in store.enumerate(kind)? {
    let mut attributes = match record.attributes {
      JsonValue::Object(map) => map,
      other => {
        return Err(ReconcileError::Corrupt(format!("{}/{} no es un objeto: {}", kind, record.key, other)));
      }
    };
    if f(&mut attributes) {
      store.save(kind, ResourceRecord::new(record.key, JsonValue::Object(attributes)))?;
      changed += 1;
    }
  }
  Ok(changed)
}

/// 0.1.1: las zonas creadas antes no distinguían zonas importadas; todas
/// las existentes eran gestionadas.
pub struct HostedZoneManagedFlag;

#[async_trait]
impl Migration for HostedZoneManagedFlag {
  fn version(&self) -> Version {
    Version::new(0, 1, 1)
  }

  fn name(&self) -> &str {
    "hosted-zone-managed-flag"
  }

  async fn migrate(&self, store: &dyn StateStore, identity: &ClusterIdentity) -> Result<()> {
    let n = rewrite_kind(store, HOSTED_ZONE_KIND, |attrs| {
              if attrs.contains_key("managed") {
                return false;
              }
              attrs.insert("managed".into(), JsonValue::Bool(true));
              true
            })?;
    log::info!("{} marked {} hosted zone(s) as managed", identity, n);
    Ok(())
  }
}

/// 0.2.0: `cidr` pasa a llamarse `network_block` y se registra el número
/// de NAT gateways (una sola antes de esta versión).
pub struct VpcNetworkBlock;

#[async_trait]
impl Migration for VpcNetworkBlock {
  fn version(&self) -> Version {
    Version::new(0, 2, 0)
  }

  fn name(&self) -> &str {
    "vpc-network-block"
  }

  async fn migrate(&self, store: &dyn StateStore, identity: &ClusterIdentity) -> Result<()> {
    let n = rewrite_kind(store, VPC_KIND, |attrs| {
              let mut changed = false;
              if let Some(cidr) = attrs.remove("cidr") {
                attrs.entry("network_block").or_insert(cidr);
                changed = true;
              }
              if !attrs.contains_key("nat_gateways") {
                attrs.insert("nat_gateways".into(), JsonValue::from(1));
                changed = true;
              }
              changed
            })?;
    log::info!("{} rewrote {} vpc record(s)", identity, n);
    Ok(())
  }
}

/// Todas las migraciones conocidas; el runner las ordena por versión.
pub fn platform_migrations() -> MigrationRunner {
  MigrationRunner::new(vec![Box::new(VpcNetworkBlock), Box::new(HostedZoneManagedFlag)])
}
