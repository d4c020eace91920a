use super::{HostedZoneRecord, DELEGATION_KIND, HOSTED_ZONE_KIND, MAIN_KEY};
use crate::provider::CloudProvider;
use async_trait::async_trait;
use platform_domain::ClusterDeclaration;
use reconcile::{ReconcileMeta, ReconcileResult, Reconciler, Result, StateHandle};
use std::sync::Arc;

/// Zona DNS propia del cluster: `{cluster}.{root_domain}`.
pub struct HostedZoneReconciler {
  provider: Arc<dyn CloudProvider>,
}

impl HostedZoneReconciler {
  pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
    Self { provider }
  }

  pub fn zone_name(declaration: &ClusterDeclaration) -> String {
    format!("{}.{}", declaration.metadata.name, declaration.dns.root_domain)
  }
}

#[async_trait]
impl Reconciler<ClusterDeclaration> for HostedZoneReconciler {
  fn name(&self) -> &str {
    "hosted-zone"
  }

  fn owns(&self) -> &[&'static str] {
    &[HOSTED_ZONE_KIND]
  }

  fn reads(&self) -> &[&'static str] {
    &[DELEGATION_KIND]
  }

  async fn reconcile(&self, meta: &ReconcileMeta<'_, ClusterDeclaration>, state: &StateHandle<'_>)
                     -> Result<ReconcileResult> {
    let existing: Option<HostedZoneRecord> = state.get_typed(HOSTED_ZONE_KIND, MAIN_KEY)?;

    if meta.purge {
      let Some(zone) = existing else {
        return Ok(ReconcileResult::done());
      };
      if state.get(DELEGATION_KIND, MAIN_KEY)?.is_some() {
        return Ok(ReconcileResult::requeue());
      }
      if zone.managed {
        self.provider.delete_hosted_zone(&zone.zone_id).await?;
        log::info!("{} hosted zone {} deleted", meta.identity, zone.name);
      } else {
        log::info!("{} hosted zone {} is not managed, leaving it in place", meta.identity, zone.name);
      }
      state.remove(HOSTED_ZONE_KIND, MAIN_KEY)?;
      return Ok(ReconcileResult::done());
    }

    let name = Self::zone_name(meta.declaration);
    if let Some(zone) = existing {
      if zone.name == name {
        return Ok(ReconcileResult::done());
      }
      // Renaming the zone means a new one; the delegation follows it.
      log::info!("{} hosted zone changes from {} to {}", meta.identity, zone.name, name);
      if zone.managed {
        self.provider.delete_hosted_zone(&zone.zone_id).await?;
      }
    }
    let info = self.provider.create_hosted_zone(&name).await?;
    log::info!("{} hosted zone {} created", meta.identity, info.name);
    state.save_typed(HOSTED_ZONE_KIND,
                     MAIN_KEY,
                     &HostedZoneRecord { zone_id: info.zone_id,
                                         name: info.name,
                                         parent: meta.declaration.dns.root_domain.clone(),
                                         name_servers: info.name_servers,
                                         managed: true })?;
    Ok(ReconcileResult::done())
  }
}
