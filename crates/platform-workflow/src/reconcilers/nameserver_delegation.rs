use super::{DelegationRecord, HostedZoneRecord, DELEGATION_KIND, HOSTED_ZONE_KIND, MAIN_KEY};
use crate::provider::{CloudProvider, ZoneInfo};
use async_trait::async_trait;
use platform_domain::ClusterDeclaration;
use reconcile::{ReconcileMeta, ReconcileResult, Reconciler, Result, StateHandle};
use std::sync::Arc;

/// Publica la zona del cluster en la zona raíz y espera a que propague.
pub struct NameserverDelegationReconciler {
  provider: Arc<dyn CloudProvider>,
}

impl NameserverDelegationReconciler {
  pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
    Self { provider }
  }
}

#[async_trait]
impl Reconciler<ClusterDeclaration> for NameserverDelegationReconciler {
  fn name(&self) -> &str {
    "nameserver-delegation"
  }

  fn owns(&self) -> &[&'static str] {
    &[DELEGATION_KIND]
  }

  fn reads(&self) -> &[&'static str] {
    &[HOSTED_ZONE_KIND]
  }

  async fn reconcile(&self, meta: &ReconcileMeta<'_, ClusterDeclaration>, state: &StateHandle<'_>)
                     -> Result<ReconcileResult> {
    let existing: Option<DelegationRecord> = state.get_typed(DELEGATION_KIND, MAIN_KEY)?;

    if meta.purge {
      if let Some(delegation) = existing {
        self.provider.remove_delegation(&delegation.parent, &delegation.zone).await?;
        state.remove(DELEGATION_KIND, MAIN_KEY)?;
        log::info!("{} delegation of {} removed", meta.identity, delegation.zone);
      }
      return Ok(ReconcileResult::done());
    }

    let zone: HostedZoneRecord = state.require(HOSTED_ZONE_KIND, MAIN_KEY)?;
    let current = match existing {
      Some(d) if d.zone == zone.name => d,
      stale => {
        if let Some(old) = stale {
          self.provider.remove_delegation(&old.parent, &old.zone).await?;
        }
        let info = ZoneInfo { zone_id: zone.zone_id.clone(),
                              name: zone.name.clone(),
                              name_servers: zone.name_servers.clone() };
        self.provider.delegate_zone(&zone.parent, &info).await?;
        log::info!("{} delegated {} from {}", meta.identity, zone.name, zone.parent);
        let record = DelegationRecord { zone: zone.name.clone(),
                                        parent: zone.parent.clone(),
                                        propagated: false };
        state.save_typed(DELEGATION_KIND, MAIN_KEY, &record)?;
        return Ok(ReconcileResult::requeue());
      }
    };

    if current.propagated {
      return Ok(ReconcileResult::done());
    }
    if self.provider.delegation_propagated(&current.zone).await? {
      log::info!("{} delegation of {} propagated", meta.identity, current.zone);
      state.save_typed(DELEGATION_KIND,
                       MAIN_KEY,
                       &DelegationRecord { propagated: true,
                                           ..current })?;
      Ok(ReconcileResult::done())
    } else {
      log::debug!("{} waiting for {} to propagate", meta.identity, current.zone);
      Ok(ReconcileResult::requeue())
    }
  }
}
