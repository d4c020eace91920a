use super::{VpcRecord, CLUSTER_KIND, DATABASE_KIND, MAIN_KEY, VPC_KIND};
use crate::provider::CloudProvider;
use async_trait::async_trait;
use platform_domain::ClusterDeclaration;
use reconcile::{ReconcileError, ReconcileMeta, ReconcileResult, Reconciler, Result, StateHandle};
use std::sync::Arc;

/// Red del cluster. El bloque CIDR no se puede cambiar una vez creada.
pub struct VpcReconciler {
  provider: Arc<dyn CloudProvider>,
}

impl VpcReconciler {
  pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
    Self { provider }
  }
}

#[async_trait]
impl Reconciler<ClusterDeclaration> for VpcReconciler {
  fn name(&self) -> &str {
    "vpc"
  }

  fn owns(&self) -> &[&'static str] {
    &[VPC_KIND]
  }

  fn reads(&self) -> &[&'static str] {
    &[CLUSTER_KIND, DATABASE_KIND]
  }

  async fn reconcile(&self, meta: &ReconcileMeta<'_, ClusterDeclaration>, state: &StateHandle<'_>)
                     -> Result<ReconcileResult> {
    let existing: Option<VpcRecord> = state.get_typed(VPC_KIND, MAIN_KEY)?;

    if meta.purge {
      let Some(vpc) = existing else {
        return Ok(ReconcileResult::done());
      };
      // Dependents are still being torn down in this generation.
      if state.get(CLUSTER_KIND, MAIN_KEY)?.is_some() || !state.enumerate(DATABASE_KIND)?.is_empty() {
        log::debug!("{} vpc {} still has dependents", meta.identity, vpc.vpc_id);
        return Ok(ReconcileResult::requeue());
      }
      self.provider.delete_vpc(&vpc.vpc_id).await?;
      state.remove(VPC_KIND, MAIN_KEY)?;
      log::info!("{} vpc {} deleted", meta.identity, vpc.vpc_id);
      return Ok(ReconcileResult::done());
    }

    let spec = &meta.declaration.vpc;
    match existing {
      Some(vpc) if vpc.network_block == spec.cidr => Ok(ReconcileResult::done()),
      Some(vpc) => Err(ReconcileError::Validation(format!("el bloque de red de {} es inmutable ({} -> {})",
                                                          vpc.vpc_id, vpc.network_block, spec.cidr))),
      None => {
        let info = self.provider
                       .create_vpc(meta.identity, &spec.cidr, spec.high_availability)
                       .await?;
        log::info!("{} vpc {} created ({})", meta.identity, info.vpc_id, info.network_block);
        state.save_typed(VPC_KIND,
                         MAIN_KEY,
                         &VpcRecord { vpc_id: info.vpc_id,
                                      network_block: info.network_block,
                                      nat_gateways: info.nat_gateways })?;
        Ok(ReconcileResult::done())
      }
    }
  }
}
