use super::{ClusterRecord, VpcRecord, CLUSTER_KIND, MAIN_KEY, VPC_KIND};
use crate::provider::{ClusterStatus, CloudProvider};
use async_trait::async_trait;
use platform_domain::ClusterDeclaration;
use reconcile::{ReconcileError, ReconcileMeta, ReconcileResult, Reconciler, Result, StateHandle};
use std::sync::Arc;

/// Cluster Kubernetes gestionado. La creación y el borrado son
/// asíncronos en el proveedor: se pide `requeue` hasta que el estado
/// observado sea `Active` (o `Gone` al purgar).
pub struct ClusterReconciler {
  provider: Arc<dyn CloudProvider>,
}

impl ClusterReconciler {
  pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
    Self { provider }
  }

  async fn purge(&self, meta: &ReconcileMeta<'_, ClusterDeclaration>, state: &StateHandle<'_>,
                 existing: Option<ClusterRecord>)
                 -> Result<ReconcileResult> {
    let Some(cluster) = existing else {
      return Ok(ReconcileResult::done());
    };
    if cluster.status != ClusterStatus::Deleting {
      self.provider.delete_cluster(&cluster.cluster_id).await?;
      log::info!("{} cluster {} deletion requested", meta.identity, cluster.cluster_id);
      state.save_typed(CLUSTER_KIND,
                       MAIN_KEY,
                       &ClusterRecord { status: ClusterStatus::Deleting,
                                        endpoint: None,
                                        ..cluster })?;
      return Ok(ReconcileResult::requeue());
    }
    let observed = self.provider.describe_cluster(&cluster.cluster_id).await?;
    if observed.status == ClusterStatus::Gone {
      state.remove(CLUSTER_KIND, MAIN_KEY)?;
      log::info!("{} cluster {} deleted", meta.identity, cluster.cluster_id);
      Ok(ReconcileResult::done())
    } else {
      Ok(ReconcileResult::requeue())
    }
  }
}

#[async_trait]
impl Reconciler<ClusterDeclaration> for ClusterReconciler {
  fn name(&self) -> &str {
    "cluster"
  }

  fn owns(&self) -> &[&'static str] {
    &[CLUSTER_KIND]
  }

  fn reads(&self) -> &[&'static str] {
    &[VPC_KIND]
  }

  async fn reconcile(&self, meta: &ReconcileMeta<'_, ClusterDeclaration>, state: &StateHandle<'_>)
                     -> Result<ReconcileResult> {
    let existing: Option<ClusterRecord> = state.get_typed(CLUSTER_KIND, MAIN_KEY)?;
    if meta.purge {
      return self.purge(meta, state, existing).await;
    }

    let cluster = match existing {
      Some(c) if c.status == ClusterStatus::Active => return Ok(ReconcileResult::done()),
      Some(c) => c,
      None => {
        let vpc: VpcRecord = state.require(VPC_KIND, MAIN_KEY)?;
        let info = self.provider.create_cluster(meta.identity, &vpc.vpc_id).await?;
        log::info!("{} cluster {} creation requested", meta.identity, info.cluster_id);
        let record = ClusterRecord { cluster_id: info.cluster_id,
                                     vpc_id: vpc.vpc_id,
                                     status: info.status,
                                     endpoint: info.endpoint };
        state.save_typed(CLUSTER_KIND, MAIN_KEY, &record)?;
        return Ok(if record.status == ClusterStatus::Active {
                    ReconcileResult::done()
                  } else {
                    ReconcileResult::requeue()
                  });
      }
    };

    let observed = self.provider.describe_cluster(&cluster.cluster_id).await?;
    match observed.status {
      ClusterStatus::Active => {
        log::info!("{} cluster {} is active", meta.identity, cluster.cluster_id);
        state.save_typed(CLUSTER_KIND,
                         MAIN_KEY,
                         &ClusterRecord { status: ClusterStatus::Active,
                                          endpoint: observed.endpoint,
                                          ..cluster })?;
        Ok(ReconcileResult::done())
      }
      ClusterStatus::Creating => {
        log::debug!("{} cluster {} still creating", meta.identity, cluster.cluster_id);
        Ok(ReconcileResult::requeue())
      }
      ClusterStatus::Deleting | ClusterStatus::Gone => {
        Err(ReconcileError::Other(format!("el cluster {} está {:?} en el proveedor; purga el estado antes de recrearlo",
                                          cluster.cluster_id, observed.status)))
      }
    }
  }
}
