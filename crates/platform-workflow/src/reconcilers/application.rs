use super::{ClusterRecord, DatabaseRecord, HostedZoneRecord, APPLICATION_KIND, CLUSTER_KIND, DATABASE_KIND,
            HOSTED_ZONE_KIND, MAIN_KEY};
use crate::provider::{ClusterStatus, CloudProvider, Deployment};
use async_trait::async_trait;
use platform_domain::ApplicationDeclaration;
use reconcile::{ReconcileError, ReconcileMeta, ReconcileResult, Reconciler, Result, StateHandle};
use std::sync::Arc;

/// Despliegue de una aplicación sobre un cluster ya aplicado. Lee el
/// estado del cluster (endpoint, zona DNS, bases de datos) pero sólo
/// escribe sus propios registros.
pub struct ApplicationReconciler {
  provider: Arc<dyn CloudProvider>,
}

impl ApplicationReconciler {
  pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
    Self { provider }
  }

  fn desired(app: &ApplicationDeclaration, state: &StateHandle<'_>) -> Result<Deployment> {
    let host = match &app.subdomain {
      Some(sub) => {
        let zone: HostedZoneRecord = state.require(HOSTED_ZONE_KIND, MAIN_KEY)?;
        Some(format!("{}.{}", sub, zone.name))
      }
      None => None,
    };
    let database_endpoint = match &app.postgres {
      Some(db) => {
        let record: DatabaseRecord = state.get_typed(DATABASE_KIND, db)?.ok_or_else(|| {
                                       ReconcileError::NotFound(format!("la base de datos '{}' no está declarada en el \
                                                                         cluster {}",
                                                                        db, app.cluster.name))
                                     })?;
        Some(record.endpoint)
      }
      None => None,
    };
    Ok(Deployment { namespace: app.metadata.namespace.clone(),
                    name: app.metadata.name.clone(),
                    image: app.image.clone(),
                    port: app.port,
                    replicas: app.replicas,
                    host,
                    database_endpoint })
  }
}

#[async_trait]
impl Reconciler<ApplicationDeclaration> for ApplicationReconciler {
  fn name(&self) -> &str {
    "application"
  }

  fn owns(&self) -> &[&'static str] {
    &[APPLICATION_KIND]
  }

  fn reads(&self) -> &[&'static str] {
    &[CLUSTER_KIND, HOSTED_ZONE_KIND, DATABASE_KIND]
  }

  async fn reconcile(&self, meta: &ReconcileMeta<'_, ApplicationDeclaration>, state: &StateHandle<'_>)
                     -> Result<ReconcileResult> {
    let app = meta.declaration;
    let key = app.key();
    let existing: Option<Deployment> = state.get_typed(APPLICATION_KIND, &key)?;
    let cluster: Option<ClusterRecord> = state.get_typed(CLUSTER_KIND, MAIN_KEY)?;

    if meta.purge {
      if let Some(deployment) = existing {
        if let Some(cluster) = cluster {
          self.provider
              .undeploy(&cluster.cluster_id, &deployment.namespace, &deployment.name)
              .await?;
        }
        state.remove(APPLICATION_KIND, &key)?;
        log::info!("{} application {} removed", meta.identity, key);
      }
      return Ok(ReconcileResult::done());
    }

    let cluster = cluster.ok_or_else(|| {
                           ReconcileError::NotFound(format!("el cluster {} no existe; aplica el cluster primero",
                                                            meta.identity))
                         })?;
    if cluster.status != ClusterStatus::Active {
      log::debug!("{} cluster {} not active yet", meta.identity, cluster.cluster_id);
      return Ok(ReconcileResult::requeue());
    }

    let desired = Self::desired(app, state)?;
    if existing.as_ref() == Some(&desired) {
      return Ok(ReconcileResult::done());
    }
    self.provider.deploy(&cluster.cluster_id, &desired).await?;
    log::info!("{} application {} deployed ({} x{})", meta.identity, key, desired.image, desired.replicas);
    state.save_typed(APPLICATION_KIND, &key, &desired)?;
    Ok(ReconcileResult::done())
  }
}
