use super::{DatabaseRecord, VpcRecord, DATABASE_KIND, MAIN_KEY, VPC_KIND};
use crate::provider::CloudProvider;
use async_trait::async_trait;
use platform_domain::ClusterDeclaration;
use reconcile::{ReconcileMeta, ReconcileResult, Reconciler, Result, StateHandle};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Bases de datos Postgres del cluster, una por entrada de `databases`.
/// Las que desaparecen de la declaración se borran.
pub struct PostgresDatabasesReconciler {
  provider: Arc<dyn CloudProvider>,
}

impl PostgresDatabasesReconciler {
  pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
    Self { provider }
  }

  async fn drop_database(&self, meta: &ReconcileMeta<'_, ClusterDeclaration>, state: &StateHandle<'_>,
                         db: &DatabaseRecord)
                         -> Result<()> {
    self.provider.delete_database(&db.database_id).await?;
    state.remove(DATABASE_KIND, &db.name)?;
    log::info!("{} database {} deleted", meta.identity, db.name);
    Ok(())
  }
}

#[async_trait]
impl Reconciler<ClusterDeclaration> for PostgresDatabasesReconciler {
  fn name(&self) -> &str {
    "postgres-databases"
  }

  fn owns(&self) -> &[&'static str] {
    &[DATABASE_KIND]
  }

  fn reads(&self) -> &[&'static str] {
    &[VPC_KIND]
  }

  async fn reconcile(&self, meta: &ReconcileMeta<'_, ClusterDeclaration>, state: &StateHandle<'_>)
                     -> Result<ReconcileResult> {
    let existing = state.enumerate(DATABASE_KIND)?
                        .into_iter()
                        .map(|r| r.decode::<DatabaseRecord>())
                        .collect::<Result<Vec<_>>>()?;

    if meta.purge {
      for db in existing.iter() {
        self.drop_database(meta, state, db).await?;
      }
      return Ok(ReconcileResult::done());
    }

    let declared: BTreeSet<&str> = meta.declaration.databases.iter().map(|d| d.name.as_str()).collect();
    for db in existing.iter().filter(|db| !declared.contains(db.name.as_str())) {
      self.drop_database(meta, state, db).await?;
    }

    let present: BTreeSet<&str> = existing.iter().map(|db| db.name.as_str()).collect();
    let missing: Vec<_> = meta.declaration
                              .databases
                              .iter()
                              .filter(|spec| !present.contains(spec.name.as_str()))
                              .collect();
    if missing.is_empty() {
      return Ok(ReconcileResult::done());
    }

    let vpc: VpcRecord = state.require(VPC_KIND, MAIN_KEY)?;
    for spec in missing {
      let info = self.provider.create_database(meta.identity, &vpc.vpc_id, spec).await?;
      log::info!("{} database {} created at {}", meta.identity, spec.name, info.endpoint);
      state.save_typed(DATABASE_KIND,
                       &spec.name,
                       &DatabaseRecord { database_id: info.database_id,
                                         name: spec.name.clone(),
                                         endpoint: info.endpoint,
                                         instance_class: spec.instance_class.clone(),
                                         storage_gb: spec.storage_gb })?;
    }
    Ok(ReconcileResult::done())
  }
}
