// Archivo: provider/simulated.rs
// Propósito: proveedor en memoria para pruebas y para ejecutar el binario
// sin credenciales. Registra cada llamada y simula la latencia de
// propagación DNS y de creación/borrado de clusters.
use super::{ClusterInfo, ClusterStatus, CloudProvider, DatabaseInfo, Deployment, VpcInfo, ZoneInfo};
use crate::WorkflowError;
use async_trait::async_trait;
use platform_domain::DatabaseSpec;
use reconcile::{ClusterIdentity, OriginalVersionSource, ReconcileError};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default, Serialize, Deserialize)]
struct SimState {
  #[serde(skip)]
  calls: Vec<String>,
  #[serde(skip)]
  failures: HashSet<String>,
  next_id: u64,
  vpcs: BTreeMap<String, VpcInfo>,
  zones: BTreeMap<String, ZoneInfo>,
  /// zona -> consultas restantes hasta propagar
  delegations: BTreeMap<String, u32>,
  /// id -> (info, consultas restantes hasta el siguiente estado)
  clusters: BTreeMap<String, (ClusterInfo, u32)>,
  databases: BTreeMap<String, DatabaseInfo>,
  /// `cluster_id/namespace/name` -> despliegue
  deployments: BTreeMap<String, Deployment>,
}

impl SimState {
  fn id(&mut self, prefix: &str) -> String {
    self.next_id += 1;
    format!("{}-{:08x}", prefix, self.next_id)
  }

  /// Sustituye los recursos por los del fichero; conserva llamadas y fallos
  /// inyectados, que sólo viven en este proceso.
  fn reload(&mut self, path: &Path) -> Result<(), WorkflowError> {
    let bytes = match std::fs::read(path) {
      Ok(b) => b,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
      Err(e) => return Err(sim_io("reload", e)),
    };
    let stored: SimState = serde_json::from_slice(&bytes)?;
    self.next_id = stored.next_id;
    self.vpcs = stored.vpcs;
    self.zones = stored.zones;
    self.delegations = stored.delegations;
    self.clusters = stored.clusters;
    self.databases = stored.databases;
    self.deployments = stored.deployments;
    Ok(())
  }

  fn store(&self, path: &Path) -> Result<(), WorkflowError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| sim_io("store", e))?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(self)?).map_err(|e| sim_io("store", e))?;
    std::fs::rename(&tmp, path).map_err(|e| sim_io("store", e))
  }
}

fn sim_io(operation: &str, e: std::io::Error) -> WorkflowError {
  WorkflowError::Provider { operation: operation.to_string(),
                            message: e.to_string() }
}

/// Acceso exclusivo al estado simulado. Si la nube tiene fichero, se
/// reescribe al soltar el guard.
struct SimGuard<'a> {
  state: MutexGuard<'a, SimState>,
  backing: Option<&'a Path>,
}

impl Deref for SimGuard<'_> {
  type Target = SimState;

  fn deref(&self) -> &SimState {
    &self.state
  }
}

impl DerefMut for SimGuard<'_> {
  fn deref_mut(&mut self) -> &mut SimState {
    &mut self.state
  }
}

impl Drop for SimGuard<'_> {
  fn drop(&mut self) {
    if let Some(path) = self.backing {
      if let Err(e) = self.state.store(path) {
        log::error!("cannot persist simulated cloud to {}: {}", path.display(), e);
      }
    }
  }
}

/// Nube simulada.
///
/// `readiness_polls` es el número de consultas (`describe_cluster`,
/// `delegation_propagated`) que devuelven "todavía no" antes de que el
/// recurso esté listo o borrado.
///
/// Con `persistent` los recursos se guardan como JSON en un fichero y se
/// releen en cada llamada, así varias ejecuciones del binario ven la misma
/// nube.
#[derive(Debug, Default)]
pub struct SimulatedCloud {
  state: Mutex<SimState>,
  backing: Option<PathBuf>,
  readiness_polls: u32,
  version_tag: Option<Version>,
}

impl SimulatedCloud {
  pub fn new() -> Self {
    Self::default()
  }

  /// Nube simulada respaldada por `path`. El fichero se crea en la primera
  /// llamada que lo modifica.
  pub fn persistent(path: impl Into<PathBuf>) -> Self {
    Self { backing: Some(path.into()),
           ..Self::default() }
  }

  pub fn with_readiness_polls(mut self, polls: u32) -> Self {
    self.readiness_polls = polls;
    self
  }

  /// Simula infraestructura creada por un binario antiguo que dejó la
  /// versión en tags.
  pub fn with_version_tag(mut self, version: Version) -> Self {
    self.version_tag = Some(version);
    self
  }

  /// Hace fallar todas las llamadas a `operation` a partir de ahora.
  pub fn fail_on(&self, operation: &str) {
    if let Ok(mut s) = self.state.lock() {
      s.failures.insert(operation.to_string());
    }
  }

  /// Vuelve a permitir `operation`.
  pub fn heal(&self, operation: &str) {
    if let Ok(mut s) = self.state.lock() {
      s.failures.remove(operation);
    }
  }

  /// Llamadas realizadas, en orden.
  pub fn calls(&self) -> Vec<String> {
    self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
  }

  /// Número de recursos vivos de cualquier tipo.
  pub fn live_resources(&self) -> usize {
    self.peek(|s| {
          s.vpcs.len() + s.zones.len() + s.delegations.len() + s.clusters.len() + s.databases.len() + s.deployments.len()
        })
        .unwrap_or_default()
  }

  pub fn deployment(&self, cluster_id: &str, namespace: &str, name: &str) -> Option<Deployment> {
    self.peek(|s| s.deployments.get(&format!("{}/{}/{}", cluster_id, namespace, name)).cloned())
        .flatten()
  }

  /// Lectura sin registrar llamada; relee el fichero si lo hay.
  fn peek<T>(&self, f: impl FnOnce(&SimState) -> T) -> Option<T> {
    let mut state = self.state.lock().ok()?;
    if let Some(path) = self.backing.as_deref() {
      if let Err(e) = state.reload(path) {
        log::warn!("cannot reload simulated cloud from {}: {}", path.display(), e);
      }
    }
    Some(f(&state))
  }

  fn begin(&self, operation: &str) -> Result<SimGuard<'_>, WorkflowError> {
    let mut state = self.state.lock().map_err(|e| WorkflowError::Provider { operation: operation.to_string(),
                                                                             message: format!("mutex poisoned: {:?}",
                                                                                              e) })?;
    state.calls.push(operation.to_string());
    if state.failures.contains(operation) {
      return Err(WorkflowError::Provider { operation: operation.to_string(),
                                           message: "fallo simulado".to_string() });
    }
    if let Some(path) = self.backing.as_deref() {
      state.reload(path)?;
    }
    Ok(SimGuard { state,
                  backing: self.backing.as_deref() })
  }
}

#[async_trait]
impl CloudProvider for SimulatedCloud {
  async fn create_vpc(&self, identity: &ClusterIdentity, network_block: &str, high_availability: bool)
                      -> Result<VpcInfo, WorkflowError> {
    let mut s = self.begin("create_vpc")?;
    let vpc = VpcInfo { vpc_id: s.id("vpc"),
                        network_block: network_block.to_string(),
                        nat_gateways: if high_availability { 3 } else { 1 } };
    log::debug!("simulated vpc {} for {}", vpc.vpc_id, identity);
    s.vpcs.insert(vpc.vpc_id.clone(), vpc.clone());
    Ok(vpc)
  }

  async fn delete_vpc(&self, vpc_id: &str) -> Result<(), WorkflowError> {
    let mut s = self.begin("delete_vpc")?;
    s.vpcs.remove(vpc_id);
    Ok(())
  }

  async fn create_hosted_zone(&self, name: &str) -> Result<ZoneInfo, WorkflowError> {
    let mut s = self.begin("create_hosted_zone")?;
    let zone_id = s.id("zone");
    let zone = ZoneInfo { name_servers: (1..=4).map(|n| format!("ns-{}.{}.dns.example", n, zone_id)).collect(),
                          zone_id,
                          name: name.to_string() };
    s.zones.insert(zone.zone_id.clone(), zone.clone());
    Ok(zone)
  }

  async fn delete_hosted_zone(&self, zone_id: &str) -> Result<(), WorkflowError> {
    let mut s = self.begin("delete_hosted_zone")?;
    s.zones.remove(zone_id);
    Ok(())
  }

  async fn delegate_zone(&self, _parent: &str, zone: &ZoneInfo) -> Result<(), WorkflowError> {
    let polls = self.readiness_polls;
    let mut s = self.begin("delegate_zone")?;
    s.delegations.insert(zone.name.clone(), polls);
    Ok(())
  }

  async fn delegation_propagated(&self, zone_name: &str) -> Result<bool, WorkflowError> {
    let mut s = self.begin("delegation_propagated")?;
    match s.delegations.get_mut(zone_name) {
      Some(0) => Ok(true),
      Some(remaining) => {
        *remaining -= 1;
        Ok(false)
      }
      None => Ok(false),
    }
  }

  async fn remove_delegation(&self, _parent: &str, zone_name: &str) -> Result<(), WorkflowError> {
    let mut s = self.begin("remove_delegation")?;
    s.delegations.remove(zone_name);
    Ok(())
  }

  async fn create_cluster(&self, identity: &ClusterIdentity, vpc_id: &str) -> Result<ClusterInfo, WorkflowError> {
    let polls = self.readiness_polls;
    let mut s = self.begin("create_cluster")?;
    if !s.vpcs.contains_key(vpc_id) {
      return Err(WorkflowError::Provider { operation: "create_cluster".into(),
                                           message: format!("la VPC {} no existe", vpc_id) });
    }
    let info = ClusterInfo { cluster_id: format!("{}-{}", identity.cluster_name, s.id("eks")),
                             status: ClusterStatus::Creating,
                             endpoint: None };
    s.clusters.insert(info.cluster_id.clone(), (info.clone(), polls));
    Ok(info)
  }

  async fn describe_cluster(&self, cluster_id: &str) -> Result<ClusterInfo, WorkflowError> {
    let mut s = self.begin("describe_cluster")?;
    let (info, remaining) = match s.clusters.get_mut(cluster_id) {
      Some(entry) => entry,
      None => {
        return Ok(ClusterInfo { cluster_id: cluster_id.to_string(),
                                status: ClusterStatus::Gone,
                                endpoint: None })
      }
    };
    if *remaining > 0 {
      *remaining -= 1;
      return Ok(info.clone());
    }
    match info.status {
      ClusterStatus::Creating => {
        info.status = ClusterStatus::Active;
        info.endpoint = Some(format!("https://{}.k8s.example", cluster_id));
        Ok(info.clone())
      }
      ClusterStatus::Deleting => {
        s.clusters.remove(cluster_id);
        Ok(ClusterInfo { cluster_id: cluster_id.to_string(),
                         status: ClusterStatus::Gone,
                         endpoint: None })
      }
      _ => Ok(info.clone()),
    }
  }

  async fn delete_cluster(&self, cluster_id: &str) -> Result<(), WorkflowError> {
    let polls = self.readiness_polls;
    let mut s = self.begin("delete_cluster")?;
    if let Some((info, remaining)) = s.clusters.get_mut(cluster_id) {
      info.status = ClusterStatus::Deleting;
      info.endpoint = None;
      *remaining = polls;
    }
    let prefix = format!("{}/", cluster_id);
    s.deployments.retain(|k, _| !k.starts_with(&prefix));
    Ok(())
  }

  async fn create_database(&self, identity: &ClusterIdentity, vpc_id: &str, spec: &DatabaseSpec)
                           -> Result<DatabaseInfo, WorkflowError> {
    let mut s = self.begin("create_database")?;
    if !s.vpcs.contains_key(vpc_id) {
      return Err(WorkflowError::Provider { operation: "create_database".into(),
                                           message: format!("la VPC {} no existe", vpc_id) });
    }
    let db = DatabaseInfo { database_id: s.id("db"),
                            endpoint: format!("{}.{}.{}.rds.example:5432",
                                              spec.name, identity.cluster_name, identity.region) };
    s.databases.insert(db.database_id.clone(), db.clone());
    Ok(db)
  }

  async fn delete_database(&self, database_id: &str) -> Result<(), WorkflowError> {
    let mut s = self.begin("delete_database")?;
    s.databases.remove(database_id);
    Ok(())
  }

  async fn deploy(&self, cluster_id: &str, deployment: &Deployment) -> Result<(), WorkflowError> {
    let mut s = self.begin("deploy")?;
    let active = matches!(s.clusters.get(cluster_id), Some((info, _)) if info.status == ClusterStatus::Active);
    if !active {
      return Err(WorkflowError::Provider { operation: "deploy".into(),
                                           message: format!("el cluster {} no está activo", cluster_id) });
    }
    let key = format!("{}/{}/{}", cluster_id, deployment.namespace, deployment.name);
    s.deployments.insert(key, deployment.clone());
    Ok(())
  }

  async fn undeploy(&self, cluster_id: &str, namespace: &str, name: &str) -> Result<(), WorkflowError> {
    let mut s = self.begin("undeploy")?;
    s.deployments.remove(&format!("{}/{}/{}", cluster_id, namespace, name));
    Ok(())
  }
}

#[async_trait]
impl OriginalVersionSource for SimulatedCloud {
  async fn original_version_tag(&self, _identity: &ClusterIdentity) -> Result<Option<Version>, ReconcileError> {
    Ok(self.version_tag.clone())
  }
}
