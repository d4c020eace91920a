// Archivo: config.rs
// Propósito: configuración de la plataforma a partir del entorno (`.env`
// incluido vía dotenvy).
use crate::WorkflowError;
use platform_persistence::DEFAULT_REMOTE_DIR;
use reconcile::{DelayPolicy, SchedulerConfig, StatePaths};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_STATE_DIR: &str = ".kubeplat/state";
pub const DEFAULT_BACKUP_DIR: &str = ".kubeplat/backups";
pub const DEFAULT_REQUEUE_DELAY_MS: u64 = 5_000;
pub const DEFAULT_MAX_GENERATIONS: u32 = 120;
/// Fichero, dentro del directorio remoto, donde el proveedor simulado guarda
/// sus recursos entre procesos.
pub const SIMULATED_CLOUD_FILE: &str = "simulated-cloud.json";

/// Configuración del binario.
///
/// | Variable                        | Defecto              |
/// |---------------------------------|----------------------|
/// | `KUBEPLAT_STATE_DIR`            | `.kubeplat/state`    |
/// | `KUBEPLAT_BACKUP_DIR`           | `.kubeplat/backups`  |
/// | `KUBEPLAT_REMOTE_DIR`           | `.kubeplat/remote`   |
/// | `KUBEPLAT_REQUEUE_DELAY_MS`     | `5000`               |
/// | `KUBEPLAT_BACKOFF_MAX_MS`       | sin backoff          |
/// | `KUBEPLAT_MAX_GENERATIONS`      | `120` (`0` = sin límite) |
/// | `KUBEPLAT_SIM_READINESS_POLLS`  | `2`                  |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
  pub state_dir: PathBuf,
  pub backup_dir: PathBuf,
  pub remote_dir: PathBuf,
  pub requeue_delay: Duration,
  /// Si está presente, la espera se duplica en cada generación hasta este
  /// techo.
  pub backoff_max: Option<Duration>,
  pub max_generations: Option<u32>,
  /// Consultas que el proveedor simulado tarda en dar un recurso por listo.
  pub readiness_polls: u32,
}

impl Default for PlatformConfig {
  fn default() -> Self {
    Self { state_dir: DEFAULT_STATE_DIR.into(),
           backup_dir: DEFAULT_BACKUP_DIR.into(),
           remote_dir: DEFAULT_REMOTE_DIR.into(),
           requeue_delay: Duration::from_millis(DEFAULT_REQUEUE_DELAY_MS),
           backoff_max: None,
           max_generations: Some(DEFAULT_MAX_GENERATIONS),
           readiness_polls: 2 }
  }
}

fn parse<T: FromStr>(name: &str, raw: &str) -> Result<T, WorkflowError> {
  raw.trim()
     .parse()
     .map_err(|_| WorkflowError::Config(format!("{} tiene un valor inválido: '{}'", name, raw)))
}

impl PlatformConfig {
  /// Carga `.env` si existe y lee las variables `KUBEPLAT_*`.
  pub fn from_env() -> Result<Self, WorkflowError> {
    dotenvy::dotenv().ok();
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Igual que `from_env` pero con una función de búsqueda arbitraria.
  pub fn from_lookup<F>(get: F) -> Result<Self, WorkflowError>
    where F: Fn(&str) -> Option<String>
  {
    let mut cfg = Self::default();
    if let Some(v) = get("KUBEPLAT_STATE_DIR") {
      cfg.state_dir = v.into();
    }
    if let Some(v) = get("KUBEPLAT_BACKUP_DIR") {
      cfg.backup_dir = v.into();
    }
    if let Some(v) = get("KUBEPLAT_REMOTE_DIR") {
      cfg.remote_dir = v.into();
    }
    if let Some(v) = get("KUBEPLAT_REQUEUE_DELAY_MS") {
      cfg.requeue_delay = Duration::from_millis(parse("KUBEPLAT_REQUEUE_DELAY_MS", &v)?);
    }
    if let Some(v) = get("KUBEPLAT_BACKOFF_MAX_MS") {
      cfg.backoff_max = Some(Duration::from_millis(parse("KUBEPLAT_BACKOFF_MAX_MS", &v)?));
    }
    if let Some(v) = get("KUBEPLAT_MAX_GENERATIONS") {
      let max: u32 = parse("KUBEPLAT_MAX_GENERATIONS", &v)?;
      cfg.max_generations = if max == 0 { None } else { Some(max) };
    }
    if let Some(v) = get("KUBEPLAT_SIM_READINESS_POLLS") {
      cfg.readiness_polls = parse("KUBEPLAT_SIM_READINESS_POLLS", &v)?;
    }
    if let Some(max) = cfg.backoff_max {
      if max < cfg.requeue_delay {
        return Err(WorkflowError::Config("KUBEPLAT_BACKOFF_MAX_MS no puede ser menor que KUBEPLAT_REQUEUE_DELAY_MS"
                                           .into()));
      }
    }
    Ok(cfg)
  }

  pub fn paths(&self) -> StatePaths {
    StatePaths::new(self.state_dir.clone(), self.backup_dir.clone())
  }

  pub fn simulated_cloud_path(&self) -> PathBuf {
    self.remote_dir.join(SIMULATED_CLOUD_FILE)
  }

  pub fn scheduler(&self) -> SchedulerConfig {
    let delay = match self.backoff_max {
      Some(max) => DelayPolicy::Backoff { initial: self.requeue_delay,
                                          factor: 2,
                                          max },
      None => DelayPolicy::Fixed(self.requeue_delay),
    };
    SchedulerConfig { delay,
                      max_generations: self.max_generations }
  }
}
