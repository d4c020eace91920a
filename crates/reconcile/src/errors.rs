// Archivo: errors.rs
// Propósito: definir los errores del motor de reconciliación y el alias
// Result<T> usado por las APIs del crate.
use semver::Version;
use thiserror::Error;

/// Errores comunes del motor.
///
/// La taxonomía separa validación, contención (`AlreadyLocked`),
/// incompatibilidad de versiones, errores de reconciliadores y errores de
/// E/S. Un `requeue` nunca es un error: viaja en `ReconcileResult`.
#[derive(Error, Debug)]
pub enum ReconcileError {
  /// Entidad no encontrada (estado local, objeto remoto).
  #[error("No encontrado: {0}")]
  NotFound(String),

  /// El estado local existe pero no puede leerse. Nunca se reinicializa.
  #[error("Estado corrupto: {0}")]
  Corrupt(String),

  /// Declaración u opciones inválidas; no se tocó ningún estado.
  #[error("Error de validación: {0}")]
  Validation(String),

  /// Otro proceso mantiene el lock del cluster.
  #[error("El estado del cluster {identity} está bloqueado por {holder} desde {since} ({operation})")]
  AlreadyLocked { identity: String,
                  holder: String,
                  operation: String,
                  since: String },

  /// Se intentó liberar un lock que pertenece a otro poseedor.
  #[error("El lock de {identity} pertenece a {holder}, no a este proceso")]
  LockNotHeld { identity: String, holder: String },

  /// El estado local se descargó en modo sólo lectura.
  #[error("Estado inmutable: {0}")]
  Immutable(String),

  /// El binario y el cluster no tienen la misma versión.
  #[error("La versión del binario ({binary}) no coincide con la del cluster ({cluster}). Ejecuta `upgrade` con un binario {binary} antes de volver a aplicar")]
  VersionMismatch { binary: Version, cluster: Version },

  /// El binario es más antiguo que la versión registrada del cluster.
  #[error("La versión del binario ({binary}) es anterior a la del cluster ({cluster}). Descarga un binario >= {cluster}")]
  BinaryTooOld { binary: Version, cluster: Version },

  /// Intento de retroceder la versión registrada del cluster.
  #[error("No se puede retroceder la versión del cluster de {stored} a {attempted}")]
  VersionRegression { stored: Version, attempted: Version },

  /// Error de un reconciliador; aborta la ejecución completa.
  #[error("El reconciliador '{reconciler}' falló: {source}")]
  Reconciler { reconciler: String,
               #[source]
               source: Box<ReconcileError> },

  /// Un reconciliador intentó tocar registros que no le pertenecen.
  #[error("El reconciliador '{reconciler}' no tiene acceso de {access} a '{kind}'")]
  AccessDenied { reconciler: String,
                 kind: String,
                 access: &'static str },

  /// Fallo de un paso de migración; los siguientes no se ejecutan.
  #[error("La migración {version} ({name}) falló: {message}")]
  Migration { version: Version,
              name: String,
              message: String },

  /// Se alcanzó el máximo de generaciones sin converger.
  #[error("Sin convergencia tras {generations} generaciones; pendientes: {pending:?}")]
  GenerationLimit { generations: u32, pending: Vec<String> },

  /// La ejecución fue interrumpida por una señal.
  #[error("Ejecución interrumpida")]
  Interrupted,

  /// Error del servicio externo (proveedor cloud, almacenamiento remoto).
  #[error("Error de almacenamiento: {0}")]
  Storage(String),

  /// Error de E/S local (descarga, subida, backup).
  #[error("Error de E/S: {0}")]
  Io(#[from] std::io::Error),

  /// Errores de serialización/deserialización JSON.
  #[error("Error de serialización: {0}")]
  Serialization(#[from] serde_json::Error),

  /// Otro tipo de error.
  #[error("Otro: {0}")]
  Other(String),
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, ReconcileError>;
