use reconcile::ReconcileError;
use thiserror::Error;

// Errores de la capa de plataforma.
//
// Los reconciliadores devuelven `ReconcileError`; los errores del proveedor
// y de configuración se convierten con `?` gracias al `From` de abajo.
#[derive(Error, Debug)]
pub enum WorkflowError {
  /// Variables de entorno con valores inválidos.
  #[error("Error de configuración: {0}")]
  Config(String),

  /// Fallo de una llamada al proveedor de nube.
  #[error("Error del proveedor en {operation}: {message}")]
  Provider { operation: String, message: String },

  /// Errores originados al validar declaraciones.
  #[error("Error de dominio: {0}")]
  Domain(#[from] platform_domain::DomainError),

  /// Errores de serializacion/deserializacion JSON.
  #[error("Error de serializacion: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl From<WorkflowError> for ReconcileError {
  fn from(e: WorkflowError) -> Self {
    match e {
      WorkflowError::Domain(d) => d.into(),
      WorkflowError::Serialization(s) => ReconcileError::Serialization(s),
      WorkflowError::Config(msg) => ReconcileError::Validation(msg),
      other => ReconcileError::Other(other.to_string()),
    }
  }
}
