// errors.rs
use reconcile::ReconcileError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
  #[error("Error de validación: {0}")]
  ValidationError(String),
  #[error("Error de serialización: {0}")]
  SerializationError(String),
  #[error("Error de lectura del manifiesto: {0}")]
  IoError(String),
}

impl From<serde_json::Error> for DomainError {
  fn from(e: serde_json::Error) -> Self {
    Self::SerializationError(e.to_string())
  }
}

impl From<serde_yaml::Error> for DomainError {
  fn from(e: serde_yaml::Error) -> Self {
    Self::SerializationError(e.to_string())
  }
}

impl From<std::io::Error> for DomainError {
  fn from(e: std::io::Error) -> Self {
    Self::IoError(e.to_string())
  }
}

impl From<DomainError> for ReconcileError {
  fn from(e: DomainError) -> Self {
    match e {
      DomainError::ValidationError(msg) | DomainError::SerializationError(msg) => ReconcileError::Validation(msg),
      DomainError::IoError(msg) => ReconcileError::Io(std::io::Error::other(msg)),
    }
  }
}
